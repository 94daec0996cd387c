//! Reward ledger rows.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::stake::StakeId;

/// Store-assigned reward-record identifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RewardId(pub u64);

impl fmt::Display for RewardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One accrued reward interval for a stake.
///
/// Records are append-only: `amount` and `reward_date` are immutable once
/// written. The only mutation the ledger ever sees is the claim
/// coordinator flipping `claimed` and stamping `claim_tx_hash`, and that
/// flip happens atomically for all unclaimed rows of a stake.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RewardRecord {
    pub id: RewardId,
    pub stake_id: StakeId,
    /// Token amount accrued for the interval, in whole-token units.
    pub amount: f64,
    /// Unix timestamp of the verification run that produced this record.
    pub reward_date: u64,
    pub claimed: bool,
    pub claim_tx_hash: Option<String>,
}

impl RewardRecord {
    /// Builds a fresh, unclaimed record.
    pub fn new(id: RewardId, stake_id: StakeId, amount: f64, reward_date: u64) -> Self {
        RewardRecord {
            id,
            stake_id,
            amount,
            reward_date,
            claimed: false,
            claim_tx_hash: None,
        }
    }
}
