//! Claim coordination: claimable totals, claim preparation, and ledger
//! reconciliation.
//!
//! The server never signs or submits anything. `prepare_claim` hands the
//! client wallet the parameters of the payout transaction; the wallet
//! broadcasts it on its own and reports the transaction hash back through
//! `confirm_claim`, which is the only place the `claimed` flag ever flips.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::storage::{StakingStore, StorageError};
use crate::types::{CanonicalAddress, StakeId};

/// Wei per whole token at 18 decimals, starting from hundredths.
const WEI_PER_HUNDREDTH: u128 = 10u128.pow(16);

/// Errors from claim operations.
#[derive(Debug)]
pub enum ClaimError {
    /// No stake with the given id.
    StakeNotFound(StakeId),
    /// The requesting wallet is not the stake's wallet.
    Unauthorized(StakeId),
    /// Underlying ledger failure.
    Storage(StorageError),
}

impl fmt::Display for ClaimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimError::StakeNotFound(id) => write!(f, "stake {id} not found"),
            ClaimError::Unauthorized(id) => {
                write!(f, "wallet does not match the staker of stake {id}")
            }
            ClaimError::Storage(e) => write!(f, "ledger error: {e}"),
        }
    }
}

impl std::error::Error for ClaimError {}

impl From<StorageError> for ClaimError {
    fn from(e: StorageError) -> Self {
        ClaimError::Storage(e)
    }
}

/// Parameters the client wallet needs to broadcast a payout.
#[derive(Clone, Debug, PartialEq)]
pub struct ClaimTransaction {
    /// Rewards token contract the payout is drawn from.
    pub contract_address: CanonicalAddress,
    /// Claimable amount as an 18-decimal fixed-point integer.
    pub amount_wei: u128,
    /// Receiving wallet (the staker).
    pub recipient: CanonicalAddress,
}

/// Outcome of preparing a claim. An empty ledger is a defined state, not
/// an error.
#[derive(Clone, Debug)]
pub enum PreparedClaim {
    Ready(ClaimTransaction),
    NoRewardsAvailable,
}

/// Converts a token amount to 18-decimal wei.
///
/// Amounts are settled to two decimal places first, so the integer the
/// client signs is deterministic and free of float-representation dust.
pub fn to_wei(amount: f64) -> u128 {
    let hundredths = (amount * 100.0).round();
    if hundredths <= 0.0 {
        return 0;
    }
    hundredths as u128 * WEI_PER_HUNDREDTH
}

/// Computes claimable totals and reconciles confirmed claims.
pub struct ClaimCoordinator {
    store: Arc<dyn StakingStore>,
    rewards_contract: CanonicalAddress,
}

impl ClaimCoordinator {
    pub fn new(store: Arc<dyn StakingStore>, rewards_contract: CanonicalAddress) -> Self {
        Self {
            store,
            rewards_contract,
        }
    }

    /// Sum of unclaimed reward amounts for a stake. Works for ended
    /// stakes: unclaimed rewards survive termination.
    pub fn claimable_amount(&self, stake_id: StakeId) -> Result<f64, ClaimError> {
        self.store
            .get_stake(stake_id)?
            .ok_or(ClaimError::StakeNotFound(stake_id))?;

        let total = self
            .store
            .rewards_for_stake(stake_id)?
            .iter()
            .filter(|r| !r.claimed)
            .map(|r| r.amount)
            .sum();
        Ok(total)
    }

    /// Prepares the payout transaction for the stake's unclaimed rewards.
    ///
    /// Fails with [`ClaimError::Unauthorized`] when `wallet` is not the
    /// stake's wallet; returns [`PreparedClaim::NoRewardsAvailable`] when
    /// there is nothing to claim.
    pub fn prepare_claim(
        &self,
        stake_id: StakeId,
        wallet: &CanonicalAddress,
    ) -> Result<PreparedClaim, ClaimError> {
        let stake = self
            .store
            .get_stake(stake_id)?
            .ok_or(ClaimError::StakeNotFound(stake_id))?;

        if stake.wallet_address != *wallet {
            return Err(ClaimError::Unauthorized(stake_id));
        }

        let claimable = self.claimable_amount(stake_id)?;
        let amount_wei = to_wei(claimable);
        if amount_wei == 0 {
            return Ok(PreparedClaim::NoRewardsAvailable);
        }

        Ok(PreparedClaim::Ready(ClaimTransaction {
            contract_address: self.rewards_contract.clone(),
            amount_wei,
            recipient: stake.wallet_address,
        }))
    }

    /// Marks every currently-unclaimed record of `stake_id` as claimed
    /// and stamps `tx_hash`. Called only after the client reports a
    /// broadcast transaction. Returns how many records flipped.
    pub fn confirm_claim(&self, stake_id: StakeId, tx_hash: &str) -> Result<usize, ClaimError> {
        let flipped = self.store.confirm_claims(stake_id, tx_hash)?;
        info!(stake = %stake_id, tx_hash, records = flipped, "claim reconciled");
        Ok(flipped)
    }
}
