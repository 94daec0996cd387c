//! Reward accrual: rarity-weighted, interval-exact, re-entrant safe.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::storage::{StakingStore, StorageError};
use crate::types::{RarityTier, RewardRecord, Stake};

/// Seconds in one accrual day.
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Reward accrued per day by a Standard-tier stake.
pub const BASE_DAILY_REWARD: f64 = 33.33;

/// Reward parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RewardConfig {
    /// Daily reward for the Standard tier; other tiers scale by their
    /// multiplier. The tier → multiplier table in
    /// [`crate::types::RarityTier`] is the single source of truth.
    pub base_daily_reward: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            base_daily_reward: BASE_DAILY_REWARD,
        }
    }
}

/// Computes and appends reward records.
pub struct RewardAccrualEngine {
    config: RewardConfig,
}

impl RewardAccrualEngine {
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    /// Daily reward rate for a tier.
    pub fn daily_rate(&self, tier: RarityTier) -> f64 {
        self.config.base_daily_reward * tier.multiplier()
    }

    /// Accrues rewards for the interval since the stake's last
    /// verification, appending a ledger record and bumping
    /// `last_verification_time` in one atomic store operation.
    ///
    /// The elapsed interval is fractional, not flattened to whole days:
    /// a cycle skipped on `Indeterminate` still accrues its full elapsed
    /// interval at the next successful verification instead of losing
    /// reward. The interval itself is measured by the store against the
    /// *stored* anchor, not against the `stake` snapshot passed in, so a
    /// retry or a manual run racing the scheduled one finds the anchor
    /// already advanced and pays only what is newly elapsed.
    pub fn accrue(
        &self,
        store: &dyn StakingStore,
        stake: &Stake,
        tier: RarityTier,
        now: u64,
    ) -> Result<Option<RewardRecord>, StorageError> {
        let record = store.record_accrual(stake.id, self.daily_rate(tier), now)?;
        match &record {
            Some(record) => debug!(
                stake = %stake.id,
                %tier,
                amount = record.amount,
                "reward accrued"
            ),
            None => debug!(stake = %stake.id, "no elapsed interval, skipping accrual"),
        }
        Ok(record)
    }
}
