//! In-memory staking store.
//!
//! This implementation is useful for unit tests and small single-process
//! deployments. It keeps stakes and reward records in `BTreeMap`s behind
//! one mutex, which is also what makes every trait method trivially
//! atomic.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::types::{
    CanonicalAddress, EndReason, NewStake, RewardId, RewardRecord, Stake, StakeId,
};

use super::{StakingStore, StorageError};

#[derive(Default)]
struct Inner {
    stakes: BTreeMap<u64, Stake>,
    rewards: BTreeMap<u64, RewardRecord>,
    next_stake_id: u64,
    next_reward_id: u64,
}

/// In-memory implementation of [`StakingStore`].
#[derive(Default)]
pub struct InMemoryStakingStore {
    inner: Mutex<Inner>,
}

impl InMemoryStakingStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stakes currently stored.
    pub fn stake_count(&self) -> usize {
        self.inner.lock().expect("store lock poisoned").stakes.len()
    }
}

impl StakingStore for InMemoryStakingStore {
    fn create_stake(&self, new_stake: NewStake) -> Result<Stake, StorageError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");

        if let Some(existing) = inner.stakes.values().find(|s| {
            s.active
                && s.matches(
                    &new_stake.wallet_address,
                    &new_stake.contract_address,
                    new_stake.token_id,
                )
        }) {
            return Err(StorageError::ActiveStakeExists {
                existing: existing.id,
            });
        }

        inner.next_stake_id += 1;
        let id = StakeId(inner.next_stake_id);
        let stake = Stake::from_new(id, new_stake);
        inner.stakes.insert(id.0, stake.clone());
        Ok(stake)
    }

    fn get_stake(&self, id: StakeId) -> Result<Option<Stake>, StorageError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.stakes.get(&id.0).cloned())
    }

    fn active_stakes(&self) -> Result<Vec<Stake>, StorageError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.stakes.values().filter(|s| s.active).cloned().collect())
    }

    fn active_stakes_by_wallet(
        &self,
        wallet: &CanonicalAddress,
    ) -> Result<Vec<Stake>, StorageError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .stakes
            .values()
            .filter(|s| s.active && s.wallet_address == *wallet)
            .cloned()
            .collect())
    }

    fn end_stake(&self, id: StakeId, reason: EndReason, now: u64) -> Result<Stake, StorageError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let stake = inner
            .stakes
            .get_mut(&id.0)
            .ok_or(StorageError::StakeNotFound(id))?;
        if !stake.active {
            return Err(StorageError::StakeNotActive(id));
        }
        stake.active = false;
        stake.end_time = Some(now);
        stake.end_reason = Some(reason);
        Ok(stake.clone())
    }

    fn record_accrual(
        &self,
        stake_id: StakeId,
        daily_rate: f64,
        now: u64,
    ) -> Result<Option<RewardRecord>, StorageError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");

        let amount = {
            let stake = inner
                .stakes
                .get_mut(&stake_id.0)
                .ok_or(StorageError::StakeNotFound(stake_id))?;
            if !stake.active {
                return Err(StorageError::StakeNotActive(stake_id));
            }
            let amount = super::accrued_amount(daily_rate, stake.last_verification_time, now);
            if amount <= 0.0 {
                return Ok(None);
            }
            stake.last_verification_time = now;
            amount
        };

        inner.next_reward_id += 1;
        let record = RewardRecord::new(RewardId(inner.next_reward_id), stake_id, amount, now);
        inner.rewards.insert(record.id.0, record.clone());
        Ok(Some(record))
    }

    fn rewards_for_stake(&self, stake_id: StakeId) -> Result<Vec<RewardRecord>, StorageError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .rewards
            .values()
            .filter(|r| r.stake_id == stake_id)
            .cloned()
            .collect())
    }

    fn confirm_claims(&self, stake_id: StakeId, tx_hash: &str) -> Result<usize, StorageError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        if !inner.stakes.contains_key(&stake_id.0) {
            return Err(StorageError::StakeNotFound(stake_id));
        }

        let mut flipped = 0;
        for record in inner.rewards.values_mut() {
            if record.stake_id == stake_id && !record.claimed {
                record.claimed = true;
                record.claim_tx_hash = Some(tx_hash.to_string());
                flipped += 1;
            }
        }
        Ok(flipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RarityTier, TokenId};

    fn addr(tail: &str) -> CanonicalAddress {
        CanonicalAddress::normalize(&format!("0x{tail:0>40}")).unwrap()
    }

    fn new_stake(wallet: &str, token: u64) -> NewStake {
        NewStake {
            wallet_address: addr(wallet),
            token_id: TokenId(token),
            contract_address: addr("c0ffee"),
            rarity_tier: RarityTier::Standard,
            daily_reward_rate: 33.33,
            start_time: 1_700_000_000,
        }
    }

    #[test]
    fn duplicate_active_stake_is_rejected() {
        let store = InMemoryStakingStore::new();
        store.create_stake(new_stake("aa", 1)).expect("first create");

        let err = store.create_stake(new_stake("aa", 1)).unwrap_err();
        assert!(matches!(err, StorageError::ActiveStakeExists { .. }));

        // A different token for the same wallet is fine.
        store.create_stake(new_stake("aa", 2)).expect("second token");
        assert_eq!(store.stake_count(), 2);
    }

    #[test]
    fn ended_stake_frees_the_slot_but_is_never_deleted() {
        let store = InMemoryStakingStore::new();
        let stake = store.create_stake(new_stake("aa", 1)).expect("create");

        store
            .end_stake(stake.id, EndReason::UserInitiated, 1_700_000_100)
            .expect("end");
        store.create_stake(new_stake("aa", 1)).expect("restake after end");

        let ended = store.get_stake(stake.id).expect("query").expect("still stored");
        assert!(!ended.active);
        assert_eq!(ended.end_reason, Some(EndReason::UserInitiated));
        assert_eq!(ended.end_time, Some(1_700_000_100));
    }

    #[test]
    fn record_accrual_bumps_last_verification_atomically() {
        let store = InMemoryStakingStore::new();
        let stake = store.create_stake(new_stake("aa", 1)).expect("create");

        let record = store
            .record_accrual(stake.id, 66.66, 1_700_086_400)
            .expect("accrue")
            .expect("record written");
        assert_eq!(record.amount, 66.66);
        assert!(!record.claimed);

        let reloaded = store.get_stake(stake.id).expect("query").expect("exists");
        assert_eq!(reloaded.last_verification_time, 1_700_086_400);
    }

    #[test]
    fn racing_runs_cannot_double_pay_an_interval() {
        let store = InMemoryStakingStore::new();
        let stake = store.create_stake(new_stake("aa", 1)).expect("create");

        // Two runs loaded the stake before either wrote; the second call
        // arrives five seconds after the first.
        let first = store
            .record_accrual(stake.id, 66.66, 1_700_086_400)
            .expect("accrue")
            .expect("record written");
        assert!((first.amount - 66.66).abs() < 1e-9);

        let second = store
            .record_accrual(stake.id, 66.66, 1_700_086_405)
            .expect("accrue")
            .expect("record written");
        // Only the five seconds since the stored anchor are paid, not
        // the full day the racing run's snapshot still believed in.
        assert!(second.amount < 0.01);

        let replay = store
            .record_accrual(stake.id, 66.66, 1_700_086_405)
            .expect("accrue");
        assert!(replay.is_none());

        let total: f64 = store
            .rewards_for_stake(stake.id)
            .expect("list")
            .iter()
            .map(|r| r.amount)
            .sum();
        assert!((total - 66.66).abs() < 0.01);
    }

    #[test]
    fn accrual_against_ended_stake_is_rejected() {
        let store = InMemoryStakingStore::new();
        let stake = store.create_stake(new_stake("aa", 1)).expect("create");
        store
            .end_stake(stake.id, EndReason::OwnershipChange, 1_700_000_100)
            .expect("end");

        let err = store
            .record_accrual(stake.id, 33.33, 1_700_086_400)
            .unwrap_err();
        assert!(matches!(err, StorageError::StakeNotActive(_)));
    }

    #[test]
    fn confirm_claims_flips_all_and_only_unclaimed_rows() {
        let store = InMemoryStakingStore::new();
        let stake = store.create_stake(new_stake("aa", 1)).expect("create");
        store.record_accrual(stake.id, 10.0, 1_700_086_400).expect("r1");
        store.record_accrual(stake.id, 20.0, 1_700_172_800).expect("r2");

        let flipped = store.confirm_claims(stake.id, "0xtx1").expect("confirm");
        assert_eq!(flipped, 2);

        // New rewards after the claim stay unclaimed.
        store.record_accrual(stake.id, 30.0, 1_700_259_200).expect("r3");
        let flipped = store.confirm_claims(stake.id, "0xtx2").expect("confirm again");
        assert_eq!(flipped, 1);

        let rewards = store.rewards_for_stake(stake.id).expect("list");
        assert!(rewards.iter().all(|r| r.claimed));
        assert_eq!(
            rewards
                .iter()
                .filter(|r| r.claim_tx_hash.as_deref() == Some("0xtx1"))
                .count(),
            2
        );
    }
}
