//! Storage backends for the stake and reward ledgers.
//!
//! This module defines the [`StakingStore`] trait — the single persistence
//! seam the rest of the backend talks to — and provides:
//!
//! - an in-memory store ([`mem::InMemoryStakingStore`]) suitable for tests,
//! - a RocksDB-backed store ([`rocksdb::RocksDbStakingStore`]) for
//!   persistent deployments.
//!
//! Two invariants live at this layer because they must hold under
//! concurrent callers, not just within one component:
//!
//! - at most one *active* stake per (wallet, contract, token), enforced
//!   atomically inside [`StakingStore::create_stake`];
//! - the accrued amount is computed from the *stored*
//!   `last_verification_time` inside [`StakingStore::record_accrual`],
//!   together with the record insert and the anchor bump, in one atomic
//!   operation — so two runs racing over the same stake snapshot cannot
//!   both pay the same elapsed interval;
//! - the claimed flag flips false→true for all unclaimed rows in one
//!   write ([`StakingStore::confirm_claims`]), never read-then-write
//!   across two round trips.

pub mod mem;
pub mod rocksdb;

use std::fmt;

pub use mem::InMemoryStakingStore;
pub use rocksdb::{RocksDbConfig, RocksDbStakingStore};

use crate::types::{CanonicalAddress, EndReason, NewStake, RewardRecord, Stake, StakeId};

/// Reward amount for the interval between the stored anchor and `now`.
///
/// Shared by the store backends so the interval math lives next to the
/// anchor it must be read against.
pub(crate) fn accrued_amount(daily_rate: f64, last_verification_time: u64, now: u64) -> f64 {
    let elapsed = now.saturating_sub(last_verification_time);
    daily_rate * (elapsed as f64 / crate::rewards::SECONDS_PER_DAY)
}

/// Storage-level error type.
#[derive(Debug)]
pub enum StorageError {
    /// An active stake already exists for this (wallet, contract, token).
    ActiveStakeExists { existing: StakeId },
    /// No stake with the given id.
    StakeNotFound(StakeId),
    /// The stake exists but is no longer active.
    StakeNotActive(StakeId),
    /// Underlying backend failure.
    Backend(String),
    /// A stored row could not be decoded.
    Corrupted(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ActiveStakeExists { existing } => {
                write!(f, "an active stake already exists (stake {existing})")
            }
            StorageError::StakeNotFound(id) => write!(f, "stake {id} not found"),
            StorageError::StakeNotActive(id) => write!(f, "stake {id} is not active"),
            StorageError::Backend(msg) => write!(f, "storage backend error: {msg}"),
            StorageError::Corrupted(msg) => write!(f, "corrupted row: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Persistence seam for stakes and the reward ledger.
///
/// Implementations use interior mutability: the store is shared behind an
/// `Arc` between the HTTP handlers and the scheduler, and every method
/// that mutates must do so atomically with respect to the others.
pub trait StakingStore: Send + Sync {
    /// Inserts a new active stake, enforcing the one-active-per-NFT
    /// invariant atomically. Never ends an existing stake implicitly.
    fn create_stake(&self, new_stake: NewStake) -> Result<Stake, StorageError>;

    /// Fetches a stake by id.
    fn get_stake(&self, id: StakeId) -> Result<Option<Stake>, StorageError>;

    /// All currently active stakes, in id order.
    fn active_stakes(&self) -> Result<Vec<Stake>, StorageError>;

    /// Active stakes held by `wallet`, in id order.
    fn active_stakes_by_wallet(
        &self,
        wallet: &CanonicalAddress,
    ) -> Result<Vec<Stake>, StorageError>;

    /// Flips an active stake to ended, recording when and why. Stakes are
    /// never deleted.
    fn end_stake(&self, id: StakeId, reason: EndReason, now: u64) -> Result<Stake, StorageError>;

    /// Accrues rewards for `stake_id` at `daily_rate` up to `now`.
    ///
    /// The amount is derived from the stake's *stored*
    /// `last_verification_time`, and the record insert plus the anchor
    /// bump to `now` happen in one atomic operation. A `now` at or
    /// before the stored anchor yields `Ok(None)` and writes nothing,
    /// which is what makes retries and racing runs idempotent.
    fn record_accrual(
        &self,
        stake_id: StakeId,
        daily_rate: f64,
        now: u64,
    ) -> Result<Option<RewardRecord>, StorageError>;

    /// All reward records of a stake, in id order. Works for ended stakes
    /// too: unclaimed rewards survive termination.
    fn rewards_for_stake(&self, stake_id: StakeId) -> Result<Vec<RewardRecord>, StorageError>;

    /// Marks every currently-unclaimed record of `stake_id` as claimed and
    /// stamps `tx_hash`, atomically. Returns how many rows flipped.
    fn confirm_claims(&self, stake_id: StakeId, tx_hash: &str) -> Result<usize, StorageError>;
}
