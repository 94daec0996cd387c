//! Stake lifecycle state machine.
//!
//! States: `Active`, `Ended` (terminal). Transitions:
//!
//! - create             → `Active` (after an on-chain ownership check)
//! - `Active` --ownership changed--> `Ended` (`ownership_change`)
//! - `Active` --user unstake------> `Ended` (`user_initiated`)
//! - `Active` --verified----------> `Active` (side effect: accrual)
//! - `Active` --indeterminate-----> `Active` (no-op, retried next cycle)
//!
//! The one-active-stake-per-NFT invariant is enforced atomically by the
//! store at creation; a duplicate request is rejected, never resolved by
//! implicitly ending the earlier stake.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::chain_reader::{ReaderError, ResilientChainReader};
use crate::ownership::VerificationOutcome;
use crate::rarity::RarityResolver;
use crate::rewards::RewardAccrualEngine;
use crate::storage::{StakingStore, StorageError};
use crate::types::{
    AddressError, CanonicalAddress, EndReason, NewStake, RewardRecord, Stake, StakeId, TokenId,
};

/// Errors from stake lifecycle operations.
#[derive(Debug)]
pub enum StakeError {
    /// A wallet or contract address failed normalization.
    InvalidAddress(AddressError),
    /// An active stake already covers this (wallet, contract, token).
    AlreadyStaked { existing: StakeId },
    /// No stake with the given id.
    NotFound(StakeId),
    /// The stake has already ended.
    NotActive(StakeId),
    /// The wallet does not currently own the token it is trying to stake.
    NotOwner { current_owner: CanonicalAddress },
    /// The requesting wallet is not the stake's wallet.
    Unauthorized(StakeId),
    /// No provider could answer the ownership check.
    ChainUnavailable(ReaderError),
    /// Underlying ledger failure.
    Storage(StorageError),
}

impl fmt::Display for StakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StakeError::InvalidAddress(e) => write!(f, "{e}"),
            StakeError::AlreadyStaked { existing } => {
                write!(f, "NFT is already staked (stake {existing})")
            }
            StakeError::NotFound(id) => write!(f, "stake {id} not found"),
            StakeError::NotActive(id) => write!(f, "stake {id} has already ended"),
            StakeError::NotOwner { current_owner } => {
                write!(f, "wallet does not own this token (owner is {current_owner})")
            }
            StakeError::Unauthorized(id) => {
                write!(f, "wallet does not match the staker of stake {id}")
            }
            StakeError::ChainUnavailable(e) => write!(f, "{e}"),
            StakeError::Storage(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for StakeError {}

impl From<AddressError> for StakeError {
    fn from(e: AddressError) -> Self {
        StakeError::InvalidAddress(e)
    }
}

impl From<StorageError> for StakeError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::ActiveStakeExists { existing } => StakeError::AlreadyStaked { existing },
            StorageError::StakeNotFound(id) => StakeError::NotFound(id),
            StorageError::StakeNotActive(id) => StakeError::NotActive(id),
            other => StakeError::Storage(other),
        }
    }
}

/// What a verification outcome did to a stake.
#[derive(Debug)]
pub enum StakeTransition {
    /// Still active; a reward record may have been appended.
    Accrued(Option<RewardRecord>),
    /// Terminated because the NFT moved.
    Ended(Stake),
    /// Left untouched; ownership could not be determined this cycle.
    Skipped,
}

/// Creates, verifies, and terminates stakes.
pub struct StakeLifecycleManager {
    store: Arc<dyn StakingStore>,
    reader: Arc<ResilientChainReader>,
    rarity: Arc<RarityResolver>,
    rewards: RewardAccrualEngine,
}

impl StakeLifecycleManager {
    pub fn new(
        store: Arc<dyn StakingStore>,
        reader: Arc<ResilientChainReader>,
        rarity: Arc<RarityResolver>,
        rewards: RewardAccrualEngine,
    ) -> Self {
        Self {
            store,
            reader,
            rarity,
            rewards,
        }
    }

    /// Creates a stake for `(wallet, contract, token)` after confirming
    /// the wallet currently owns the token on-chain.
    ///
    /// Raw address strings are normalized here, at the boundary; nothing
    /// past this point sees a non-canonical address.
    pub fn create_stake(
        &self,
        wallet_raw: &str,
        contract_raw: &str,
        token: TokenId,
        now: u64,
    ) -> Result<Stake, StakeError> {
        let wallet = CanonicalAddress::normalize(wallet_raw)?;
        let contract = CanonicalAddress::normalize(contract_raw)?;

        let owner = self
            .reader
            .owner_of(&contract, token)
            .map_err(StakeError::ChainUnavailable)?;
        if owner != wallet {
            return Err(StakeError::NotOwner {
                current_owner: owner,
            });
        }

        let rarity = self.rarity.resolve(&contract, token);
        let stake = self.store.create_stake(NewStake {
            wallet_address: wallet,
            token_id: token,
            contract_address: contract,
            rarity_tier: rarity.tier,
            daily_reward_rate: self.rewards.daily_rate(rarity.tier),
            start_time: now,
        })?;

        info!(
            stake = %stake.id,
            wallet = %stake.wallet_address,
            token = %stake.token_id,
            tier = %stake.rarity_tier,
            "stake created"
        );
        Ok(stake)
    }

    /// Ends a stake at the owner's request. Unclaimed rewards stay
    /// claimable afterwards.
    pub fn unstake(&self, id: StakeId, wallet_raw: &str, now: u64) -> Result<Stake, StakeError> {
        let wallet = CanonicalAddress::normalize(wallet_raw)?;
        let stake = self
            .store
            .get_stake(id)?
            .ok_or(StakeError::NotFound(id))?;
        if stake.wallet_address != wallet {
            return Err(StakeError::Unauthorized(id));
        }

        let ended = self.store.end_stake(id, EndReason::UserInitiated, now)?;
        info!(stake = %id, "stake ended by user");
        Ok(ended)
    }

    /// Applies a verification outcome to an active stake.
    pub fn apply_verification(
        &self,
        stake: &Stake,
        outcome: &VerificationOutcome,
        now: u64,
    ) -> Result<StakeTransition, StakeError> {
        match outcome {
            VerificationOutcome::Verified => {
                // Rarity is immutable post-mint and was resolved at
                // enrolment; re-fetching metadata here would let a
                // transient outage downgrade the rate for the interval.
                let record =
                    self.rewards
                        .accrue(self.store.as_ref(), stake, stake.rarity_tier, now)?;
                Ok(StakeTransition::Accrued(record))
            }
            VerificationOutcome::OwnershipChanged { new_owner } => {
                let ended = self
                    .store
                    .end_stake(stake.id, EndReason::OwnershipChange, now)?;
                info!(
                    stake = %stake.id,
                    %new_owner,
                    "stake ended, token transferred away"
                );
                Ok(StakeTransition::Ended(ended))
            }
            VerificationOutcome::Indeterminate => Ok(StakeTransition::Skipped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_reader::{
        NftMetadata, NftOwnershipSource, ProviderError, ProviderKind,
    };
    use crate::rewards::RewardConfig;
    use crate::storage::InMemoryStakingStore;
    use crate::types::RarityTier;

    fn addr(tail: &str) -> CanonicalAddress {
        CanonicalAddress::normalize(&format!("0x{tail:0>40}")).unwrap()
    }

    /// Provider whose `owner_of` always answers with one owner and whose
    /// metadata always reports an Elite frame.
    struct EliteCollection {
        owner: Option<CanonicalAddress>,
    }

    impl NftOwnershipSource for EliteCollection {
        fn kind(&self) -> ProviderKind {
            ProviderKind::RestIndexer
        }

        fn owner_of(
            &self,
            _contract: &CanonicalAddress,
            _token: TokenId,
        ) -> Result<CanonicalAddress, ProviderError> {
            self.owner
                .clone()
                .ok_or_else(|| ProviderError::Transport("down".to_string()))
        }

        fn balance_of(
            &self,
            _contract: &CanonicalAddress,
            _wallet: &CanonicalAddress,
        ) -> Result<u64, ProviderError> {
            Ok(1)
        }

        fn token_metadata(
            &self,
            _contract: &CanonicalAddress,
            _token: TokenId,
        ) -> Result<NftMetadata, ProviderError> {
            serde_json::from_str(
                r#"{"attributes":[{"trait_type":"Card Frame","value":"Elite"}]}"#,
            )
            .map_err(|e| ProviderError::Protocol(e.to_string()))
        }
    }

    fn manager_with_owner(
        owner: Option<CanonicalAddress>,
    ) -> (Arc<InMemoryStakingStore>, StakeLifecycleManager) {
        let store = Arc::new(InMemoryStakingStore::new());
        let reader = Arc::new(
            ResilientChainReader::new(vec![Box::new(EliteCollection { owner })])
                .expect("build reader"),
        );
        let manager = StakeLifecycleManager::new(
            store.clone() as Arc<dyn StakingStore>,
            reader.clone(),
            Arc::new(RarityResolver::new(reader)),
            RewardAccrualEngine::new(RewardConfig::default()),
        );
        (store, manager)
    }

    const WALLET: &str = "0x00000000000000000000000000000000000Beef1";
    const CONTRACT: &str = "0x00000000000000000000000000000000c0ffee22";

    #[test]
    fn create_stake_resolves_rarity_and_rate() {
        let (_store, manager) = manager_with_owner(Some(addr("beef1")));

        let stake = manager
            .create_stake(WALLET, CONTRACT, TokenId(42), 1_700_000_000)
            .expect("create");
        assert_eq!(stake.rarity_tier, RarityTier::Elite);
        assert!((stake.daily_reward_rate - 66.66).abs() < 0.01);
        assert_eq!(stake.wallet_address, addr("beef1"));
    }

    #[test]
    fn create_stake_rejects_non_owner() {
        let (_store, manager) = manager_with_owner(Some(addr("someoneelse")));
        let err = manager
            .create_stake(WALLET, CONTRACT, TokenId(42), 0)
            .unwrap_err();
        assert!(matches!(err, StakeError::NotOwner { .. }));
    }

    #[test]
    fn create_stake_surfaces_chain_outage() {
        let (_store, manager) = manager_with_owner(None);
        let err = manager
            .create_stake(WALLET, CONTRACT, TokenId(42), 0)
            .unwrap_err();
        assert!(matches!(err, StakeError::ChainUnavailable(_)));
    }

    #[test]
    fn create_stake_rejects_duplicates() {
        let (_store, manager) = manager_with_owner(Some(addr("beef1")));
        manager
            .create_stake(WALLET, CONTRACT, TokenId(42), 0)
            .expect("first create");
        let err = manager
            .create_stake(WALLET, CONTRACT, TokenId(42), 10)
            .unwrap_err();
        assert!(matches!(err, StakeError::AlreadyStaked { .. }));
    }

    #[test]
    fn create_stake_rejects_bad_addresses() {
        let (_store, manager) = manager_with_owner(Some(addr("beef1")));
        let err = manager
            .create_stake("0x12", CONTRACT, TokenId(1), 0)
            .unwrap_err();
        assert!(matches!(err, StakeError::InvalidAddress(_)));
    }

    #[test]
    fn unstake_requires_the_staking_wallet() {
        let (_store, manager) = manager_with_owner(Some(addr("beef1")));
        let stake = manager
            .create_stake(WALLET, CONTRACT, TokenId(42), 0)
            .expect("create");

        let err = manager
            .unstake(stake.id, "0x000000000000000000000000000000000000dead", 10)
            .unwrap_err();
        assert!(matches!(err, StakeError::Unauthorized(_)));

        let ended = manager.unstake(stake.id, WALLET, 10).expect("unstake");
        assert!(!ended.active);
        assert_eq!(ended.end_reason, Some(EndReason::UserInitiated));
    }

    #[test]
    fn verified_outcome_accrues() {
        let (store, manager) = manager_with_owner(Some(addr("beef1")));
        let stake = manager
            .create_stake(WALLET, CONTRACT, TokenId(42), 0)
            .expect("create");

        let transition = manager
            .apply_verification(&stake, &VerificationOutcome::Verified, 86_400)
            .expect("apply");
        match transition {
            StakeTransition::Accrued(Some(record)) => {
                assert!((record.amount - 66.66).abs() < 0.01);
            }
            other => panic!("expected accrual, got {other:?}"),
        }
        assert_eq!(
            store.get_stake(stake.id).unwrap().unwrap().last_verification_time,
            86_400
        );
    }

    #[test]
    fn metadata_outage_does_not_downgrade_the_stored_tier() {
        // Provider that still answers ownership but whose metadata host
        // has gone dark since the stake was enrolled.
        struct MetadataOutage {
            owner: CanonicalAddress,
        }

        impl NftOwnershipSource for MetadataOutage {
            fn kind(&self) -> ProviderKind {
                ProviderKind::JsonRpc
            }

            fn owner_of(
                &self,
                _contract: &CanonicalAddress,
                _token: TokenId,
            ) -> Result<CanonicalAddress, ProviderError> {
                Ok(self.owner.clone())
            }

            fn balance_of(
                &self,
                _contract: &CanonicalAddress,
                _wallet: &CanonicalAddress,
            ) -> Result<u64, ProviderError> {
                Ok(1)
            }

            fn token_metadata(
                &self,
                _contract: &CanonicalAddress,
                _token: TokenId,
            ) -> Result<NftMetadata, ProviderError> {
                Err(ProviderError::Transport("down".to_string()))
            }
        }

        let store = Arc::new(InMemoryStakingStore::new());
        let stake = store
            .create_stake(crate::types::NewStake {
                wallet_address: addr("beef1"),
                token_id: TokenId(42),
                contract_address: addr("c0ffee"),
                rarity_tier: RarityTier::Elite,
                daily_reward_rate: 66.66,
                start_time: 0,
            })
            .expect("create");

        let reader = Arc::new(
            ResilientChainReader::new(vec![Box::new(MetadataOutage {
                owner: addr("beef1"),
            })])
            .expect("build reader"),
        );
        let manager = StakeLifecycleManager::new(
            store.clone() as Arc<dyn crate::storage::StakingStore>,
            reader.clone(),
            Arc::new(RarityResolver::new(reader)),
            RewardAccrualEngine::new(RewardConfig::default()),
        );

        let transition = manager
            .apply_verification(&stake, &VerificationOutcome::Verified, 86_400)
            .expect("apply");
        match transition {
            StakeTransition::Accrued(Some(record)) => {
                // Paid at the Elite rate recorded at enrolment, not the
                // Standard fallback.
                assert!((record.amount - 66.66).abs() < 0.01);
            }
            other => panic!("expected accrual, got {other:?}"),
        }
    }

    #[test]
    fn ownership_change_ends_the_stake() {
        let (store, manager) = manager_with_owner(Some(addr("beef1")));
        let stake = manager
            .create_stake(WALLET, CONTRACT, TokenId(42), 0)
            .expect("create");

        let outcome = VerificationOutcome::OwnershipChanged {
            new_owner: addr("dead"),
        };
        let transition = manager
            .apply_verification(&stake, &outcome, 500)
            .expect("apply");
        assert!(matches!(transition, StakeTransition::Ended(_)));

        let reloaded = store.get_stake(stake.id).unwrap().unwrap();
        assert!(!reloaded.active);
        assert_eq!(reloaded.end_reason, Some(EndReason::OwnershipChange));
        assert_eq!(reloaded.end_time, Some(500));
    }

    #[test]
    fn indeterminate_outcome_touches_nothing() {
        let (store, manager) = manager_with_owner(Some(addr("beef1")));
        let stake = manager
            .create_stake(WALLET, CONTRACT, TokenId(42), 0)
            .expect("create");

        let transition = manager
            .apply_verification(&stake, &VerificationOutcome::Indeterminate, 86_400)
            .expect("apply");
        assert!(matches!(transition, StakeTransition::Skipped));

        let reloaded = store.get_stake(stake.id).unwrap().unwrap();
        assert!(reloaded.active);
        assert_eq!(reloaded.last_verification_time, 0);
        assert!(store.rewards_for_stake(stake.id).unwrap().is_empty());
    }
}
