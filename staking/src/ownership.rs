//! On-chain ownership verification for staked NFTs.

use std::sync::Arc;

use tracing::warn;

use crate::chain_reader::{ReaderError, ResilientChainReader};
use crate::types::{CanonicalAddress, Stake};

/// Result of checking whether a stake's wallet still owns the NFT.
#[derive(Clone, Debug)]
pub enum VerificationOutcome {
    /// The staking wallet still owns the token.
    Verified,
    /// The token now belongs to someone else. Terminal for the stake.
    OwnershipChanged { new_owner: CanonicalAddress },
    /// No provider could answer. Soft skip; retried next cycle.
    ///
    /// This must never terminate a stake: a transient outage across the
    /// provider stack is not evidence the NFT moved.
    Indeterminate,
}

/// Confirms current on-chain ownership of staked NFTs.
pub struct OwnershipVerifier {
    reader: Arc<ResilientChainReader>,
}

impl OwnershipVerifier {
    pub fn new(reader: Arc<ResilientChainReader>) -> Self {
        Self { reader }
    }

    /// Checks whether `stake.wallet_address` still owns the staked token.
    ///
    /// Both sides of the comparison are canonical addresses, so the
    /// equality check is case-insensitive by construction. Full provider
    /// exhaustion is absorbed into [`VerificationOutcome::Indeterminate`].
    pub fn verify(&self, stake: &Stake) -> VerificationOutcome {
        match self.reader.owner_of(&stake.contract_address, stake.token_id) {
            Ok(owner) if owner == stake.wallet_address => VerificationOutcome::Verified,
            Ok(new_owner) => VerificationOutcome::OwnershipChanged { new_owner },
            Err(ReaderError::AllProvidersExhausted { .. }) => {
                warn!(
                    stake = %stake.id,
                    token = %stake.token_id,
                    "ownership indeterminate, will retry next cycle"
                );
                VerificationOutcome::Indeterminate
            }
            Err(e) => {
                warn!(stake = %stake.id, error = %e, "ownership check failed");
                VerificationOutcome::Indeterminate
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_reader::{
        NftMetadata, NftOwnershipSource, ProviderError, ProviderKind,
    };
    use crate::types::{NewStake, RarityTier, Stake, StakeId, TokenId};

    fn addr(tail: &str) -> CanonicalAddress {
        CanonicalAddress::normalize(&format!("0x{tail:0>40}")).unwrap()
    }

    fn stake_for(wallet: &CanonicalAddress) -> Stake {
        Stake::from_new(
            StakeId(1),
            NewStake {
                wallet_address: wallet.clone(),
                token_id: TokenId(42),
                contract_address: addr("c0ffee"),
                rarity_tier: RarityTier::Standard,
                daily_reward_rate: 33.33,
                start_time: 0,
            },
        )
    }

    struct FixedOwner(Option<CanonicalAddress>);

    impl NftOwnershipSource for FixedOwner {
        fn kind(&self) -> ProviderKind {
            ProviderKind::JsonRpc
        }

        fn owner_of(
            &self,
            _contract: &CanonicalAddress,
            _token: TokenId,
        ) -> Result<CanonicalAddress, ProviderError> {
            self.0
                .clone()
                .ok_or_else(|| ProviderError::Transport("down".to_string()))
        }

        fn balance_of(
            &self,
            _contract: &CanonicalAddress,
            _wallet: &CanonicalAddress,
        ) -> Result<u64, ProviderError> {
            Err(ProviderError::Service("unused".to_string()))
        }

        fn token_metadata(
            &self,
            _contract: &CanonicalAddress,
            _token: TokenId,
        ) -> Result<NftMetadata, ProviderError> {
            Err(ProviderError::Service("unused".to_string()))
        }
    }

    fn verifier_with(owner: Option<CanonicalAddress>) -> OwnershipVerifier {
        let reader = ResilientChainReader::new(vec![Box::new(FixedOwner(owner))])
            .expect("build reader");
        OwnershipVerifier::new(Arc::new(reader))
    }

    #[test]
    fn matching_owner_verifies() {
        let wallet = addr("beef");
        let verifier = verifier_with(Some(wallet.clone()));
        assert!(matches!(
            verifier.verify(&stake_for(&wallet)),
            VerificationOutcome::Verified
        ));
    }

    #[test]
    fn different_owner_is_terminal() {
        let verifier = verifier_with(Some(addr("dead")));
        match verifier.verify(&stake_for(&addr("beef"))) {
            VerificationOutcome::OwnershipChanged { new_owner } => {
                assert_eq!(new_owner, addr("dead"));
            }
            other => panic!("expected OwnershipChanged, got {other:?}"),
        }
    }

    #[test]
    fn exhaustion_is_a_soft_skip() {
        let verifier = verifier_with(None);
        assert!(matches!(
            verifier.verify(&stake_for(&addr("beef"))),
            VerificationOutcome::Indeterminate
        ));
    }
}
