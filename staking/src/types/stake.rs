//! Stake rows and lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::rarity::RarityTier;
use super::{CanonicalAddress, TokenId};

/// Store-assigned stake identifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StakeId(pub u64);

impl fmt::Display for StakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reason a stake left the `Active` state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The NFT was transferred away from the staking wallet.
    OwnershipChange,
    /// The user unstaked voluntarily.
    UserInitiated,
}

/// Parameters for creating a stake, before the store assigns an id.
#[derive(Clone, Debug)]
pub struct NewStake {
    pub wallet_address: CanonicalAddress,
    pub token_id: TokenId,
    pub contract_address: CanonicalAddress,
    pub rarity_tier: RarityTier,
    pub daily_reward_rate: f64,
    pub start_time: u64,
}

/// A wallet-owned NFT enrolled in the staking programme.
///
/// Stakes are never deleted: termination flips `active` to `false` and
/// records when and why, so the reward ledger attached to the stake stays
/// queryable (and claimable) after the stake has ended.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Stake {
    pub id: StakeId,
    pub wallet_address: CanonicalAddress,
    pub token_id: TokenId,
    pub contract_address: CanonicalAddress,
    pub rarity_tier: RarityTier,
    /// Tokens accrued per elapsed day while the stake is active.
    pub daily_reward_rate: f64,
    pub active: bool,
    pub start_time: u64,
    /// Upper bound of the last interval rewards were accrued for.
    ///
    /// Updated atomically with every reward-record insert; the accrual
    /// engine derives the next interval from it, which is what makes
    /// re-entrant accrual calls no-ops instead of double-counting.
    pub last_verification_time: u64,
    pub end_time: Option<u64>,
    pub end_reason: Option<EndReason>,
}

impl Stake {
    /// Builds the active stake row the store persists for `new_stake`.
    pub fn from_new(id: StakeId, new_stake: NewStake) -> Self {
        Stake {
            id,
            wallet_address: new_stake.wallet_address,
            token_id: new_stake.token_id,
            contract_address: new_stake.contract_address,
            rarity_tier: new_stake.rarity_tier,
            daily_reward_rate: new_stake.daily_reward_rate,
            active: true,
            start_time: new_stake.start_time,
            last_verification_time: new_stake.start_time,
            end_time: None,
            end_reason: None,
        }
    }

    /// Returns `true` if this stake covers the given (wallet, contract,
    /// token) triple. Addresses are already canonical, so plain equality
    /// is a case-insensitive comparison.
    pub fn matches(
        &self,
        wallet: &CanonicalAddress,
        contract: &CanonicalAddress,
        token: TokenId,
    ) -> bool {
        self.wallet_address == *wallet
            && self.contract_address == *contract
            && self.token_id == token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet() -> CanonicalAddress {
        CanonicalAddress::normalize("0x71C7656EC7ab88b098defB751B7401B5f6d8976F").unwrap()
    }

    fn contract() -> CanonicalAddress {
        CanonicalAddress::normalize("0x2953399124F0cBB46d2CbACD8A89cF0599974963").unwrap()
    }

    #[test]
    fn from_new_starts_active_with_aligned_timestamps() {
        let new_stake = NewStake {
            wallet_address: wallet(),
            token_id: TokenId(7),
            contract_address: contract(),
            rarity_tier: RarityTier::Elite,
            daily_reward_rate: 66.66,
            start_time: 1_700_000_000,
        };

        let stake = Stake::from_new(StakeId(1), new_stake);
        assert!(stake.active);
        assert_eq!(stake.start_time, stake.last_verification_time);
        assert!(stake.end_time.is_none());
        assert!(stake.end_reason.is_none());
    }

    #[test]
    fn matches_compares_canonical_triples() {
        let stake = Stake::from_new(
            StakeId(1),
            NewStake {
                wallet_address: wallet(),
                token_id: TokenId(7),
                contract_address: contract(),
                rarity_tier: RarityTier::Standard,
                daily_reward_rate: 33.33,
                start_time: 0,
            },
        );

        let recased =
            CanonicalAddress::normalize("0X71c7656ec7AB88B098DEFb751b7401b5F6D8976f").unwrap();
        assert!(stake.matches(&recased, &contract(), TokenId(7)));
        assert!(!stake.matches(&recased, &contract(), TokenId(8)));
    }
}
