//! Core domain types used by the staking backend.
//!
//! This module defines strongly-typed wallet/contract addresses, token and
//! record identifiers, and the stake/reward ledger rows shared across the
//! implementation. The goal is to avoid "naked" strings and integers in
//! public APIs and instead use domain-specific newtypes.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Rarity tiers and their reward multipliers.
pub mod rarity;
/// Reward ledger rows.
pub mod reward;
/// Stake rows and lifecycle states.
pub mod stake;

pub use rarity::RarityTier;
pub use reward::{RewardId, RewardRecord};
pub use stake::{EndReason, NewStake, Stake, StakeId};

/// Minimum length of a normalized address, including the `0x` prefix.
///
/// Anything shorter is rejected before any network call is attempted. A
/// full EVM address is 42 characters; the lower bound only exists as a
/// cheap short-circuit for obviously unusable inputs.
pub const MIN_ADDRESS_LEN: usize = 10;

/// Error returned when an address string cannot be canonicalized.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AddressError {
    /// The input was empty or too short after normalization.
    TooShort(String),
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressError::TooShort(raw) => {
                write!(f, "invalid address: {raw:?} is too short after normalization")
            }
        }
    }
}

impl std::error::Error for AddressError {}

/// Canonical lowercase `0x`-prefixed wallet or contract address.
///
/// All address comparisons in the backend go through this type, so the
/// mixed-case, whitespace-padded, and ellipsis-truncated strings produced
/// by wallet UIs and block explorers never leak into ledger rows or
/// provider queries.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalAddress(String);

impl CanonicalAddress {
    /// Canonicalizes a raw address string.
    ///
    /// Trims surrounding whitespace, strips ellipsis artifacts left over
    /// from truncated display strings (`…` and `...`), lowercases, and
    /// prepends `0x` if absent. Inputs shorter than [`MIN_ADDRESS_LEN`]
    /// after normalization are rejected.
    ///
    /// Normalization is idempotent: normalizing an already-canonical
    /// address returns it unchanged.
    pub fn normalize(raw: &str) -> Result<Self, AddressError> {
        let mut cleaned = raw.trim().replace('\u{2026}', "");
        while let Some(pos) = cleaned.find("...") {
            cleaned.replace_range(pos..pos + 3, "");
        }
        let cleaned = cleaned.to_ascii_lowercase();
        let with_prefix = if cleaned.starts_with("0x") {
            cleaned
        } else {
            format!("0x{cleaned}")
        };
        if with_prefix.len() < MIN_ADDRESS_LEN {
            return Err(AddressError::TooShort(raw.to_string()));
        }
        Ok(CanonicalAddress(with_prefix))
    }

    /// Returns the canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the address without the `0x` prefix, for ABI encoding.
    pub fn hex_body(&self) -> &str {
        self.0.trim_start_matches("0x")
    }
}

impl fmt::Display for CanonicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// ERC-721 token identifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub u64);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Returns the current wall-clock time as seconds since Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}
