//! Rarity tiers and reward multipliers.
//!
//! Rarity is a categorical NFT attribute fixed at mint time. The tier →
//! multiplier table here is the single source of truth for reward rates;
//! nothing else in the codebase carries per-tier constants.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Attribute keys searched (case-insensitively) for the rarity value.
pub const RARITY_TRAIT_KEYS: [&str; 2] = ["Card Frame", "rarity"];

/// Rarity tier of a staked NFT.
///
/// Unknown or missing rarity values resolve to [`RarityTier::Standard`];
/// an unrecognised frame name must never block accrual.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RarityTier {
    #[default]
    Standard,
    Advanced,
    Elite,
    Prototype,
}

impl RarityTier {
    /// Reward multiplier applied to the base daily reward.
    pub fn multiplier(&self) -> f64 {
        match self {
            RarityTier::Standard => 1.0,
            RarityTier::Advanced => 1.5,
            RarityTier::Elite => 2.0,
            RarityTier::Prototype => 2.5,
        }
    }

    /// Parses a metadata attribute value into a tier.
    ///
    /// Matching is case-insensitive and whitespace-tolerant; anything
    /// unrecognised maps to `Standard`.
    pub fn from_trait_value(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "advanced" => RarityTier::Advanced,
            "elite" => RarityTier::Elite,
            "prototype" => RarityTier::Prototype,
            _ => RarityTier::Standard,
        }
    }
}

impl fmt::Display for RarityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RarityTier::Standard => "standard",
            RarityTier::Advanced => "advanced",
            RarityTier::Elite => "elite",
            RarityTier::Prototype => "prototype",
        };
        f.write_str(name)
    }
}
