//! Rarity resolution with an in-process cache.
//!
//! Rarity is immutable post-mint, so a resolved tier is cached for the
//! lifetime of the process, keyed by (contract, token). A failed metadata
//! fetch falls back to the Standard tier for this call but is *not*
//! cached, so a transient outage cannot pin a mispriced multiplier.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::chain_reader::ResilientChainReader;
use crate::types::rarity::RARITY_TRAIT_KEYS;
use crate::types::{CanonicalAddress, RarityTier, TokenId};

/// Resolved rarity of one token.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RarityInfo {
    pub tier: RarityTier,
    pub multiplier: f64,
}

impl From<RarityTier> for RarityInfo {
    fn from(tier: RarityTier) -> Self {
        RarityInfo {
            tier,
            multiplier: tier.multiplier(),
        }
    }
}

/// Extracts rarity tiers from NFT metadata, with caching.
pub struct RarityResolver {
    reader: Arc<ResilientChainReader>,
    cache: Mutex<HashMap<(CanonicalAddress, TokenId), RarityInfo>>,
}

impl RarityResolver {
    pub fn new(reader: Arc<ResilientChainReader>) -> Self {
        Self {
            reader,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Number of cached entries, for run summaries.
    pub fn cached_entries(&self) -> usize {
        self.cache.lock().expect("rarity cache poisoned").len()
    }

    /// Resolves the rarity tier of `token` under `contract`.
    ///
    /// Searches metadata attributes for the known rarity keys
    /// case-insensitively; unknown or missing values resolve to Standard.
    pub fn resolve(&self, contract: &CanonicalAddress, token: TokenId) -> RarityInfo {
        let key = (contract.clone(), token);
        if let Some(info) = self.cache.lock().expect("rarity cache poisoned").get(&key) {
            return *info;
        }

        match self.reader.token_metadata(contract, token) {
            Ok(meta) => {
                let tier = RARITY_TRAIT_KEYS
                    .iter()
                    .find_map(|trait_key| meta.attribute(trait_key))
                    .and_then(|attr| attr.value_str())
                    .map(RarityTier::from_trait_value)
                    .unwrap_or_default();

                debug!(contract = %contract, token = %token, %tier, "rarity resolved");
                let info = RarityInfo::from(tier);
                self.cache
                    .lock()
                    .expect("rarity cache poisoned")
                    .insert(key, info);
                info
            }
            Err(e) => {
                warn!(
                    contract = %contract,
                    token = %token,
                    error = %e,
                    "metadata unavailable, defaulting to standard rarity for this call"
                );
                RarityInfo::from(RarityTier::Standard)
            }
        }
    }
}
