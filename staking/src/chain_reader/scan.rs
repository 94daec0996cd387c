//! Exhaustive-scan provider: bounded brute-force `ownerOf` sweep.
//!
//! Some contracts implement neither `ERC721Enumerable` nor show up in any
//! indexer. The last-resort strategy for those is to iterate candidate
//! token ids and call `ownerOf` for each one over a public fallback node.
//! That sweep lives behind the same [`NftOwnershipSource`] trait as every
//! other provider, ranked last; callers never know they hit it.
//!
//! The sweep is explicitly bounded: `ScanBounds` fixes the id range, and
//! every `ownerOf` call inherits the provider timeout. Candidate ids are
//! checked in fixed-size concurrent batches, so a full sweep costs at
//! most `range / batch × timeout` against a dead node and is cut short
//! by the first transport error.

use std::time::Duration;

use reqwest::blocking::Client;

use crate::types::{CanonicalAddress, TokenId};

use super::metadata::{self, NftMetadata};
use super::rpc::{decode_address_word, decode_string, encode_owner_of, encode_token_uri, eth_call};
use super::{NftOwnershipSource, ProviderError, ProviderKind};

/// Candidate ids checked concurrently per batch.
const SWEEP_BATCH: usize = 16;

/// Token-id range covered by the sweep, inclusive on both ends.
#[derive(Clone, Copy, Debug)]
pub struct ScanBounds {
    pub first_token_id: u64,
    pub last_token_id: u64,
}

impl Default for ScanBounds {
    fn default() -> Self {
        Self {
            first_token_id: 1,
            last_token_id: 10_000,
        }
    }
}

/// Brute-force scan provider over a public fallback node.
pub struct ExhaustiveScanProvider {
    endpoint: String,
    client: Client,
    bounds: ScanBounds,
    ipfs_gateway: String,
}

impl ExhaustiveScanProvider {
    /// Constructs a scan provider for `endpoint` sweeping `bounds`.
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        bounds: ScanBounds,
        ipfs_gateway: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
            bounds,
            ipfs_gateway: ipfs_gateway.into(),
        })
    }
}

impl NftOwnershipSource for ExhaustiveScanProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ExhaustiveScan
    }

    fn owner_of(
        &self,
        contract: &CanonicalAddress,
        token: TokenId,
    ) -> Result<CanonicalAddress, ProviderError> {
        // A point lookup needs no sweep even on the fallback node.
        let result = eth_call(&self.client, &self.endpoint, contract, &encode_owner_of(token))?;
        decode_address_word(&result)
    }

    fn balance_of(
        &self,
        contract: &CanonicalAddress,
        wallet: &CanonicalAddress,
    ) -> Result<u64, ProviderError> {
        sweep_count(self.bounds, |id| {
            let data = encode_owner_of(TokenId(id));
            match eth_call(&self.client, &self.endpoint, contract, &data) {
                Ok(result) => {
                    Ok(decode_address_word(&result).is_ok_and(|owner| owner == *wallet))
                }
                // Nonexistent ids revert; that is a service-level answer,
                // not a reason to abort the sweep.
                Err(ProviderError::Service(_)) => Ok(false),
                Err(e) => Err(e),
            }
        })
    }

    fn token_metadata(
        &self,
        contract: &CanonicalAddress,
        token: TokenId,
    ) -> Result<NftMetadata, ProviderError> {
        let result = eth_call(
            &self.client,
            &self.endpoint,
            contract,
            &encode_token_uri(token),
        )?;
        let uri = decode_string(&result)?;
        metadata::resolve_token_uri(&self.client, &uri, &self.ipfs_gateway)
    }
}

/// Counts ids within `bounds` for which `check` answers true, running
/// `check` in batches of [`SWEEP_BATCH`] concurrent workers. The first
/// error aborts the sweep after its batch drains.
fn sweep_count<F>(bounds: ScanBounds, check: F) -> Result<u64, ProviderError>
where
    F: Fn(u64) -> Result<bool, ProviderError> + Sync,
{
    let ids: Vec<u64> = (bounds.first_token_id..=bounds.last_token_id).collect();
    let check = &check;
    let mut held = 0u64;

    for batch in ids.chunks(SWEEP_BATCH) {
        let results = std::thread::scope(|scope| {
            let handles: Vec<_> = batch
                .iter()
                .map(|&id| scope.spawn(move || check(id)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(ProviderError::Transport("sweep worker panicked".to_string()))
                    })
                })
                .collect::<Vec<_>>()
        });
        for result in results {
            if result? {
                held += 1;
            }
        }
    }

    Ok(held)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn default_bounds_are_finite() {
        let bounds = ScanBounds::default();
        assert!(bounds.first_token_id <= bounds.last_token_id);
        assert!(bounds.last_token_id - bounds.first_token_id < 1_000_000);
    }

    #[test]
    fn sweep_counts_matches_across_batch_boundaries() {
        let bounds = ScanBounds {
            first_token_id: 1,
            last_token_id: 100,
        };
        let held = sweep_count(bounds, |id| Ok(id % 10 == 0)).expect("sweep");
        assert_eq!(held, 10);
    }

    #[test]
    fn reverting_ids_are_skipped_not_fatal() {
        let bounds = ScanBounds {
            first_token_id: 1,
            last_token_id: 40,
        };
        // Odd ids revert at the node; the closure reports them as misses.
        let held = sweep_count(bounds, |id| {
            if id % 2 == 1 { Ok(false) } else { Ok(id <= 20) }
        })
        .expect("sweep");
        assert_eq!(held, 10);
    }

    #[test]
    fn transport_failure_aborts_the_sweep() {
        let bounds = ScanBounds {
            first_token_id: 1,
            last_token_id: 100,
        };
        let calls = AtomicU32::new(0);
        let result = sweep_count(bounds, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::Transport("node unreachable".to_string()))
        });
        assert!(matches!(result, Err(ProviderError::Transport(_))));
        // Only the first batch ran before the error surfaced.
        assert!(calls.load(Ordering::SeqCst) <= SWEEP_BATCH as u32);
    }
}
