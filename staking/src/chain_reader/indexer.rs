//! REST indexer provider.
//!
//! Talks to an NFT indexing API (Alchemy-shaped) that answers ownership
//! and metadata queries directly, without touching the chain:
//!
//! ```json
//! GET {base}/{api_key}/getOwnersForToken?contractAddress=0x..&tokenId=42
//! { "owners": ["0xabc..."] }
//!
//! GET {base}/{api_key}/getNFTs?owner=0x..&contractAddresses[]=0x..
//! { "ownedNfts": [ { "tokenId": "42", "metadata": { "attributes": [...] } } ] }
//!
//! GET {base}/{api_key}/getNFTMetadata?contractAddress=0x..&tokenId=42
//! { "metadata": { "attributes": [ { "trait_type": "...", "value": "..." } ] } }
//! ```
//!
//! Indexers are the preferred first tier: one round trip, attributes
//! included, no ABI decoding. They are also the flakiest tier (rate
//! limits, lag), which is exactly what the resilient reader's fallback
//! chain is for.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;

use crate::types::{CanonicalAddress, TokenId};

use super::metadata::NftMetadata;
use super::{NftOwnershipSource, ProviderError, ProviderKind};

/// Indexer REST API provider.
pub struct RestIndexerProvider {
    base_url: String,
    api_key: String,
    client: Client,
}

impl RestIndexerProvider {
    /// Constructs a provider for `base_url` (without a trailing slash),
    /// authenticating with `api_key`, each call bounded by `timeout`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        // Avoid accidental double slashes.
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.api_key,
            path.trim_start_matches('/')
        )
    }

    fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let url = self.endpoint(path);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .map_err(|e| ProviderError::Transport(format!("GET {url} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::Service(format!(
                "indexer returned HTTP status {status} for {path}"
            )));
        }

        resp.json::<T>()
            .map_err(|e| ProviderError::Protocol(format!("failed to parse indexer response: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct OwnersResponse {
    #[serde(default)]
    owners: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OwnedNftsResponse {
    #[serde(default, rename = "ownedNfts")]
    owned_nfts: Vec<OwnedNft>,
    #[serde(default, rename = "totalCount")]
    total_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OwnedNft {
    #[serde(default, rename = "tokenId")]
    token_id: Option<String>,
    #[serde(default)]
    metadata: Option<NftMetadata>,
}

#[derive(Debug, Deserialize)]
struct TokenMetadataResponse {
    #[serde(default)]
    metadata: Option<NftMetadata>,
}

impl NftOwnershipSource for RestIndexerProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::RestIndexer
    }

    fn owner_of(
        &self,
        contract: &CanonicalAddress,
        token: TokenId,
    ) -> Result<CanonicalAddress, ProviderError> {
        let body: OwnersResponse = self.get_json(
            "getOwnersForToken",
            &[
                ("contractAddress", contract.as_str().to_string()),
                ("tokenId", token.to_string()),
            ],
        )?;

        let raw = body.owners.first().ok_or_else(|| {
            ProviderError::Service(format!("indexer reports no owner for token {token}"))
        })?;
        CanonicalAddress::normalize(raw)
            .map_err(|e| ProviderError::Protocol(format!("indexer returned bad owner: {e}")))
    }

    fn balance_of(
        &self,
        contract: &CanonicalAddress,
        wallet: &CanonicalAddress,
    ) -> Result<u64, ProviderError> {
        let body: OwnedNftsResponse = self.get_json(
            "getNFTs",
            &[
                ("owner", wallet.as_str().to_string()),
                ("contractAddresses[]", contract.as_str().to_string()),
            ],
        )?;

        Ok(body.total_count.unwrap_or(body.owned_nfts.len() as u64))
    }

    fn token_metadata(
        &self,
        contract: &CanonicalAddress,
        token: TokenId,
    ) -> Result<NftMetadata, ProviderError> {
        let body: TokenMetadataResponse = self.get_json(
            "getNFTMetadata",
            &[
                ("contractAddress", contract.as_str().to_string()),
                ("tokenId", token.to_string()),
            ],
        )?;

        body.metadata.ok_or_else(|| {
            ProviderError::Service(format!("indexer has no metadata for token {token}"))
        })
    }
}
