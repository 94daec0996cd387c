//! Blockchain data providers and the ordered-fallback reader.
//!
//! This module answers three questions about an NFT, against unreliable
//! third-party infrastructure:
//!
//! - who currently owns token `T` of contract `C` (`owner_of`),
//! - how many tokens of `C` does wallet `W` hold (`balance_of`),
//! - what metadata (attributes) does token `T` carry (`token_metadata`).
//!
//! Every data source — indexer REST API, JSON-RPC node, or the bounded
//! brute-force token scan — implements the same [`NftOwnershipSource`]
//! trait and is just another ranked provider behind
//! [`reader::ResilientChainReader`]; callers never special-case a
//! strategy.

pub mod indexer;
pub mod metadata;
pub mod reader;
pub mod rpc;
pub mod scan;

use std::fmt;

pub use indexer::RestIndexerProvider;
pub use metadata::{NftAttribute, NftMetadata};
pub use reader::{ProviderHealth, ReaderError, ResilientChainReader};
pub use rpc::JsonRpcProvider;
pub use scan::{ExhaustiveScanProvider, ScanBounds};

use crate::types::{CanonicalAddress, TokenId};

/// Kind of blockchain data provider, in the order they usually rank.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ProviderKind {
    /// Indexer REST API (can return attributes directly).
    RestIndexer,
    /// JSON-RPC `eth_call` against a full node.
    JsonRpc,
    /// Bounded token-id scan over a public fallback node.
    ExhaustiveScan,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderKind::RestIndexer => "rest_indexer",
            ProviderKind::JsonRpc => "json_rpc",
            ProviderKind::ExhaustiveScan => "exhaustive_scan",
        };
        f.write_str(name)
    }
}

/// Errors from a single provider. Absorbed and logged by the resilient
/// reader; only full-chain exhaustion is ever surfaced to callers.
#[derive(Debug)]
pub enum ProviderError {
    /// Transport-level failure (connection refused, timeout, DNS).
    Transport(String),
    /// The provider answered with something we could not interpret.
    Protocol(String),
    /// The provider answered with an explicit error (rate limit, revert).
    Service(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Transport(msg) => write!(f, "transport error: {msg}"),
            ProviderError::Protocol(msg) => write!(f, "protocol error: {msg}"),
            ProviderError::Service(msg) => write!(f, "service error: {msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// A single source of NFT ownership and metadata answers.
///
/// Implementations are expected to bound every call with their configured
/// timeout and to perform network I/O only — no persisted-state mutation.
/// They are `Send + Sync` so the scheduler can fan stakes out across
/// blocking tasks while sharing one provider stack.
pub trait NftOwnershipSource: Send + Sync {
    /// Which strategy this provider implements, for logs and health.
    fn kind(&self) -> ProviderKind;

    /// Current owner of `token` under `contract`.
    fn owner_of(
        &self,
        contract: &CanonicalAddress,
        token: TokenId,
    ) -> Result<CanonicalAddress, ProviderError>;

    /// Number of tokens of `contract` held by `wallet`.
    fn balance_of(
        &self,
        contract: &CanonicalAddress,
        wallet: &CanonicalAddress,
    ) -> Result<u64, ProviderError>;

    /// Attribute metadata for `token` under `contract`.
    fn token_metadata(
        &self,
        contract: &CanonicalAddress,
        token: TokenId,
    ) -> Result<NftMetadata, ProviderError>;
}
