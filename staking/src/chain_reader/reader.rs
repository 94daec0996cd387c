//! Ordered-fallback reader over the configured provider stack.
//!
//! Providers are tried strictly in configured priority order, one at a
//! time — no fan-out racing, so a provider that is already failing this
//! run does not keep burning quota. Individual provider failures are
//! absorbed and logged; callers only ever see
//! [`ReaderError::AllProvidersExhausted`].

use std::fmt;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::config::{ProviderConfig, ProviderSettings};
use crate::types::{CanonicalAddress, TokenId, unix_now};

use super::indexer::RestIndexerProvider;
use super::metadata::NftMetadata;
use super::rpc::JsonRpcProvider;
use super::scan::ExhaustiveScanProvider;
use super::{NftOwnershipSource, ProviderError, ProviderKind};

/// Consecutive failures after which a provider is demoted to the back of
/// the try order for the remainder of the current run.
const DEMOTE_AFTER: u32 = 3;

/// Errors surfaced by [`ResilientChainReader`].
#[derive(Debug)]
pub enum ReaderError {
    /// Every configured provider failed for this call.
    AllProvidersExhausted { operation: &'static str },
    /// The reader was constructed with an empty provider list.
    NoProvidersConfigured,
    /// A provider could not be built from its configuration.
    Config(String),
}

impl fmt::Display for ReaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderError::AllProvidersExhausted { operation } => {
                write!(f, "all providers exhausted for {operation}")
            }
            ReaderError::NoProvidersConfigured => write!(f, "no providers configured"),
            ReaderError::Config(msg) => write!(f, "provider configuration error: {msg}"),
        }
    }
}

impl std::error::Error for ReaderError {}

/// In-memory health of one provider. Never persisted; reset at the start
/// of every scheduler run.
#[derive(Clone, Debug)]
pub struct ProviderHealth {
    pub kind: ProviderKind,
    pub consecutive_failures: u32,
    pub last_success: Option<u64>,
    pub last_failure: Option<u64>,
}

impl ProviderHealth {
    fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            consecutive_failures: 0,
            last_success: None,
            last_failure: None,
        }
    }

    fn demoted(&self) -> bool {
        self.consecutive_failures >= DEMOTE_AFTER
    }
}

/// Ordered-fallback client over multiple blockchain data providers.
pub struct ResilientChainReader {
    providers: Vec<Box<dyn NftOwnershipSource>>,
    health: Mutex<Vec<ProviderHealth>>,
}

impl ResilientChainReader {
    /// Builds a reader over an explicit, already-constructed provider
    /// stack. The vector order is the priority order.
    pub fn new(providers: Vec<Box<dyn NftOwnershipSource>>) -> Result<Self, ReaderError> {
        if providers.is_empty() {
            return Err(ReaderError::NoProvidersConfigured);
        }
        let health = providers
            .iter()
            .map(|p| ProviderHealth::new(p.kind()))
            .collect();
        Ok(Self {
            providers,
            health: Mutex::new(health),
        })
    }

    /// Builds the provider stack from configuration, preserving the
    /// configured order as the priority order.
    pub fn from_config(configs: &[ProviderConfig]) -> Result<Self, ReaderError> {
        let mut providers: Vec<Box<dyn NftOwnershipSource>> = Vec::with_capacity(configs.len());
        for cfg in configs {
            let provider: Box<dyn NftOwnershipSource> = match &cfg.settings {
                ProviderSettings::RestIndexer { base_url, api_key } => Box::new(
                    RestIndexerProvider::new(base_url.clone(), api_key.clone(), cfg.timeout)
                        .map_err(|e| ReaderError::Config(e.to_string()))?,
                ),
                ProviderSettings::JsonRpc { endpoint } => Box::new(
                    JsonRpcProvider::new(endpoint.clone(), cfg.timeout, cfg.ipfs_gateway.clone())
                        .map_err(|e| ReaderError::Config(e.to_string()))?,
                ),
                ProviderSettings::ExhaustiveScan { endpoint, bounds } => Box::new(
                    ExhaustiveScanProvider::new(
                        endpoint.clone(),
                        cfg.timeout,
                        *bounds,
                        cfg.ipfs_gateway.clone(),
                    )
                    .map_err(|e| ReaderError::Config(e.to_string()))?,
                ),
            };
            providers.push(provider);
        }
        Self::new(providers)
    }

    /// Clears failure streaks so the next calls follow configured order
    /// again. The scheduler calls this at the start of every run.
    pub fn reset_health(&self) {
        let mut health = self.health.lock().expect("health lock poisoned");
        for entry in health.iter_mut() {
            entry.consecutive_failures = 0;
        }
    }

    /// Snapshot of per-provider health, for run summaries and logs.
    pub fn health_snapshot(&self) -> Vec<ProviderHealth> {
        self.health.lock().expect("health lock poisoned").clone()
    }

    /// Current owner of `token` under `contract`, via the first provider
    /// that answers.
    pub fn owner_of(
        &self,
        contract: &CanonicalAddress,
        token: TokenId,
    ) -> Result<CanonicalAddress, ReaderError> {
        self.with_fallback("owner_of", |provider| provider.owner_of(contract, token))
    }

    /// Number of tokens of `contract` held by `wallet`.
    pub fn balance_of(
        &self,
        contract: &CanonicalAddress,
        wallet: &CanonicalAddress,
    ) -> Result<u64, ReaderError> {
        self.with_fallback("balance_of", |provider| provider.balance_of(contract, wallet))
    }

    /// Attribute metadata for `token` under `contract`.
    pub fn token_metadata(
        &self,
        contract: &CanonicalAddress,
        token: TokenId,
    ) -> Result<NftMetadata, ReaderError> {
        self.with_fallback("token_metadata", |provider| {
            provider.token_metadata(contract, token)
        })
    }

    /// Priority order for the next call: configured order, with providers
    /// currently on a failure streak moved to the back (stable).
    fn try_order(&self) -> Vec<usize> {
        let health = self.health.lock().expect("health lock poisoned");
        let mut order: Vec<usize> = (0..self.providers.len()).collect();
        order.sort_by_key(|idx| health[*idx].demoted());
        order
    }

    fn record_success(&self, idx: usize) {
        let mut health = self.health.lock().expect("health lock poisoned");
        let entry = &mut health[idx];
        entry.consecutive_failures = 0;
        entry.last_success = Some(unix_now());
    }

    fn record_failure(&self, idx: usize) {
        let mut health = self.health.lock().expect("health lock poisoned");
        let entry = &mut health[idx];
        entry.consecutive_failures += 1;
        entry.last_failure = Some(unix_now());
    }

    fn with_fallback<T>(
        &self,
        operation: &'static str,
        op: impl Fn(&dyn NftOwnershipSource) -> Result<T, ProviderError>,
    ) -> Result<T, ReaderError> {
        for idx in self.try_order() {
            let provider = &self.providers[idx];
            match op(provider.as_ref()) {
                Ok(value) => {
                    debug!(provider = %provider.kind(), operation, "provider answered");
                    self.record_success(idx);
                    return Ok(value);
                }
                Err(e) => {
                    warn!(provider = %provider.kind(), operation, error = %e, "provider failed, advancing");
                    self.record_failure(idx);
                }
            }
        }
        Err(ReaderError::AllProvidersExhausted { operation })
    }
}
