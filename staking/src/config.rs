//! Top-level configuration for the staking backend.
//!
//! This module aggregates configuration for:
//!
//! - the ranked provider stack (`ProviderConfig` list),
//! - reward accrual (`RewardConfig`),
//! - the daily verification scheduler (`SchedulerConfig`),
//! - storage (RocksDB path and creation flags),
//! - metrics exporter (enable flag + listen address).
//!
//! Everything is an explicit immutable struct injected at construction.
//! Provider URLs and API keys in particular are never read from
//! process-wide mutable state; the reader gets exactly the stack listed
//! here, in this order.

use std::net::SocketAddr;
use std::time::Duration;

use crate::chain_reader::ScanBounds;
use crate::chain_reader::metadata::DEFAULT_IPFS_GATEWAY;
use crate::rewards::RewardConfig;
use crate::scheduler::SchedulerConfig;
use crate::storage::RocksDbConfig;

/// Strategy-specific settings for one provider.
#[derive(Clone, Debug)]
pub enum ProviderSettings {
    /// Indexer REST API with an account key.
    RestIndexer { base_url: String, api_key: String },
    /// JSON-RPC full node.
    JsonRpc { endpoint: String },
    /// Public fallback node with a bounded brute-force token sweep.
    ExhaustiveScan { endpoint: String, bounds: ScanBounds },
}

/// One entry of the ranked provider list.
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub settings: ProviderSettings,
    /// Per-call timeout for this provider.
    pub timeout: Duration,
    /// HTTP gateway used to rewrite `ipfs://` token URIs.
    pub ipfs_gateway: String,
}

impl ProviderConfig {
    /// Builds a provider entry with the default IPFS gateway.
    pub fn new(settings: ProviderSettings, timeout: Duration) -> Self {
        Self {
            settings,
            timeout,
            ipfs_gateway: DEFAULT_IPFS_GATEWAY.to_string(),
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Whether to run a `/metrics` HTTP exporter.
    pub enabled: bool,
    /// Address to bind the metrics HTTP server to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        // Safe to unwrap: this is a fixed, valid address literal.
        let addr: SocketAddr = "127.0.0.1:9898"
            .parse()
            .expect("hard-coded metrics listen address should parse");
        Self {
            enabled: true,
            listen_addr: addr,
        }
    }
}

/// Top-level configuration for the staking backend.
///
/// This aggregates all the sub-configs needed to wire up the service:
///
/// - ranked providers (`providers`),
/// - reward accrual (`rewards`),
/// - verification scheduling (`scheduler`),
/// - persistent storage (`storage`),
/// - Prometheus metrics exporter (`metrics`).
#[derive(Clone, Debug)]
pub struct StakingConfig {
    pub providers: Vec<ProviderConfig>,
    pub rewards: RewardConfig,
    /// Rewards token contract claims are drawn from, as a raw address
    /// string; normalized once at wiring time.
    pub rewards_token_contract: String,
    pub scheduler: SchedulerConfig,
    pub storage: RocksDbConfig,
    pub metrics: MetricsConfig,
}

impl Default for StakingConfig {
    fn default() -> Self {
        // Keyless defaults: a primary public node plus the scan fallback.
        // Deployments with an indexer account prepend a RestIndexer entry.
        let providers = vec![
            ProviderConfig::new(
                ProviderSettings::JsonRpc {
                    endpoint: "https://eth.llamarpc.com".to_string(),
                },
                Duration::from_secs(5),
            ),
            ProviderConfig::new(
                ProviderSettings::ExhaustiveScan {
                    endpoint: "https://ethereum-rpc.publicnode.com".to_string(),
                    bounds: ScanBounds::default(),
                },
                Duration::from_secs(5),
            ),
        ];

        Self {
            providers,
            rewards: RewardConfig::default(),
            rewards_token_contract: "0x0000000000000000000000000000000000000000".to_string(),
            scheduler: SchedulerConfig::default(),
            storage: RocksDbConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}
