//! Staking library crate.
//!
//! This crate provides the core building blocks for the NFT staking
//! backend:
//!
//! - strongly-typed domain types (`types`),
//! - a resilient multi-provider chain reader (`chain_reader`),
//! - ownership verification and rarity resolution (`ownership`, `rarity`),
//! - reward accrual and claim coordination (`rewards`, `claims`),
//! - the stake lifecycle state machine (`lifecycle`),
//! - the daily verification scheduler (`scheduler`),
//! - storage backends (`storage`),
//! - Prometheus-based metrics (`metrics`),
//! - and a top-level service configuration (`config`).
//!
//! Higher-level binaries compose these pieces into the HTTP gateway.

pub mod chain_reader;
pub mod claims;
pub mod config;
pub mod lifecycle;
pub mod metrics;
pub mod ownership;
pub mod rarity;
pub mod rewards;
pub mod scheduler;
pub mod storage;
pub mod types;

// Re-export top-level configuration types.
pub use config::{MetricsConfig, ProviderConfig, ProviderSettings, StakingConfig};

// Re-export the chain-reading stack.
pub use chain_reader::{
    NftMetadata, NftOwnershipSource, ProviderError, ProviderKind, ReaderError,
    ResilientChainReader,
};

// Re-export storage backends.
pub use storage::{InMemoryStakingStore, RocksDbConfig, RocksDbStakingStore, StakingStore, StorageError};

// Re-export the verification and reward pipeline.
pub use claims::{ClaimCoordinator, ClaimError, ClaimTransaction, PreparedClaim};
pub use lifecycle::{StakeError, StakeLifecycleManager, StakeTransition};
pub use ownership::{OwnershipVerifier, VerificationOutcome};
pub use rarity::{RarityInfo, RarityResolver};
pub use rewards::{RewardAccrualEngine, RewardConfig};
pub use scheduler::{RunSummary, SchedulerConfig, VerificationScheduler};

// Re-export metrics registry and verification metrics.
pub use metrics::{MetricsRegistry, VerificationMetrics, run_prometheus_http_server};

// Re-export domain types at the crate root for convenience.
pub use types::*;
