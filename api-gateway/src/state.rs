//! Shared application state.

use std::sync::Arc;

use staking::{
    ClaimCoordinator, MetricsRegistry, StakeLifecycleManager, StakingStore, VerificationScheduler,
};

/// Shared state held by the API and background tasks.
///
/// This is wrapped in an [`Arc`] and passed to request handlers via Axum's
/// `State` extractor. Everything inside already uses interior mutability
/// (store locks, reader health), so no outer lock is needed here.
pub struct AppState {
    /// Stake and reward ledger.
    pub store: Arc<dyn StakingStore>,
    /// Creates, verifies, and terminates stakes.
    pub lifecycle: Arc<StakeLifecycleManager>,
    /// Claim totals and reconciliation.
    pub claims: Arc<ClaimCoordinator>,
    /// Daily verification driver; also serves manual `/admin/verify`.
    pub scheduler: Arc<VerificationScheduler>,
    /// Metrics registry shared between the scheduler and the API.
    pub metrics: Arc<MetricsRegistry>,
}

/// Thread-safe alias for `AppState`.
pub type SharedState = Arc<AppState>;
