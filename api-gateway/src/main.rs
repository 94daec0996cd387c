// api-gateway/src/main.rs

//! API gateway binary.
//!
//! This binary exposes the staking HTTP API on top of the `staking`
//! crate:
//!
//! - `GET /health`
//! - `GET /stakes?wallet=…`
//! - `POST /stakes`
//! - `POST /stakes/{id}/unstake`
//! - `GET /rewards/claimable?stakeId=…`
//! - `POST /claim/prepare`
//! - `POST /claim/confirm`
//! - `POST /admin/verify`
//!
//! It embeds a RocksDB-backed stake ledger, the ranked provider stack, a
//! background daily verification loop, and a Prometheus metrics exporter
//! on `/metrics` (separate port).

mod config;
mod routes;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::signal;

use staking::{
    CanonicalAddress, ClaimCoordinator, MetricsRegistry, OwnershipVerifier, RarityResolver,
    ResilientChainReader, RewardAccrualEngine, RocksDbStakingStore, StakeLifecycleManager,
    StakingConfig, StakingStore, VerificationScheduler, run_prometheus_http_server,
};

use config::ApiConfig;
use routes::{admin, claims, health, stakes};
use state::{AppState, SharedState};

#[tokio::main]
async fn main() {
    // Basic tracing setup.
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "api_gateway=info,staking=info".to_string()),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    // For now we use default configs. These can be externalised later.
    let api_cfg = ApiConfig::default();
    let staking_cfg = StakingConfig::default();

    // ---------------------------
    // Metrics
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new()
            .map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );

    // Metrics exporter.
    if staking_cfg.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = staking_cfg.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(metrics_clone, addr).await {
                eprintln!("metrics HTTP server error: {e}");
            }
        });
        tracing::info!("metrics exporter listening on http://{}/metrics", addr);
    }

    // ---------------------------
    // Storage + provider stack
    // ---------------------------

    let store: Arc<dyn StakingStore> = Arc::new(
        RocksDbStakingStore::open(&staking_cfg.storage).map_err(|e| {
            format!(
                "failed to open RocksDB store at {}: {e}",
                staking_cfg.storage.path
            )
        })?,
    );

    let reader = Arc::new(
        ResilientChainReader::from_config(&staking_cfg.providers)
            .map_err(|e| format!("failed to build provider stack: {e}"))?,
    );

    // ---------------------------
    // Verification + reward pipeline
    // ---------------------------

    let rarity = Arc::new(RarityResolver::new(reader.clone()));
    let rewards = RewardAccrualEngine::new(staking_cfg.rewards.clone());

    let lifecycle = Arc::new(StakeLifecycleManager::new(
        store.clone(),
        reader.clone(),
        rarity,
        rewards,
    ));
    let verifier = Arc::new(OwnershipVerifier::new(reader.clone()));

    let rewards_contract = CanonicalAddress::normalize(&staking_cfg.rewards_token_contract)
        .map_err(|e| format!("invalid rewards token contract address: {e}"))?;
    let claims = Arc::new(ClaimCoordinator::new(store.clone(), rewards_contract));

    let scheduler = Arc::new(VerificationScheduler::new(
        store.clone(),
        verifier,
        lifecycle.clone(),
        reader,
        metrics.clone(),
        staking_cfg.scheduler.clone(),
    ));

    // ---------------------------
    // Shared state
    // ---------------------------

    let app_state: SharedState = Arc::new(AppState {
        store,
        lifecycle,
        claims,
        scheduler: scheduler.clone(),
        metrics: metrics.clone(),
    });

    // ---------------------------
    // Daily verification loop
    // ---------------------------

    tokio::spawn(scheduler.run_forever());

    // ---------------------------
    // HTTP router
    // ---------------------------

    let app = Router::new()
        .route("/health", get(health::health))
        .route("/stakes", get(stakes::list_stakes).post(stakes::create_stake))
        .route("/stakes/{id}/unstake", post(stakes::unstake))
        .route("/rewards/claimable", get(claims::claimable))
        .route("/claim/prepare", post(claims::prepare_claim))
        .route("/claim/confirm", post(claims::confirm_claim))
        .route("/admin/verify", post(admin::trigger_verification))
        .with_state(app_state);

    // ---------------------------
    // axum 0.8 server (hyper 1 / tokio 1.48 style)
    // ---------------------------

    tracing::info!("API gateway listening on http://{}", api_cfg.listen_addr);

    let listener = tokio::net::TcpListener::bind(api_cfg.listen_addr)
        .await
        .map_err(|e| format!("failed to bind {}: {e}", api_cfg.listen_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("API server error: {e}"))?;

    Ok(())
}

/// Waits for Ctrl-C and returns, used for graceful shutdown.
async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
