//! Metrics and instrumentation for the staking backend.
//!
//! This module defines Prometheus-compatible metrics for the verification
//! scheduler and exposes a small HTTP exporter that serves `/metrics` in
//! Prometheus text format.
//!
//! Typical usage in the gateway:
//!
//! ```ignore
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//! use staking::metrics::{MetricsRegistry, run_prometheus_http_server};
//!
//! let registry = Arc::new(MetricsRegistry::new()?);
//! let addr: SocketAddr = "127.0.0.1:9898".parse()?;
//!
//! // Spawn the HTTP exporter in the background:
//! tokio::spawn(run_prometheus_http_server(registry.clone(), addr));
//!
//! // Elsewhere in the code:
//! registry.verification.stakes_verified.inc();
//! ```

pub mod prometheus;

pub use prometheus::{MetricsRegistry, VerificationMetrics, run_prometheus_http_server};
