//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and a set of strongly-typed verification metrics, and an
//! async HTTP exporter that serves `/metrics` using `hyper`.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header, server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use prometheus::{
    self, Counter, Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder,
};

/// Verification-run Prometheus metrics.
///
/// These are registered into a [`Registry`] and updated by the scheduler
/// at the end of each run (counters) and per run (histogram).
#[derive(Clone)]
pub struct VerificationMetrics {
    /// Wall-clock duration of a full verification run, in seconds.
    pub run_seconds: Histogram,
    /// Completed verification runs (scheduled and manual).
    pub runs_total: IntCounter,
    /// Stakes whose ownership was confirmed.
    pub stakes_verified: IntCounter,
    /// Stakes terminated because the NFT moved.
    pub stakes_ended: IntCounter,
    /// Stakes skipped because every provider failed (retried next run).
    pub stakes_skipped: IntCounter,
    /// Stakes whose processing hit a ledger or task failure.
    pub stake_failures: IntCounter,
    /// Total reward tokens written to the ledger.
    pub rewards_distributed: Counter,
}

impl VerificationMetrics {
    /// Registers verification metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let run_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "verification_run_seconds",
                "Wall-clock duration of a full verification run in seconds",
            )
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0]),
        )?;
        registry.register(Box::new(run_seconds.clone()))?;

        let runs_total = IntCounter::with_opts(Opts::new(
            "verification_runs_total",
            "Completed verification runs, scheduled and manual",
        ))?;
        registry.register(Box::new(runs_total.clone()))?;

        let stakes_verified = IntCounter::with_opts(Opts::new(
            "verification_stakes_verified_total",
            "Stakes whose on-chain ownership was confirmed",
        ))?;
        registry.register(Box::new(stakes_verified.clone()))?;

        let stakes_ended = IntCounter::with_opts(Opts::new(
            "verification_stakes_ended_total",
            "Stakes terminated because the NFT was transferred away",
        ))?;
        registry.register(Box::new(stakes_ended.clone()))?;

        let stakes_skipped = IntCounter::with_opts(Opts::new(
            "verification_stakes_skipped_total",
            "Stakes skipped because every provider was exhausted",
        ))?;
        registry.register(Box::new(stakes_skipped.clone()))?;

        let stake_failures = IntCounter::with_opts(Opts::new(
            "verification_stake_failures_total",
            "Stakes whose processing failed inside a run",
        ))?;
        registry.register(Box::new(stake_failures.clone()))?;

        let rewards_distributed = Counter::with_opts(Opts::new(
            "rewards_distributed_total",
            "Total reward tokens appended to the ledger",
        ))?;
        registry.register(Box::new(rewards_distributed.clone()))?;

        Ok(Self {
            run_seconds,
            runs_total,
            stakes_verified,
            stakes_ended,
            stakes_skipped,
            stake_failures,
            rewards_distributed,
        })
    }
}

/// Wrapper around a Prometheus registry and the verification metrics.
///
/// This is the main handle you pass around in the service. It can be
/// wrapped in an [`Arc`] and shared across threads/tasks.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub verification: VerificationMetrics,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh underlying `Registry`
    /// and registers the verification metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("staking".to_string()), None)?;
        let verification = VerificationMetrics::register(&registry)?;
        Ok(Self {
            registry,
            verification,
        })
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("failed to encode Prometheus metrics: {e}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server that exposes Prometheus metrics.
///
/// The server listens on `addr` and serves `GET /metrics` with the
/// Prometheus text exposition format. All other paths return 404.
///
/// This function is `async` and is intended to be spawned onto a Tokio
/// runtime, e.g.:
///
/// ```ignore
/// let registry = Arc::new(MetricsRegistry::new()?);
/// let addr: SocketAddr = "127.0.0.1:9898".parse()?;
/// tokio::spawn(run_prometheus_http_server(registry.clone(), addr));
/// ```
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                tracing::error!("prometheus HTTP server error: {err}");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = metrics.gather_text();
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
                .body(Full::new(Bytes::from(body)))
                .unwrap())
        }
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("not found")))
            .unwrap()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;

    #[test]
    fn verification_metrics_register_and_record() {
        let registry = Registry::new();
        let metrics = VerificationMetrics::register(&registry).expect("register metrics");

        metrics.run_seconds.observe(12.5);
        metrics.runs_total.inc();
        metrics.stakes_verified.inc();
        metrics.stakes_ended.inc();
        metrics.stakes_skipped.inc();
        metrics.rewards_distributed.inc_by(66.67);

        let metric_families = registry.gather();
        assert!(!metric_families.is_empty());
    }

    #[test]
    fn metrics_registry_gather_text_works() {
        let registry = MetricsRegistry::new().expect("create metrics registry");
        registry.verification.run_seconds.observe(0.01);
        let text = registry.gather_text();
        assert!(text.contains("verification_run_seconds"));
    }
}
