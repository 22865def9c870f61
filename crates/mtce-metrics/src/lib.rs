//! ---
//! mtce_section: "03-persistence-logging"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Metrics collection and export utilities."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
//! Prometheus families for the maintenance agent and the HTTP endpoint that
//! serves them.
//!
//! The exporter answers `/metrics` with the text exposition format and
//! `/ready` with 200 once the agent has flagged itself ready (503 before).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{GaugeVec, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

mod maintenance;

pub use maintenance::MaintenanceMetrics;

/// Shared registry type used across the agent.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Encode every registered family in the text exposition format.
pub fn render(registry: &Registry) -> Result<String> {
    TextEncoder::new()
        .encode_to_string(&registry.gather())
        .context("failed to encode metric families")
}

/// Readiness flag shared between the agent loop and the exporter.
#[derive(Debug, Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn set(&self, ready: bool) {
        self.0.store(ready, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Clone)]
struct ExporterState {
    registry: SharedRegistry,
    readiness: Readiness,
}

/// Start the exporter on `addr`. Port zero binds an ephemeral port.
pub async fn spawn_http_server(
    registry: SharedRegistry,
    readiness: Readiness,
    addr: SocketAddr,
) -> Result<MetricsServer> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics listener {addr}"))?;
    let bound = listener
        .local_addr()
        .context("failed to read metrics listener address")?;

    let app = Router::new()
        .route("/metrics", get(serve_metrics))
        .route("/ready", get(serve_ready))
        .with_state(ExporterState { registry, readiness });

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.wait_for(|stop| *stop).await;
            })
            .await
            .context("metrics exporter failed")
    });
    info!(address = %bound, "metrics exporter listening");

    Ok(MetricsServer {
        addr: bound,
        stop: stop_tx,
        task,
    })
}

async fn serve_metrics(State(state): State<ExporterState>) -> Response {
    match render(&state.registry) {
        Ok(body) => (
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(err) => {
            warn!(error = %err, "metrics scrape failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding error").into_response()
        }
    }
}

async fn serve_ready(State(state): State<ExporterState>) -> Response {
    if state.readiness.is_ready() {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "starting").into_response()
    }
}

/// Handle to the running exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    stop: watch::Sender<bool>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting scrapes and wait for in-flight requests to finish.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.stop.send(true);
        self.task.await.context("metrics exporter task panicked")?
    }
}

/// Process-level families: restarts, configuration load time, build info and
/// how long each dispatch tick takes.
#[derive(Clone)]
pub struct AgentMetrics {
    starts_total: IntCounter,
    config_load_seconds: Histogram,
    tick_seconds: Histogram,
    build_info: GaugeVec,
}

impl AgentMetrics {
    pub fn new(registry: &SharedRegistry) -> Result<Self> {
        let starts_total = IntCounter::with_opts(Opts::new(
            "mtcagent_starts_total",
            "Total number of times the maintenance agent has initialised",
        ))?;
        registry.register(Box::new(starts_total.clone()))?;

        let config_load_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "mtcagent_config_load_seconds",
                "Time spent loading and validating configuration",
            )
            .buckets(prometheus::exponential_buckets(0.001, 2.0, 12)?),
        )?;
        registry.register(Box::new(config_load_seconds.clone()))?;

        // Ticks should stay well under the dispatch period; buckets span 50us to ~200ms.
        let tick_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "mtcagent_tick_seconds",
                "Wall time of one dispatch tick across all hosts",
            )
            .buckets(prometheus::exponential_buckets(0.00005, 2.0, 12)?),
        )?;
        registry.register(Box::new(tick_seconds.clone()))?;

        let build_info = GaugeVec::new(
            Opts::new("mtcagent_build_info", "Build metadata for the running agent"),
            &["version", "profile"],
        )?;
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            starts_total,
            config_load_seconds,
            tick_seconds,
            build_info,
        })
    }

    pub fn inc_start(&self) {
        self.starts_total.inc();
    }

    pub fn observe_config_load(&self, elapsed: Duration) {
        self.config_load_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn observe_tick(&self, elapsed: Duration) {
        self.tick_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn ticks_observed(&self) -> u64 {
        self.tick_seconds.get_sample_count()
    }

    pub fn set_build_info(&self, version: &str, profile: &str) {
        self.build_info
            .with_label_values(&[version, profile])
            .set(1.0);
    }
}

pub use prometheus;
