//! Request counters for the daemon loop and the HTTP endpoint exposing them

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus_client::{
    encoding::text::encode,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};
use std::sync::Arc;
use tracing::{error, info};

const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Counters updated by the request loop
#[derive(Clone, Default)]
pub struct DaemonMetrics {
    requests: Family<Vec<(String, String)>, Counter>,
    fetch_failures: Counter,
}

impl DaemonMetrics {
    pub fn new(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "tlkd_requests",
            "File requests handled, by request type and outcome",
            metrics.requests.clone(),
        );
        registry.register(
            "tlkd_fetch_failures",
            "Failed attempts to fetch a new request",
            metrics.fetch_failures.clone(),
        );
        metrics
    }

    pub fn record_request(&self, req_type: &str, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        self.requests
            .get_or_create(&vec![
                ("type".to_string(), req_type.to_string()),
                ("outcome".to_string(), outcome.to_string()),
            ])
            .inc();
    }

    pub fn record_fetch_failure(&self) {
        self.fetch_failures.inc();
    }

    pub fn requests(&self, req_type: &str, outcome: &str) -> u64 {
        self.requests
            .get_or_create(&vec![
                ("type".to_string(), req_type.to_string()),
                ("outcome".to_string(), outcome.to_string()),
            ])
            .get()
    }

    pub fn fetch_failures(&self) -> u64 {
        self.fetch_failures.get()
    }
}

/// HTTP surface over a registry: `/metrics` for scrapes, `/healthz` for
/// liveness.
pub struct MetricsEndpoint {
    registry: Arc<Registry>,
}

impl MetricsEndpoint {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(scrape))
            .route("/healthz", get(|| async { "ok" }))
            .with_state(Arc::clone(&self.registry))
    }

    /// Bind `addr` and serve until the listener fails.
    pub async fn serve(self, addr: &str) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding metrics endpoint {addr}"))?;
        info!(addr, "tlkd: metrics endpoint up");
        axum::serve(listener, self.router())
            .await
            .context("metrics endpoint stopped")
    }
}

/// Text exposition of every metric in `registry`.
pub fn render(registry: &Registry) -> Result<String, std::fmt::Error> {
    let mut body = String::new();
    encode(&mut body, registry)?;
    Ok(body)
}

async fn scrape(State(registry): State<Arc<Registry>>) -> Response {
    match render(&registry) {
        Ok(body) => ([(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!("rendering metrics: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
