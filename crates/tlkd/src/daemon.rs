//! The host daemon request loop
//!
//! ```text
//! WAIT_FOR_REQUEST → VALIDATE_HOME_DIR → DISPATCH_BY_TYPE → SIGNAL_COMPLETE
//!        ↑                                                        │
//!        └────────────────────────────────────────────────────────┘
//! ```
//!
//! One request is handled at a time. Transient fetch failures are retried up
//! to a budget of consecutive failures; running out of budget stops the
//! daemon with an error.

use ote_host::{RequestSource, SourceError};
use tracing::{debug, error, info, warn};

use crate::metrics::DaemonMetrics;
use crate::store::HostFileStore;

/// Default number of consecutive fetch failures tolerated.
pub const DEFAULT_NEW_REQUEST_RETRIES: u32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("giving up after {attempts} consecutive failures to fetch a request: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

pub struct Daemon<S> {
    source: S,
    store: HostFileStore,
    retries: u32,
    metrics: Option<DaemonMetrics>,
}

impl<S: RequestSource> Daemon<S> {
    pub fn new(source: S, store: HostFileStore) -> Self {
        Self {
            source,
            store,
            retries: DEFAULT_NEW_REQUEST_RETRIES,
            metrics: None,
        }
    }

    pub fn with_retry_budget(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_metrics(mut self, metrics: DaemonMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Serve requests until the source closes or the retry budget runs out.
    pub async fn run(mut self) -> Result<(), DaemonError> {
        info!(
            root = %self.store.root().display(),
            retries = self.retries,
            "tlkd: serving file requests"
        );
        let mut failures: u32 = 0;

        loop {
            let mut req = match self.source.next_request().await {
                Ok(req) => {
                    failures = 0;
                    req
                }
                Err(SourceError::Closed) => {
                    info!("request source closed, stopping");
                    return Ok(());
                }
                Err(e) => {
                    failures += 1;
                    if let Some(m) = &self.metrics {
                        m.record_fetch_failure();
                    }
                    if failures > self.retries {
                        error!(attempts = failures, "new request retries exhausted: {e}");
                        return Err(DaemonError::RetriesExhausted {
                            attempts: failures,
                            last: e.to_string(),
                        });
                    }
                    warn!(
                        attempt = failures,
                        budget = self.retries,
                        "fetching request failed: {e}"
                    );
                    continue;
                }
            };

            debug!(
                req = req.req_type.as_str(),
                object = %req.name,
                len = req.data_len,
                "request"
            );
            self.store.handle(&mut req);
            if let Some(m) = &self.metrics {
                m.record_request(req.req_type.as_str(), req.is_ok());
            }

            if let Err(e) = self.source.complete(req).await {
                warn!("signalling completion failed: {e}");
            }
        }
    }
}
