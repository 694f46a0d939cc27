//! tlkd: host file daemon for the secure storage service
//!
//! Pulls file requests from a [`ote_host::RequestSource`], performs them
//! against a flat directory of blobs, and signals each completion.

pub mod daemon;
pub mod daemonize;
pub mod metrics;
pub mod store;

pub use daemon::{Daemon, DaemonError, DEFAULT_NEW_REQUEST_RETRIES};
pub use metrics::DaemonMetrics;
pub use store::HostFileStore;
