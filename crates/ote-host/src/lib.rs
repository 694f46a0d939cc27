//! ote-host: the secure-world ↔ host-daemon request channel
//!
//! The storage service submits a [`FileRequest`] through a [`HostChannel`]
//! and blocks until the daemon hands the completed request back. The daemon
//! pulls requests from a [`RequestSource`] one at a time and signals each
//! completion before fetching the next.
//!
//! Two transports are provided:
//! - `channel`: in-process tokio queue with a oneshot reply per request
//! - `socket`: Unix domain socket, length-delimited JSON frames

pub mod channel;
pub mod socket;

use async_trait::async_trait;
use ote_core::{FileRequest, OteResult};

pub use channel::{host_channel, ChannelHost, ChannelSource};
pub use socket::{SocketHost, SocketSource};

/// Service side: hand a request to the host and wait for its completion.
#[async_trait]
pub trait HostChannel: Send + Sync {
    async fn submit(&self, request: FileRequest) -> OteResult<FileRequest>;
}

/// Daemon side: fetch requests and signal their completion.
#[async_trait]
pub trait RequestSource: Send {
    /// Block until the next request arrives.
    async fn next_request(&mut self) -> Result<FileRequest, SourceError>;

    /// Return the filled-in request to the waiting caller.
    async fn complete(&mut self, request: FileRequest) -> Result<(), SourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Transient: nothing could be fetched this time. Counted against the
    /// daemon's retry budget.
    #[error("no request available: {0}")]
    NoData(String),

    /// The service side has gone away for good.
    #[error("request source closed")]
    Closed,

    /// The completion could not be delivered to the caller.
    #[error("completion not delivered: {0}")]
    Completion(String),
}
