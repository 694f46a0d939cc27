//! In-process host channel: a bounded tokio queue drained by a single consumer

use async_trait::async_trait;
use ote_core::{FileRequest, OteError, OteResult};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::{HostChannel, RequestSource, SourceError};

struct Envelope {
    request: FileRequest,
    reply: oneshot::Sender<FileRequest>,
}

/// Service-side handle. Cheap to clone; all clones feed the same queue.
#[derive(Clone)]
pub struct ChannelHost {
    tx: mpsc::Sender<Envelope>,
}

/// Daemon-side end of the queue.
pub struct ChannelSource {
    rx: mpsc::Receiver<Envelope>,
    pending: Option<oneshot::Sender<FileRequest>>,
}

/// Create a connected host/source pair holding at most `capacity` queued requests.
pub fn host_channel(capacity: usize) -> (ChannelHost, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChannelHost { tx }, ChannelSource { rx, pending: None })
}

#[async_trait]
impl HostChannel for ChannelHost {
    async fn submit(&self, request: FileRequest) -> OteResult<FileRequest> {
        let (reply, done) = oneshot::channel();
        self.tx
            .send(Envelope { request, reply })
            .await
            .map_err(|_| OteError::Communication("host daemon is not running".into()))?;
        done.await.map_err(|_| {
            OteError::Communication("host daemon dropped the request without completing it".into())
        })
    }
}

#[async_trait]
impl RequestSource for ChannelSource {
    async fn next_request(&mut self) -> Result<FileRequest, SourceError> {
        if self.pending.take().is_some() {
            warn!("previous request was never completed; caller will see a communication error");
        }
        match self.rx.recv().await {
            Some(Envelope { request, reply }) => {
                self.pending = Some(reply);
                Ok(request)
            }
            None => Err(SourceError::Closed),
        }
    }

    async fn complete(&mut self, request: FileRequest) -> Result<(), SourceError> {
        let reply = self
            .pending
            .take()
            .ok_or_else(|| SourceError::Completion("no request in flight".into()))?;
        reply
            .send(request)
            .map_err(|_| SourceError::Completion("caller stopped waiting".into()))
    }
}
