//! Unix domain socket host channel
//!
//! Frames are length-delimited JSON encodings of [`FileRequest`]. The daemon
//! listens and serves one connection at a time, so requests from every
//! connected service are serialized through a single consumer.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use ote_core::{
    FileRequest, OteError, OteResult, MAC_SIZE, MAX_OBJECT_DATA_LEN, TE_STORAGE_OBJID_MAX_LEN,
};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, info, warn};

use crate::{HostChannel, RequestSource, SourceError};

/// Frame limit never goes below this.
const MIN_FRAME_LEN: usize = 1024 * 1024;

/// JSON around the base64 payload: field names, request type, a name of up
/// to 64 escaped characters and the numeric fields.
const ENVELOPE_LEN: usize = 1024;

type Connection = Framed<UnixStream, LengthDelimitedCodec>;

/// Largest frame needed to carry a sealed object of `max_object_len` data
/// bytes in either direction.
pub fn max_frame_len(max_object_len: usize) -> usize {
    let blob = TE_STORAGE_OBJID_MAX_LEN
        .saturating_add(max_object_len)
        .saturating_add(MAC_SIZE);
    let encoded = blob.div_ceil(3).saturating_mul(4);
    encoded.saturating_add(ENVELOPE_LEN).max(MIN_FRAME_LEN)
}

fn frame_codec(max_frame_len: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(max_frame_len)
        .new_codec()
}

/// Service-side client. Connects lazily and reconnects after any failure.
pub struct SocketHost {
    path: PathBuf,
    max_frame_len: usize,
    conn: Mutex<Option<Connection>>,
}

impl SocketHost {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_frame_len: max_frame_len(MAX_OBJECT_DATA_LEN),
            conn: Mutex::new(None),
        }
    }

    /// Size frames for objects of up to `max_object_len` data bytes. Must
    /// match the daemon's setting.
    pub fn with_max_object_len(mut self, max_object_len: usize) -> Self {
        self.max_frame_len = max_frame_len(max_object_len);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn connect(&self) -> OteResult<Connection> {
        let stream = UnixStream::connect(&self.path).await.map_err(|e| {
            OteError::Communication(format!("connecting to {}: {e}", self.path.display()))
        })?;
        debug!(socket = %self.path.display(), "connected to host daemon");
        Ok(Framed::new(stream, frame_codec(self.max_frame_len)))
    }
}

#[async_trait]
impl HostChannel for SocketHost {
    async fn submit(&self, request: FileRequest) -> OteResult<FileRequest> {
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(OteError::Communication("no host connection".into()));
        };

        let result = exchange(conn, &request).await;
        if result.is_err() {
            // Start from a fresh connection next time.
            *guard = None;
        }
        result
    }
}

async fn exchange(conn: &mut Connection, request: &FileRequest) -> OteResult<FileRequest> {
    let frame = serde_json::to_vec(request)
        .map_err(|e| OteError::Communication(format!("encoding request: {e}")))?;
    conn.send(Bytes::from(frame))
        .await
        .map_err(|e| OteError::Communication(format!("sending request: {e}")))?;

    let reply = match conn.next().await {
        Some(Ok(frame)) => serde_json::from_slice::<FileRequest>(&frame)
            .map_err(|e| OteError::Communication(format!("decoding completion: {e}")))?,
        Some(Err(e)) => {
            return Err(OteError::Communication(format!("reading completion: {e}")));
        }
        None => {
            return Err(OteError::Communication(
                "host daemon closed the connection".into(),
            ));
        }
    };

    if reply.req_type != request.req_type || reply.name != request.name {
        return Err(OteError::Communication(format!(
            "completion for {} {} does not match request {} {}",
            reply.req_type.as_str(),
            reply.name,
            request.req_type.as_str(),
            request.name
        )));
    }
    Ok(reply)
}

/// Daemon-side listener.
pub struct SocketSource {
    listener: UnixListener,
    path: PathBuf,
    max_frame_len: usize,
    conn: Option<Connection>,
}

impl SocketSource {
    /// Bind `path`, replacing a stale socket left by a previous run.
    /// Must be called from within a tokio runtime.
    pub fn bind(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(socket = %path.display(), "removed stale socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let listener = UnixListener::bind(&path)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        info!(socket = %path.display(), "host channel: listening");

        Ok(Self {
            listener,
            path,
            max_frame_len: max_frame_len(MAX_OBJECT_DATA_LEN),
            conn: None,
        })
    }

    /// Accept frames for objects of up to `max_object_len` data bytes.
    /// Applies to connections accepted afterwards.
    pub fn with_max_object_len(mut self, max_object_len: usize) -> Self {
        self.max_frame_len = max_frame_len(max_object_len);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RequestSource for SocketSource {
    async fn next_request(&mut self) -> Result<FileRequest, SourceError> {
        loop {
            if self.conn.is_none() {
                let (stream, _) = self
                    .listener
                    .accept()
                    .await
                    .map_err(|e| SourceError::NoData(format!("accept: {e}")))?;
                debug!("service connected");
                self.conn = Some(Framed::new(stream, frame_codec(self.max_frame_len)));
            }
            let Some(conn) = self.conn.as_mut() else {
                continue;
            };

            match conn.next().await {
                Some(Ok(frame)) => match serde_json::from_slice::<FileRequest>(&frame) {
                    Ok(request) => return Ok(request),
                    Err(e) => {
                        warn!("dropping connection after malformed request: {e}");
                        self.conn = None;
                        return Err(SourceError::NoData(format!("malformed request: {e}")));
                    }
                },
                Some(Err(e)) => {
                    warn!("service connection failed: {e}");
                    self.conn = None;
                }
                None => {
                    debug!("service disconnected");
                    self.conn = None;
                }
            }
        }
    }

    async fn complete(&mut self, request: FileRequest) -> Result<(), SourceError> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(SourceError::Completion("service connection is gone".into()));
        };
        let frame = serde_json::to_vec(&request)
            .map_err(|e| SourceError::Completion(format!("encoding completion: {e}")))?;
        if let Err(e) = conn.send(Bytes::from(frame)).await {
            self.conn = None;
            return Err(SourceError::Completion(e.to_string()));
        }
        Ok(())
    }
}

impl Drop for SocketSource {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
