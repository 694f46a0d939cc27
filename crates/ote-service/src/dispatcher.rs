//! Storage request dispatcher
//!
//! Entry points follow the trusted-application lifecycle: create the
//! instance, open sessions, hand each session's operations to
//! [`StorageService::receive_operation`], close sessions, destroy.
//!
//! On-disk layout of every object:
//! ```text
//! seal(identity, [64 bytes: zero-padded name][N bytes: data])
//! ```
//! The name prefix binds a blob to the name it was written under. A blob
//! copied to another file name still passes the MAC but fails the prefix
//! check on read.

use std::sync::atomic::{AtomicU64, Ordering};

use ote_core::{
    CallerIdentity, FileRequest, ObjectId, OteError, OteResult, StorageCommand, MAC_SIZE,
    MAX_OBJECT_DATA_LEN, TE_STORAGE_OBJID_MAX_LEN,
};
use ote_crypto::IdentityKey;
use ote_host::HostChannel;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::context::SecureStorageContext;
use crate::device::DeviceIdProvider;
use crate::operation::Operation;
use crate::session::Session;

/// Bytes every stored blob carries beyond the object data.
pub const BLOB_OVERHEAD: usize = TE_STORAGE_OBJID_MAX_LEN + MAC_SIZE;

pub struct StorageService<H> {
    context: SecureStorageContext,
    host: H,
    max_object_len: usize,
    next_session: AtomicU64,
}

impl<H: HostChannel> StorageService<H> {
    /// Read the device id and derive the storage keys.
    pub fn create(provider: &dyn DeviceIdProvider, host: H) -> OteResult<Self> {
        let context = SecureStorageContext::create(provider)?;
        Ok(Self {
            context,
            host,
            max_object_len: MAX_OBJECT_DATA_LEN,
            next_session: AtomicU64::new(1),
        })
    }

    pub fn with_max_object_len(mut self, max_object_len: usize) -> Self {
        self.max_object_len = max_object_len;
        self
    }

    pub fn max_object_len(&self) -> usize {
        self.max_object_len
    }

    pub fn open_session(&self, caller: Option<CallerIdentity>) -> Session {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        debug!(session = id, caller = ?caller.map(|c| c.uuid()), "session opened");
        Session::new(id, caller)
    }

    pub fn close_session(&self, session: Session) {
        debug!(session = session.id(), "session closed");
    }

    /// Tear down the instance. Key material is zeroed as the context drops.
    pub fn destroy(self) {
        info!("secure storage service destroyed");
    }

    /// Execute one operation for `session`.
    ///
    /// Output values are reset to 0 up front and only written on success.
    pub async fn receive_operation(&self, session: &Session, op: &mut Operation) -> OteResult<()> {
        let command = StorageCommand::try_from(op.command)?;
        let result = self.dispatch(command, session, op).await;
        match &result {
            Ok(()) => debug!(session = session.id(), command = op.command, "operation complete"),
            Err(e) => warn!(
                session = session.id(),
                command = op.command,
                code = %format!("{:#010x}", e.code()),
                "operation failed: {e}"
            ),
        }
        result
    }

    async fn dispatch(
        &self,
        command: StorageCommand,
        session: &Session,
        op: &mut Operation,
    ) -> OteResult<()> {
        match command {
            StorageCommand::Write => {
                op.set_value(2, 0)?;
                let identity = session.identity_key()?;
                let name = ObjectId::from_bytes(op.memref(0)?)?;
                let written = self.write(identity, &name, op.memref(1)?).await?;
                op.set_value(2, written)
            }
            StorageCommand::Read => {
                op.set_value(2, 0)?;
                let identity = session.identity_key()?;
                let name = ObjectId::from_bytes(op.memref(0)?)?;
                let buffer = op.memref_mut(1)?;
                let n = self.read(identity, &name, buffer).await?;
                op.set_value(2, n)
            }
            StorageCommand::Size => {
                op.set_value(1, 0)?;
                session.identity_key()?;
                let name = ObjectId::from_bytes(op.memref(0)?)?;
                let size = self.size(&name).await?;
                op.set_value(1, size)
            }
            StorageCommand::Delete => {
                session.identity_key()?;
                let name = ObjectId::from_bytes(op.memref(0)?)?;
                self.delete(&name).await
            }
        }
    }

    async fn write(&self, identity: &IdentityKey, name: &ObjectId, data: &[u8]) -> OteResult<u32> {
        if data.len() > self.max_object_len {
            return Err(OteError::BadParameters(format!(
                "object is {} bytes (max {})",
                data.len(),
                self.max_object_len
            )));
        }

        let mut plaintext =
            Zeroizing::new(Vec::with_capacity(TE_STORAGE_OBJID_MAX_LEN + data.len()));
        plaintext.extend_from_slice(&name.prefix());
        plaintext.extend_from_slice(data);
        let blob = self.context.seal(identity, &plaintext)?;
        let blob_len = blob.len() as u64;

        let done = self.submit(FileRequest::write(name, blob)).await?;
        if done.result != blob_len {
            return Err(OteError::Communication(format!(
                "host wrote {} of {blob_len} bytes for {name}",
                done.result
            )));
        }
        Ok(data.len() as u32)
    }

    async fn read(
        &self,
        identity: &IdentityKey,
        name: &ObjectId,
        buffer: &mut Vec<u8>,
    ) -> OteResult<u32> {
        let max_blob = TE_STORAGE_OBJID_MAX_LEN + self.max_object_len + MAC_SIZE;
        let done = self.submit(FileRequest::read(name, max_blob)).await?;
        if done.data.len() as u64 != done.result {
            return Err(OteError::Communication(format!(
                "host reported {} bytes but returned {} for {name}",
                done.result,
                done.data.len()
            )));
        }
        if done.data.len() < BLOB_OVERHEAD {
            return Err(OteError::AccessDenied);
        }

        let plaintext = self.context.open(identity, &done.data)?;
        let (prefix, data) = plaintext.split_at(TE_STORAGE_OBJID_MAX_LEN);
        if !bool::from(prefix.ct_eq(&name.prefix()[..])) {
            return Err(OteError::AccessDenied);
        }
        if data.len() > buffer.len() {
            return Err(OteError::BadParameters(format!(
                "buffer holds {} bytes, object is {}",
                buffer.len(),
                data.len()
            )));
        }

        buffer[..data.len()].copy_from_slice(data);
        buffer.truncate(data.len());
        Ok(data.len() as u32)
    }

    async fn size(&self, name: &ObjectId) -> OteResult<u32> {
        let done = self.submit(FileRequest::size(name)).await?;
        let stored = usize::try_from(done.result).map_err(|_| OteError::AccessDenied)?;
        let data_len = stored.checked_sub(BLOB_OVERHEAD).ok_or(OteError::AccessDenied)?;
        u32::try_from(data_len).map_err(|_| OteError::AccessDenied)
    }

    async fn delete(&self, name: &ObjectId) -> OteResult<()> {
        self.submit(FileRequest::delete(name)).await?;
        Ok(())
    }

    /// Round-trip one request through the host and classify its errno.
    async fn submit(&self, request: FileRequest) -> OteResult<FileRequest> {
        let req_type = request.req_type;
        let done = self.host.submit(request).await?;
        if !done.is_ok() {
            debug!(
                req = req_type.as_str(),
                object = %done.name,
                errno = done.error,
                "host request failed"
            );
            return Err(OteError::from_host_errno(done.error, &done.name));
        }
        Ok(done)
    }
}
