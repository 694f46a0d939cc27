//! Storage objects as a trusted application sees them
//!
//! An object is opened by name with a set of access flags. Each call builds
//! the matching [`Operation`] and runs it through the service, so access
//! checks, sealing and host I/O are exactly those of the raw command path.

use std::ops::BitOr;

use ote_core::{ObjectId, OteError, OteResult};
use ote_host::HostChannel;
use tracing::debug;

use crate::dispatcher::StorageService;
use crate::operation::Operation;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessFlags(u32);

impl AccessFlags {
    pub const READ: Self = Self(0x1);
    pub const WRITE: Self = Self(0x2);
    pub const WRITE_META: Self = Self(0x4);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for AccessFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

pub struct StorageObject<'a, H> {
    service: &'a StorageService<H>,
    session: &'a Session,
    name: ObjectId,
    flags: AccessFlags,
}

impl<'a, H: HostChannel> StorageObject<'a, H> {
    pub fn open(
        service: &'a StorageService<H>,
        session: &'a Session,
        name: &str,
        flags: AccessFlags,
    ) -> OteResult<Self> {
        let name = ObjectId::parse(name)?;
        debug!(object = %name, flags = flags.bits(), "storage object opened");
        Ok(Self {
            service,
            session,
            name,
            flags,
        })
    }

    pub fn name(&self) -> &ObjectId {
        &self.name
    }

    /// Replace the object's contents with `data`.
    pub async fn write(&self, data: &[u8]) -> OteResult<()> {
        self.require(AccessFlags::WRITE, "write")?;
        let mut op = Operation::write(&self.name, data);
        self.service.receive_operation(self.session, &mut op).await
    }

    /// Read the object into `buf`, returning the number of bytes copied.
    pub async fn read(&self, buf: &mut [u8]) -> OteResult<usize> {
        self.require(AccessFlags::READ, "read")?;
        let mut op = Operation::read(&self.name, buf.len());
        self.service.receive_operation(self.session, &mut op).await?;
        let data = op.memref(1)?;
        buf[..data.len()].copy_from_slice(data);
        Ok(data.len())
    }

    /// Length of the stored data, excluding the name prefix and MAC.
    pub async fn size(&self) -> OteResult<u32> {
        self.require(AccessFlags::READ, "size")?;
        let mut op = Operation::size(&self.name);
        self.service.receive_operation(self.session, &mut op).await?;
        op.value(1)
    }

    /// Remove the object. Requires `WRITE_META`; the handle is consumed
    /// either way.
    pub async fn delete(self) -> OteResult<()> {
        self.require(AccessFlags::WRITE_META, "delete")?;
        let mut op = Operation::delete(&self.name);
        self.service.receive_operation(self.session, &mut op).await
    }

    pub fn close(self) {}

    fn require(&self, needed: AccessFlags, what: &str) -> OteResult<()> {
        if self.flags.contains(needed) {
            Ok(())
        } else {
            Err(OteError::BadParameters(format!(
                "{what} not permitted on {} (flags {:#x})",
                self.name,
                self.flags.bits()
            )))
        }
    }
}

impl<H> Drop for StorageObject<'_, H> {
    fn drop(&mut self) {
        debug!(object = %self.name, "storage object closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let rw = AccessFlags::READ | AccessFlags::WRITE;
        assert!(rw.contains(AccessFlags::READ));
        assert!(rw.contains(AccessFlags::WRITE));
        assert!(!rw.contains(AccessFlags::WRITE_META));
        assert!(!AccessFlags::default().contains(AccessFlags::READ));
        assert_eq!(rw.bits(), 0x3);
    }
}
