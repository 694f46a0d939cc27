//! Device unique id sources
//!
//! The id is read once when the service instance is created. On hardware it
//! comes from fuses; here a provider abstracts where the 16 bytes live.

use std::path::{Path, PathBuf};

use ote_core::{OteError, OteResult};
use ote_crypto::{DeviceUniqueId, DEVICE_ID_SIZE};
use tracing::debug;
use zeroize::Zeroizing;

pub trait DeviceIdProvider: Send + Sync {
    fn device_unique_id(&self) -> OteResult<DeviceUniqueId>;
}

/// Reads the id from a file holding either the raw 16 bytes or 32 hex
/// characters (surrounding whitespace ignored).
#[derive(Debug, Clone)]
pub struct FileDeviceId {
    path: PathBuf,
}

impl FileDeviceId {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DeviceIdProvider for FileDeviceId {
    fn device_unique_id(&self) -> OteResult<DeviceUniqueId> {
        let raw = Zeroizing::new(std::fs::read(&self.path).map_err(|e| {
            OteError::Config(format!("reading device id {}: {e}", self.path.display()))
        })?);
        debug!(path = %self.path.display(), "device id loaded");
        parse_device_id(&raw).ok_or_else(|| {
            OteError::Config(format!(
                "device id {} must be {DEVICE_ID_SIZE} raw bytes or {} hex characters",
                self.path.display(),
                DEVICE_ID_SIZE * 2
            ))
        })
    }
}

fn parse_device_id(raw: &[u8]) -> Option<DeviceUniqueId> {
    let mut bytes = Zeroizing::new([0u8; DEVICE_ID_SIZE]);
    if raw.len() == DEVICE_ID_SIZE {
        bytes.copy_from_slice(raw);
        return Some(DeviceUniqueId::from_bytes(*bytes));
    }
    let text = std::str::from_utf8(raw).ok()?.trim();
    hex::decode_to_slice(text, bytes.as_mut_slice()).ok()?;
    Some(DeviceUniqueId::from_bytes(*bytes))
}

/// A fixed id, for tests and embedders that obtain the id themselves.
#[derive(Debug, Clone)]
pub struct FixedDeviceId(DeviceUniqueId);

impl FixedDeviceId {
    pub fn new(id: DeviceUniqueId) -> Self {
        Self(id)
    }
}

impl DeviceIdProvider for FixedDeviceId {
    fn device_unique_id(&self) -> OteResult<DeviceUniqueId> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_raw_device_id() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[0x11; DEVICE_ID_SIZE]).unwrap();
        let id = FileDeviceId::new(f.path()).device_unique_id().unwrap();
        assert_eq!(id.as_bytes(), &[0x11; DEVICE_ID_SIZE]);
    }

    #[test]
    fn test_hex_device_id() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "00112233445566778899aabbccddeeff").unwrap();
        let id = FileDeviceId::new(f.path()).device_unique_id().unwrap();
        assert_eq!(id.as_bytes()[0], 0x00);
        assert_eq!(id.as_bytes()[15], 0xff);
    }

    #[test]
    fn test_bad_device_id() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"too short").unwrap();
        let err = FileDeviceId::new(f.path()).device_unique_id().unwrap_err();
        assert!(matches!(err, OteError::Config(_)));
    }

    #[test]
    fn test_missing_device_id() {
        let err = FileDeviceId::new("/nonexistent/device_id")
            .device_unique_id()
            .unwrap_err();
        assert!(matches!(err, OteError::Config(_)));
    }
}
