use serde::{Deserialize, Serialize};

use crate::error::{OteError, OteResult};

/// Longest object name a caller may use, and the size of the name prefix
/// embedded in every sealed blob.
pub const TE_STORAGE_OBJID_MAX_LEN: usize = 64;

/// CMAC trailer appended to every sealed blob.
pub const MAC_SIZE: usize = 16;

/// Largest object payload the service will seal or expect back from the host.
pub const MAX_OBJECT_DATA_LEN: usize = 64 * 1024;

/// Storage service command IDs
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageCommand {
    Write = 301,
    Read = 302,
    Size = 303,
    Delete = 304,
}

impl StorageCommand {
    pub fn id(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for StorageCommand {
    type Error = OteError;

    fn try_from(id: u32) -> OteResult<Self> {
        match id {
            301 => Ok(StorageCommand::Write),
            302 => Ok(StorageCommand::Read),
            303 => Ok(StorageCommand::Size),
            304 => Ok(StorageCommand::Delete),
            other => Err(OteError::BadParameters(format!("unknown command {other}"))),
        }
    }
}

/// Kind of file request handed to the host daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Read,
    Write,
    Delete,
    Size,
}

impl RequestType {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestType::Read => "read",
            RequestType::Write => "write",
            RequestType::Delete => "delete",
            RequestType::Size => "size",
        }
    }
}

/// A file request crossing the secure/non-secure boundary.
///
/// The service fills `req_type`, `name`, `data_len` and (for writes) `data`.
/// The daemon fills `result`, `error` and (for reads) `data`, then hands the
/// same structure back as the completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRequest {
    pub req_type: RequestType,
    pub name: String,
    /// Write: blob length. Read: largest length the caller expects.
    pub data_len: u32,
    #[serde(with = "base64_bytes", default)]
    pub data: Vec<u8>,
    /// Byte count produced by the daemon
    #[serde(default)]
    pub result: u64,
    /// errno reported by the daemon, 0 on success
    #[serde(default)]
    pub error: i32,
}

impl FileRequest {
    pub fn read(name: &ObjectId, max_len: usize) -> Self {
        Self::new(RequestType::Read, name, max_len as u32, Vec::new())
    }

    pub fn write(name: &ObjectId, blob: Vec<u8>) -> Self {
        let len = blob.len() as u32;
        Self::new(RequestType::Write, name, len, blob)
    }

    pub fn size(name: &ObjectId) -> Self {
        Self::new(RequestType::Size, name, 0, Vec::new())
    }

    pub fn delete(name: &ObjectId) -> Self {
        Self::new(RequestType::Delete, name, 0, Vec::new())
    }

    fn new(req_type: RequestType, name: &ObjectId, data_len: u32, data: Vec<u8>) -> Self {
        Self {
            req_type,
            name: name.as_str().to_string(),
            data_len,
            data,
            result: 0,
            error: 0,
        }
    }

    /// Mark the request failed with `errno`.
    pub fn fail(&mut self, errno: i32) {
        self.result = 0;
        self.error = errno;
        self.data.clear();
    }

    pub fn is_ok(&self) -> bool {
        self.error == 0
    }
}

/// A validated storage object name.
///
/// C callers pass names including their NUL terminator, so trailing NULs are
/// stripped before validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn from_bytes(raw: &[u8]) -> OteResult<Self> {
        let end = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        let trimmed = &raw[..end];
        let name = std::str::from_utf8(trimmed)
            .map_err(|_| OteError::BadParameters("object name is not UTF-8".into()))?;
        Self::parse(name)
    }

    pub fn parse(name: &str) -> OteResult<Self> {
        if name.is_empty() {
            return Err(OteError::BadParameters("empty object name".into()));
        }
        if name.len() > TE_STORAGE_OBJID_MAX_LEN {
            return Err(OteError::BadParameters(format!(
                "object name is {} bytes (max {TE_STORAGE_OBJID_MAX_LEN})",
                name.len()
            )));
        }
        if name == "." || name == ".." || name.contains('/') || name.contains('\0') {
            return Err(OteError::BadParameters(format!(
                "object name {name:?} is not a plain file name"
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name zero-padded to `TE_STORAGE_OBJID_MAX_LEN` bytes.
    pub fn prefix(&self) -> [u8; TE_STORAGE_OBJID_MAX_LEN] {
        let mut prefix = [0u8; TE_STORAGE_OBJID_MAX_LEN];
        prefix[..self.0.len()].copy_from_slice(self.0.as_bytes());
        prefix
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the trusted application behind a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity(uuid::Uuid);

impl CallerIdentity {
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub fn uuid(&self) -> uuid::Uuid {
        self.0
    }
}

impl std::str::FromStr for CallerIdentity {
    type Err = OteError;

    fn from_str(s: &str) -> OteResult<Self> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| OteError::BadParameters(format!("invalid caller identity {s:?}: {e}")))
    }
}

/// serde helper: binary payloads travel as base64 strings
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
