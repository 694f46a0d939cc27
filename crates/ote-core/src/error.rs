use thiserror::Error;

pub type OteResult<T> = Result<T, OteError>;

/// Numeric result codes reported back to secure-world callers.
pub mod code {
    pub const GENERIC: u32 = 0xFFFF_0000;
    pub const ACCESS_DENIED: u32 = 0xFFFF_0001;
    pub const ACCESS_CONFLICT: u32 = 0xFFFF_0003;
    pub const BAD_PARAMETERS: u32 = 0xFFFF_0006;
    pub const ITEM_NOT_FOUND: u32 = 0xFFFF_0008;
    pub const NOT_IMPLEMENTED: u32 = 0xFFFF_0009;
    pub const OUT_OF_MEMORY: u32 = 0xFFFF_000C;
    pub const COMMUNICATION: u32 = 0xFFFF_000E;
}

#[derive(Debug, Error)]
pub enum OteError {
    #[error("out of memory")]
    OutOfMemory,

    #[error("bad parameters: {0}")]
    BadParameters(String),

    /// MAC mismatch and filename mismatch both land here so callers cannot
    /// tell which check failed.
    #[error("access denied")]
    AccessDenied,

    #[error("access conflict: caller identity unavailable")]
    AccessConflict,

    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("communication error: {0}")]
    Communication(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OteError {
    pub fn code(&self) -> u32 {
        match self {
            OteError::OutOfMemory => code::OUT_OF_MEMORY,
            OteError::BadParameters(_) => code::BAD_PARAMETERS,
            OteError::AccessDenied => code::ACCESS_DENIED,
            OteError::AccessConflict => code::ACCESS_CONFLICT,
            OteError::ItemNotFound(_) => code::ITEM_NOT_FOUND,
            OteError::Communication(_) => code::COMMUNICATION,
            OteError::NotImplemented(_) => code::NOT_IMPLEMENTED,
            OteError::Config(_) | OteError::Io(_) => code::GENERIC,
        }
    }

    /// Classify an errno reported by the host daemon for object `name`.
    pub fn from_host_errno(errno: i32, name: &str) -> Self {
        let err = std::io::Error::from_raw_os_error(errno);
        match err.kind() {
            std::io::ErrorKind::NotFound => OteError::ItemNotFound(name.to_string()),
            std::io::ErrorKind::Unsupported => {
                OteError::NotImplemented(format!("host rejected request for {name}: {err}"))
            }
            std::io::ErrorKind::OutOfMemory => OteError::OutOfMemory,
            _ => OteError::Communication(format!("host I/O on {name} failed: {err}")),
        }
    }
}
