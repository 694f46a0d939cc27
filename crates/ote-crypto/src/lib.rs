//! ote-crypto: crypto for the secure storage service
//!
//! Key hierarchy:
//! ```text
//! Device Unique Id (16 bytes, read once at service start)
//!   └── uid ∥ uid → 5 AES-256-CBC rounds from baked-in seeds
//!       ├── Content Key (snapshot after round 2)
//!       └── Master Key  (after round 5)
//! Identity Key (16 bytes, per calling application)
//!   └── MAC Key = AES-256-CBC(master, identity)
//! ```
//!
//! Sealed blob: `CTS(content, CTS(master, CTS(identity, plaintext))) ∥ CMAC`

pub mod codec;
pub mod cts;
pub mod kdf;
pub mod keys;

pub use codec::StorageKeys;
pub use kdf::initialize_keys;
pub use keys::{ContentKey, DeviceUniqueId, IdentityKey, MasterKey};

/// AES block size
pub const BLOCK_SIZE: usize = 16;

/// Size of the master and content keys (AES-256)
pub const KEY_SIZE: usize = 32;

/// Size of the device unique id
pub const DEVICE_ID_SIZE: usize = 16;

/// Size of a caller identity key (AES-128)
pub const IDENTITY_KEY_SIZE: usize = 16;

/// Size of the CMAC trailer
pub const MAC_SIZE: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid AES key length: {0} bytes")]
    InvalidKeyLength(usize),

    #[error("invalid input length: {0}")]
    InvalidLength(String),

    #[error("authentication failed")]
    AuthenticationFailed,
}
