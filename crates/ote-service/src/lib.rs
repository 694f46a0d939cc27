//! ote-service: the secure storage service
//!
//! Holds the device-bound keys, runs the WRITE/READ/SIZE/DELETE commands for
//! client sessions, and forwards sealed blobs to the host daemon through a
//! [`ote_host::HostChannel`]. Plaintext never leaves this crate.

pub mod context;
pub mod device;
pub mod dispatcher;
pub mod object;
pub mod operation;
pub mod session;

pub use context::SecureStorageContext;
pub use device::{DeviceIdProvider, FileDeviceId, FixedDeviceId};
pub use dispatcher::{StorageService, BLOB_OVERHEAD};
pub use object::{AccessFlags, StorageObject};
pub use operation::{Operation, Param};
pub use session::Session;
