pub mod config;
pub mod error;
pub mod types;

pub use error::{OteError, OteResult};
pub use types::{
    CallerIdentity, FileRequest, ObjectId, RequestType, StorageCommand, MAC_SIZE,
    MAX_OBJECT_DATA_LEN, TE_STORAGE_OBJID_MAX_LEN,
};
