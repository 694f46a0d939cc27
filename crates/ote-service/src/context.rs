use ote_core::{OteError, OteResult};
use ote_crypto::{CryptoError, IdentityKey, StorageKeys};
use tracing::info;
use zeroize::Zeroizing;

use crate::device::DeviceIdProvider;

/// Device-bound key state owned by one service instance.
///
/// Created once from the device unique id; read-only afterwards. The keys are
/// zeroed when the context is dropped.
#[derive(Debug)]
pub struct SecureStorageContext {
    keys: StorageKeys,
}

impl SecureStorageContext {
    pub fn create(provider: &dyn DeviceIdProvider) -> OteResult<Self> {
        let uid = provider.device_unique_id()?;
        let keys = StorageKeys::derive(&uid).map_err(map_crypto)?;
        info!("secure storage keys initialized");
        Ok(Self { keys })
    }

    pub fn seal(&self, identity: &IdentityKey, plaintext: &[u8]) -> OteResult<Vec<u8>> {
        self.keys.seal(identity, plaintext).map_err(map_crypto)
    }

    pub fn open(&self, identity: &IdentityKey, blob: &[u8]) -> OteResult<Zeroizing<Vec<u8>>> {
        self.keys.open(identity, blob).map_err(map_crypto)
    }
}

fn map_crypto(err: CryptoError) -> OteError {
    match err {
        CryptoError::AuthenticationFailed => OteError::AccessDenied,
        CryptoError::InvalidKeyLength(_) | CryptoError::InvalidLength(_) => {
            OteError::BadParameters(err.to_string())
        }
    }
}
