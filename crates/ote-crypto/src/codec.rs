//! Encrypt-then-MAC / validate-then-decrypt codec
//!
//! Sealed blob format:
//! ```text
//! [N bytes: CTS(content, CTS(master, CTS(identity, plaintext)))][16 bytes: CMAC]
//! ```
//!
//! Every layer uses a zero IV. The CMAC key is AES-256-CBC(master, identity)
//! and is recomputed on each call. The tag is checked before anything is
//! decrypted.

use aes::Aes128;
use cmac::{Cmac, Mac};
use zeroize::{Zeroize, Zeroizing};

use crate::kdf::{cbc_encrypt, initialize_keys};
use crate::keys::{ContentKey, DeviceUniqueId, IdentityKey, MasterKey};
use crate::{cts, CryptoError, BLOCK_SIZE, IDENTITY_KEY_SIZE, MAC_SIZE};

const ZERO_IV: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];

/// The device-bound key pair used by every seal/open.
#[derive(Debug)]
pub struct StorageKeys {
    master: MasterKey,
    content: ContentKey,
}

impl StorageKeys {
    pub fn new(master: MasterKey, content: ContentKey) -> Self {
        Self { master, content }
    }

    /// Derive both keys from the device unique id.
    pub fn derive(uid: &DeviceUniqueId) -> Result<Self, CryptoError> {
        let (master, content) = initialize_keys(uid)?;
        Ok(Self::new(master, content))
    }

    /// Encrypt `plaintext` through the identity → master → content cascade and
    /// append the CMAC of the result.
    pub fn seal(&self, identity: &IdentityKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut blob = Vec::with_capacity(plaintext.len() + MAC_SIZE);
        blob.extend_from_slice(plaintext);

        let layered = cts::encrypt(identity.as_bytes(), &ZERO_IV, &mut blob)
            .and_then(|()| cts::encrypt(self.master.as_bytes(), &ZERO_IV, &mut blob))
            .and_then(|()| cts::encrypt(self.content.as_bytes(), &ZERO_IV, &mut blob));
        if let Err(e) = layered {
            blob.zeroize();
            return Err(e);
        }

        let tag = self.compute_mac(identity, &blob)?;
        blob.extend_from_slice(&tag);
        Ok(blob)
    }

    /// Verify the CMAC trailer, then undo the cascade.
    ///
    /// Returns `AuthenticationFailed` without decrypting anything when the
    /// trailer does not match.
    pub fn open(
        &self,
        identity: &IdentityKey,
        blob: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        if blob.len() < MAC_SIZE {
            return Err(CryptoError::AuthenticationFailed);
        }
        let (ciphertext, tag) = blob.split_at(blob.len() - MAC_SIZE);

        let mac_key = self.mac_key(identity)?;
        let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(mac_key.as_slice())
            .map_err(|_| CryptoError::InvalidKeyLength(mac_key.len()))?;
        mac.update(ciphertext);
        mac.verify_slice(tag)
            .map_err(|_| CryptoError::AuthenticationFailed)?;

        let mut plaintext = Zeroizing::new(ciphertext.to_vec());
        cts::decrypt(self.content.as_bytes(), &ZERO_IV, &mut plaintext)?;
        cts::decrypt(self.master.as_bytes(), &ZERO_IV, &mut plaintext)?;
        cts::decrypt(identity.as_bytes(), &ZERO_IV, &mut plaintext)?;
        Ok(plaintext)
    }

    /// MAC key = AES-256-CBC(master, zero IV, identity). The identity is one
    /// block, so no stealing is involved.
    fn mac_key(&self, identity: &IdentityKey) -> Result<Zeroizing<[u8; IDENTITY_KEY_SIZE]>, CryptoError> {
        let mut key = Zeroizing::new(*identity.as_bytes());
        cbc_encrypt(self.master.as_bytes(), &ZERO_IV, key.as_mut_slice())?;
        Ok(key)
    }

    fn compute_mac(&self, identity: &IdentityKey, ciphertext: &[u8]) -> Result<[u8; MAC_SIZE], CryptoError> {
        let mac_key = self.mac_key(identity)?;
        let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(mac_key.as_slice())
            .map_err(|_| CryptoError::InvalidKeyLength(mac_key.len()))?;
        mac.update(ciphertext);
        let mut tag = [0u8; MAC_SIZE];
        tag.copy_from_slice(&mac.finalize().into_bytes());
        Ok(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEVICE_ID_SIZE;
    use proptest::prelude::*;

    fn test_keys() -> StorageKeys {
        StorageKeys::derive(&DeviceUniqueId::from_bytes([0x5C; DEVICE_ID_SIZE])).unwrap()
    }

    fn identity(byte: u8) -> IdentityKey {
        IdentityKey::from_bytes([byte; IDENTITY_KEY_SIZE])
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let keys = test_keys();
        let plaintext = b"Hello, Hello, from secure storage demo app.";

        let blob = keys.seal(&identity(1), plaintext).unwrap();
        let opened = keys.open(&identity(1), &blob).unwrap();

        assert_eq!(opened.as_slice(), plaintext);
    }

    #[test]
    fn test_sealed_size() {
        let keys = test_keys();
        let blob = keys.seal(&identity(1), &[0u8; 100]).unwrap();
        // plaintext (100) + CMAC (16) = 116, no padding
        assert_eq!(blob.len(), 100 + MAC_SIZE);
    }

    #[test]
    fn test_seal_is_deterministic() {
        let keys = test_keys();
        let a = keys.seal(&identity(1), b"same input, same key material").unwrap();
        let b = keys.seal(&identity(1), b"same input, same key material").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_open_wrong_identity() {
        let keys = test_keys();
        let blob = keys.seal(&identity(1), b"secret data for one caller").unwrap();
        assert!(matches!(
            keys.open(&identity(2), &blob),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_open_other_device() {
        let blob = test_keys().seal(&identity(1), b"bound to one device only").unwrap();
        let other = StorageKeys::derive(&DeviceUniqueId::from_bytes([0x77; DEVICE_ID_SIZE])).unwrap();
        assert!(matches!(
            other.open(&identity(1), &blob),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_open_truncated_blob() {
        let keys = test_keys();
        assert!(matches!(
            keys.open(&identity(1), &[0u8; MAC_SIZE - 1]),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_mac_key_depends_on_identity() {
        let keys = test_keys();
        let k1 = keys.mac_key(&identity(1)).unwrap();
        let k2 = keys.mac_key(&identity(2)).unwrap();
        assert_ne!(*k1, *k2);
        assert_ne!(*k1, *identity(1).as_bytes());
    }

    proptest! {
        #[test]
        fn seal_open_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..=512)) {
            let keys = test_keys();
            let blob = keys.seal(&identity(9), &data).unwrap();
            let opened = keys.open(&identity(9), &blob).unwrap();
            prop_assert_eq!(opened.as_slice(), data.as_slice());
        }

        #[test]
        fn any_bit_flip_is_rejected(
            data in proptest::collection::vec(any::<u8>(), 1..=128),
            pos in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let keys = test_keys();
            let mut blob = keys.seal(&identity(3), &data).unwrap();
            let i = pos.index(blob.len());
            blob[i] ^= 1 << bit;
            prop_assert!(matches!(
                keys.open(&identity(3), &blob),
                Err(CryptoError::AuthenticationFailed)
            ));
        }

        #[test]
        fn wrong_identity_is_rejected(
            data in proptest::collection::vec(any::<u8>(), 0..=128),
            a in any::<[u8; 16]>(),
            b in any::<[u8; 16]>(),
        ) {
            prop_assume!(a != b);
            let keys = test_keys();
            let blob = keys.seal(&IdentityKey::from_bytes(a), &data).unwrap();
            prop_assert!(keys.open(&IdentityKey::from_bytes(b), &blob).is_err());
        }
    }
}
