//! Device-bound key derivation: device unique id → master key + content key

use aes::Aes256;
use cbc::cipher::{block_padding::NoPadding, BlockEncryptMut, KeyIvInit};
use zeroize::Zeroize;

use crate::keys::{ContentKey, DeviceUniqueId, MasterKey};
use crate::{CryptoError, BLOCK_SIZE, DEVICE_ID_SIZE, KEY_SIZE};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;

/// Seed key baked into the service.
const SEED_KEY: [u8; KEY_SIZE] = [
    0x3c, 0x9e, 0x51, 0x07, 0xa4, 0x2d, 0xe8, 0x6b, 0x10, 0xf5, 0x83, 0x4e, 0xc7, 0x29, 0xb6, 0x5a,
    0x72, 0x0d, 0x94, 0xe1, 0x38, 0xaf, 0x66, 0xc3, 0x5b, 0x80, 0x1f, 0xd2, 0x47, 0xbc, 0x09, 0xee,
];

/// Seed IV baked into the service.
const SEED_IV: [u8; BLOCK_SIZE] = [
    0x8d, 0x14, 0xc9, 0x62, 0x3f, 0xa7, 0x05, 0xdb, 0x71, 0x2e, 0xb8, 0x96, 0x4c, 0xe3, 0x1a, 0x57,
];

/// Number of CBC rounds applied to the working master key.
pub const KDF_ROUNDS: usize = 5;

/// Round after which the working key is snapshotted as the content key.
pub const CONTENT_KEY_ROUND: usize = 2;

/// Derive the master and content keys from the device unique id.
///
/// Deterministic: the same id always yields the same pair.
pub fn initialize_keys(uid: &DeviceUniqueId) -> Result<(MasterKey, ContentKey), CryptoError> {
    let mut working = [0u8; KEY_SIZE];
    working[..DEVICE_ID_SIZE].copy_from_slice(uid.as_bytes());
    working[DEVICE_ID_SIZE..].copy_from_slice(uid.as_bytes());

    // Initial pass under the seeds yields this device's round key and IV.
    let mut round_key = working;
    cbc_encrypt(&SEED_KEY, &SEED_IV, &mut round_key)?;
    let mut round_iv = [0u8; BLOCK_SIZE];
    for (i, b) in round_iv.iter_mut().enumerate() {
        *b = round_key[i] ^ round_key[BLOCK_SIZE + i];
    }

    let mut content = None;
    for round in 0..KDF_ROUNDS {
        let step = (round + 1) as u8;
        round_key[round] ^= step;
        round_iv[BLOCK_SIZE - 1] = round_iv[BLOCK_SIZE - 1].wrapping_add(step);

        cbc_encrypt(&round_key, &round_iv, &mut working)?;

        if round == CONTENT_KEY_ROUND {
            content = Some(ContentKey::from_bytes(working));
        }
    }

    let master = MasterKey::from_bytes(working);
    working.zeroize();
    round_key.zeroize();
    round_iv.zeroize();

    let content = content.ok_or_else(|| {
        CryptoError::InvalidLength(format!(
            "content key round {CONTENT_KEY_ROUND} outside {KDF_ROUNDS} rounds"
        ))
    })?;

    tracing::debug!(rounds = KDF_ROUNDS, "storage keys derived");
    Ok((master, content))
}

/// AES-256-CBC over a block-aligned buffer, no padding.
pub(crate) fn cbc_encrypt(
    key: &[u8; KEY_SIZE],
    iv: &[u8; BLOCK_SIZE],
    buf: &mut [u8],
) -> Result<(), CryptoError> {
    let len = buf.len();
    if len % BLOCK_SIZE != 0 {
        return Err(CryptoError::InvalidLength(format!(
            "CBC input of {len} bytes is not block aligned"
        )));
    }
    Aes256CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(buf, len)
        .map_err(|_| CryptoError::InvalidLength(format!("CBC encrypt of {len} bytes failed")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kdf_deterministic() {
        let uid = DeviceUniqueId::from_bytes([0x11; DEVICE_ID_SIZE]);

        let (m1, c1) = initialize_keys(&uid).unwrap();
        let (m2, c2) = initialize_keys(&uid).unwrap();

        assert_eq!(m1.as_bytes(), m2.as_bytes(), "master key must be deterministic");
        assert_eq!(c1.as_bytes(), c2.as_bytes(), "content key must be deterministic");
    }

    #[test]
    fn test_kdf_different_devices() {
        let (m1, c1) = initialize_keys(&DeviceUniqueId::from_bytes([1; DEVICE_ID_SIZE])).unwrap();
        let (m2, c2) = initialize_keys(&DeviceUniqueId::from_bytes([2; DEVICE_ID_SIZE])).unwrap();

        assert_ne!(m1.as_bytes(), m2.as_bytes());
        assert_ne!(c1.as_bytes(), c2.as_bytes());
    }

    #[test]
    fn test_master_and_content_differ() {
        let uid = DeviceUniqueId::from_bytes([0xA5; DEVICE_ID_SIZE]);
        let (master, content) = initialize_keys(&uid).unwrap();

        assert_ne!(master.as_bytes(), content.as_bytes());
        assert_ne!(&master.as_bytes()[..DEVICE_ID_SIZE], uid.as_bytes());
    }

    #[test]
    fn test_cbc_rejects_unaligned() {
        let mut buf = [0u8; 20];
        assert!(cbc_encrypt(&SEED_KEY, &SEED_IV, &mut buf).is_err());
    }
}
