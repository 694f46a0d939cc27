//! AES in CBC ciphertext-stealing mode (CBC-CS3)
//!
//! Ciphertext is the same length as the plaintext. For inputs longer than one
//! block the last two ciphertext blocks are swapped and the final one is
//! truncated, so the full block always precedes the partial one. Inputs
//! shorter than one block cannot be stolen from and are XORed with the
//! keystream block `E_k(IV)` instead.
//!
//! The key length selects the cipher: 16 bytes → AES-128, 32 bytes → AES-256.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes256, Block};

use crate::{CryptoError, BLOCK_SIZE};

enum BlockKey {
    Aes128(Aes128),
    Aes256(Aes256),
}

impl BlockKey {
    fn new(key: &[u8]) -> Result<Self, CryptoError> {
        match key.len() {
            16 => Aes128::new_from_slice(key)
                .map(BlockKey::Aes128)
                .map_err(|_| CryptoError::InvalidKeyLength(key.len())),
            32 => Aes256::new_from_slice(key)
                .map(BlockKey::Aes256)
                .map_err(|_| CryptoError::InvalidKeyLength(key.len())),
            n => Err(CryptoError::InvalidKeyLength(n)),
        }
    }

    fn encrypt(&self, block: &mut [u8; BLOCK_SIZE]) {
        let block = Block::from_mut_slice(block);
        match self {
            BlockKey::Aes128(c) => c.encrypt_block(block),
            BlockKey::Aes256(c) => c.encrypt_block(block),
        }
    }

    fn decrypt(&self, block: &mut [u8; BLOCK_SIZE]) {
        let block = Block::from_mut_slice(block);
        match self {
            BlockKey::Aes128(c) => c.decrypt_block(block),
            BlockKey::Aes256(c) => c.decrypt_block(block),
        }
    }
}

/// Encrypt `data` in place.
pub fn encrypt(key: &[u8], iv: &[u8; BLOCK_SIZE], data: &mut [u8]) -> Result<(), CryptoError> {
    let cipher = BlockKey::new(key)?;
    let len = data.len();
    if len < BLOCK_SIZE {
        apply_keystream(&cipher, iv, data);
        return Ok(());
    }

    // Blocks before the final (possibly partial) one.
    let lead = (len - 1) / BLOCK_SIZE;
    let mut prev = *iv;
    for chunk in data[..lead * BLOCK_SIZE].chunks_exact_mut(BLOCK_SIZE) {
        let mut block = load(chunk);
        xor_into(&mut block, &prev);
        cipher.encrypt(&mut block);
        chunk.copy_from_slice(&block);
        prev = block;
    }

    let tail_start = lead * BLOCK_SIZE;
    if lead == 0 {
        // Exactly one block: plain CBC.
        let mut block = load(data);
        xor_into(&mut block, iv);
        cipher.encrypt(&mut block);
        data.copy_from_slice(&block);
        return Ok(());
    }

    // prev is C[n-1]; the zero-padded tail is chained off it to form C[n].
    let tail_len = len - tail_start;
    let mut last = [0u8; BLOCK_SIZE];
    last[..tail_len].copy_from_slice(&data[tail_start..]);
    xor_into(&mut last, &prev);
    cipher.encrypt(&mut last);

    data[tail_start - BLOCK_SIZE..tail_start].copy_from_slice(&last);
    data[tail_start..].copy_from_slice(&prev[..tail_len]);
    Ok(())
}

/// Decrypt `data` in place.
pub fn decrypt(key: &[u8], iv: &[u8; BLOCK_SIZE], data: &mut [u8]) -> Result<(), CryptoError> {
    let cipher = BlockKey::new(key)?;
    let len = data.len();
    if len < BLOCK_SIZE {
        apply_keystream(&cipher, iv, data);
        return Ok(());
    }

    let lead = (len - 1) / BLOCK_SIZE;
    if lead == 0 {
        let mut block = load(data);
        cipher.decrypt(&mut block);
        xor_into(&mut block, iv);
        data.copy_from_slice(&block);
        return Ok(());
    }

    // Everything before the swapped pair decrypts as ordinary CBC.
    let mut prev = *iv;
    for chunk in data[..(lead - 1) * BLOCK_SIZE].chunks_exact_mut(BLOCK_SIZE) {
        let ciphertext = load(chunk);
        let mut block = ciphertext;
        cipher.decrypt(&mut block);
        xor_into(&mut block, &prev);
        chunk.copy_from_slice(&block);
        prev = ciphertext;
    }

    let tail_start = lead * BLOCK_SIZE;
    let tail_len = len - tail_start;

    // D(C[n]) = C[n-1] ^ (P[n] ∥ 0): its high bytes restore the stolen part of C[n-1].
    let mut decrypted_last = load(&data[tail_start - BLOCK_SIZE..tail_start]);
    cipher.decrypt(&mut decrypted_last);

    let mut penultimate = [0u8; BLOCK_SIZE];
    penultimate[..tail_len].copy_from_slice(&data[tail_start..]);
    penultimate[tail_len..].copy_from_slice(&decrypted_last[tail_len..]);

    let mut tail = [0u8; BLOCK_SIZE];
    for i in 0..tail_len {
        tail[i] = decrypted_last[i] ^ penultimate[i];
    }

    let mut block = penultimate;
    cipher.decrypt(&mut block);
    xor_into(&mut block, &prev);

    data[tail_start - BLOCK_SIZE..tail_start].copy_from_slice(&block);
    data[tail_start..].copy_from_slice(&tail[..tail_len]);
    Ok(())
}

fn apply_keystream(cipher: &BlockKey, iv: &[u8; BLOCK_SIZE], data: &mut [u8]) {
    let mut stream = *iv;
    cipher.encrypt(&mut stream);
    for (b, k) in data.iter_mut().zip(stream.iter()) {
        *b ^= k;
    }
}

fn load(chunk: &[u8]) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    block.copy_from_slice(chunk);
    block
}

fn xor_into(block: &mut [u8; BLOCK_SIZE], other: &[u8; BLOCK_SIZE]) {
    for (b, o) in block.iter_mut().zip(other.iter()) {
        *b ^= o;
    }
}
