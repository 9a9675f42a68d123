use aes::Aes256;
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, KeyIvInit};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha512};
use thiserror::Error;

use crate::remote::EncryptedPayload;

const BLOCK_SIZE: usize = 16;

type Aes256CbcDec = cbc::Decryptor<Aes256>;

#[derive(Error, Debug, PartialEq)]
pub enum DecryptError {
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("iv must be {BLOCK_SIZE} bytes, got {0}")]
    BadIvLength(usize),
    #[error("ciphertext length {0} is not a multiple of the block size")]
    BadCiphertextLength(usize),
    #[error("decrypted payload carries invalid pkcs#7 padding")]
    InvalidPadding,
}

/// First 32 hex characters of the identity's SHA-512 digest, used as the
/// AES-256 key. Deterministic and unsalted: the scheme is exactly as strong
/// as the secrecy of the identity token.
pub(crate) fn derive_key(identity: &str) -> [u8; 32] {
    let digest = hex::encode(Sha512::digest(identity.as_bytes()));
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest.as_bytes()[..32]);
    key
}

/// Decrypts the fetched `{encrypt, iv}` payload into the plaintext JSON
/// configuration blob.
pub(crate) fn decrypt(
    identity: &str,
    payload: &EncryptedPayload,
) -> Result<Vec<u8>, DecryptError> {
    let key = derive_key(identity);
    let iv = BASE64.decode(&payload.iv)?;
    if iv.len() != BLOCK_SIZE {
        return Err(DecryptError::BadIvLength(iv.len()));
    }
    let mut buffer = BASE64.decode(&payload.encrypt)?;
    if buffer.is_empty() {
        // degenerate but not an error
        return Ok(buffer);
    }
    if buffer.len() % BLOCK_SIZE != 0 {
        return Err(DecryptError::BadCiphertextLength(buffer.len()));
    }
    let length = buffer.len();
    Aes256CbcDec::new_from_slices(&key, &iv)
        .map_err(|_| DecryptError::BadIvLength(iv.len()))?
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|_| DecryptError::BadCiphertextLength(length))?;
    unpad(buffer)
}

/// Strips PKCS#7 padding. The padding byte is bound-checked before slicing:
/// a value of 0, above the block size, or past the buffer is treated as a
/// decryption failure instead of silently corrupting the output.
fn unpad(mut buffer: Vec<u8>) -> Result<Vec<u8>, DecryptError> {
    let Some(&last) = buffer.last() else {
        return Ok(buffer);
    };
    let n = last as usize;
    if n == 0 || n > BLOCK_SIZE || n > buffer.len() {
        return Err(DecryptError::InvalidPadding);
    }
    buffer.truncate(buffer.len() - n);
    Ok(buffer)
}
