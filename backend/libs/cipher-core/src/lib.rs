//! Server-managed authenticated encryption for chat content at rest.
//!
//! A single 256-bit key is derived once per process from two configured
//! secrets using Argon2id, then used for AES-256-GCM with a fresh random
//! 16-byte nonce per encryption. The stored wire format is three
//! hex-encoded, colon-separated fields: `nonce:tag:ciphertext`.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Key, Nonce};
use argon2::Argon2;
use rand::rngs::OsRng;
use rand::RngCore;

/// AES-256-GCM parameterized with a 16-byte nonce, matching the stored format.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

pub const NONCE_LENGTH: usize = 16;
pub const TAG_LENGTH: usize = 16;
const KEY_LENGTH: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    /// Blob does not match the `nonce:tag:ciphertext` hex format.
    #[error("invalid ciphertext format: {0}")]
    Format(String),

    /// Authentication tag did not verify: tampered data, corruption, or wrong key.
    #[error("ciphertext integrity check failed")]
    Integrity,

    /// Key derivation rejected the configured secrets.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

/// Symmetric cipher over UTF-8 text blobs. Key material never leaves memory
/// and is never persisted.
#[derive(Clone)]
pub struct CipherService {
    cipher: Aes256Gcm16,
}

impl CipherService {
    /// Derives the process-wide key from the configured secret and salt.
    ///
    /// Argon2id is deliberately slow and memory-hard so a partial secret leak
    /// stays expensive to brute-force. The salt must be at least 8 bytes.
    pub fn new(secret: &str, salt: &str) -> Result<Self, CipherError> {
        if secret.is_empty() {
            return Err(CipherError::KeyDerivation("secret must not be empty".into()));
        }
        let mut key_bytes = [0u8; KEY_LENGTH];
        Argon2::default()
            .hash_password_into(secret.as_bytes(), salt.as_bytes(), &mut key_bytes)
            .map_err(|e| CipherError::KeyDerivation(e.to_string()))?;

        let key = Key::<Aes256Gcm16>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm16::new(key),
        })
    }

    /// Encrypts plaintext under a fresh random nonce.
    ///
    /// Identical plaintexts encrypt to different blobs; both decrypt back to
    /// the same text.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::<U16>::from_slice(&nonce_bytes);

        // aes-gcm appends the 16-byte tag to the ciphertext
        let sealed = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::Integrity)?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LENGTH);

        Ok(format!(
            "{}:{}:{}",
            hex::encode(nonce_bytes),
            hex::encode(tag),
            hex::encode(ciphertext)
        ))
    }

    /// Decrypts a `nonce:tag:ciphertext` blob, verifying its authentication tag.
    ///
    /// Fails loudly with [`CipherError::Integrity`] when the tag does not
    /// verify; garbled plaintext is never returned.
    pub fn decrypt(&self, blob: &str) -> Result<String, CipherError> {
        let (nonce_bytes, tag, ciphertext) = parse_blob(blob)?;

        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag);

        let nonce = Nonce::<U16>::from_slice(&nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, sealed.as_ref())
            .map_err(|_| CipherError::Integrity)?;

        String::from_utf8(plaintext)
            .map_err(|_| CipherError::Format("plaintext is not valid UTF-8".into()))
    }
}

/// Structural check on a stored blob without attempting decryption.
///
/// Not a substitute for the authentication check in [`CipherService::decrypt`].
pub fn is_valid_ciphertext(blob: &str) -> bool {
    let parts: Vec<&str> = blob.split(':').collect();
    if parts.len() != 3 {
        return false;
    }
    matches!(hex::decode(parts[0]), Ok(nonce) if nonce.len() == NONCE_LENGTH)
        && matches!(hex::decode(parts[1]), Ok(tag) if tag.len() == TAG_LENGTH)
        && hex::decode(parts[2]).is_ok()
}

fn parse_blob(blob: &str) -> Result<([u8; NONCE_LENGTH], Vec<u8>, Vec<u8>), CipherError> {
    let parts: Vec<&str> = blob.split(':').collect();
    if parts.len() != 3 {
        return Err(CipherError::Format(format!(
            "expected 3 colon-separated fields, got {}",
            parts.len()
        )));
    }

    let nonce = hex::decode(parts[0])
        .map_err(|_| CipherError::Format("nonce is not valid hex".into()))?;
    if nonce.len() != NONCE_LENGTH {
        return Err(CipherError::Format(format!(
            "nonce must be {NONCE_LENGTH} bytes, got {}",
            nonce.len()
        )));
    }

    let tag = hex::decode(parts[1])
        .map_err(|_| CipherError::Format("auth tag is not valid hex".into()))?;
    if tag.len() != TAG_LENGTH {
        return Err(CipherError::Format(format!(
            "auth tag must be {TAG_LENGTH} bytes, got {}",
            tag.len()
        )));
    }

    let ciphertext = hex::decode(parts[2])
        .map_err(|_| CipherError::Format("ciphertext is not valid hex".into()))?;

    let mut nonce_bytes = [0u8; NONCE_LENGTH];
    nonce_bytes.copy_from_slice(&nonce);
    Ok((nonce_bytes, tag, ciphertext))
}
