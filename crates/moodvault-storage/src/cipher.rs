use std::fmt;

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use thiserror::Error;

use crate::key_provider::{KeyError, KeyMaterial, KeyProvider};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("encrypt failed: {0}")]
pub struct EncryptionError(String);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecryptionError {
    #[error("ciphertext is not valid base64: {0}")]
    Encoding(String),
    #[error("ciphertext truncated: {len} bytes")]
    Truncated { len: usize },
    #[error("authentication failed (wrong key or corrupted data)")]
    Authentication,
    #[error("decrypted bytes are not valid UTF-8")]
    Utf8,
}

/// AES-256-GCM over text. Tokens are `base64url(nonce || ciphertext || tag)`
/// with no padding, so they never contain commas, quotes or whitespace.
pub struct Cipher {
    aead: Aes256Gcm,
    key_id: String,
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl Cipher {
    pub fn new(material: &KeyMaterial) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(&material.bytes);
        Self {
            aead: Aes256Gcm::new(key),
            key_id: material.id.clone(),
        }
    }

    /// Resolve the key once and keep it for the life of the cipher.
    pub async fn from_provider<P: KeyProvider + ?Sized>(provider: &P) -> Result<Self, KeyError> {
        let material = provider.get_or_create().await?;
        Ok(Self::new(&material))
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, EncryptionError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .aead
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| EncryptionError(e.to_string()))?;

        let mut token = Vec::with_capacity(NONCE_LEN + sealed.len());
        token.extend_from_slice(nonce.as_slice());
        token.extend_from_slice(&sealed);
        Ok(URL_SAFE_NO_PAD.encode(token))
    }

    pub fn decrypt(&self, token: &str) -> Result<String, DecryptionError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| DecryptionError::Encoding(e.to_string()))?;
        if bytes.len() < NONCE_LEN + TAG_LEN {
            return Err(DecryptionError::Truncated { len: bytes.len() });
        }

        let (nonce, sealed) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .aead
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| DecryptionError::Authentication)?;
        String::from_utf8(plaintext).map_err(|_| DecryptionError::Utf8)
    }
}
