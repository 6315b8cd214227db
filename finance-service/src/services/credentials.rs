//! At-rest encryption for aggregator access tokens.
//!
//! Tokens are sealed with AES-256-GCM under a key derived by SHA-256 from the
//! configured secret, and stored as `hex(nonce):hex(ciphertext)`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("stored credential is malformed")]
    Malformed,

    #[error("stored credential could not be decrypted")]
    Decrypt,

    #[error("credential could not be encrypted")]
    Encrypt,
}

impl From<CredentialError> for AppError {
    fn from(err: CredentialError) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl CredentialCipher {
    pub fn new(secret: &Secret<String>) -> Self {
        let digest = Sha256::digest(secret.expose_secret().as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(&digest);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    pub fn encrypt(&self, token: &str) -> Result<String, CredentialError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), token.as_bytes())
            .map_err(|_| CredentialError::Encrypt)?;
        Ok(format!("{}:{}", hex::encode(nonce_bytes), hex::encode(ciphertext)))
    }

    pub fn decrypt(&self, stored: &str) -> Result<String, CredentialError> {
        let (nonce_hex, ciphertext_hex) =
            stored.split_once(':').ok_or(CredentialError::Malformed)?;
        let nonce = hex::decode(nonce_hex).map_err(|_| CredentialError::Malformed)?;
        if nonce.len() != NONCE_LEN {
            return Err(CredentialError::Malformed);
        }
        let ciphertext = hex::decode(ciphertext_hex).map_err(|_| CredentialError::Malformed)?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| CredentialError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| CredentialError::Decrypt)
    }
}
