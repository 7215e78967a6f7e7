use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::Rng;
use thiserror::Error;

pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    Encrypt(String),
    #[error("decryption failed: {0}")]
    Decrypt(String),
    #[error("ciphertext shorter than nonce")]
    TooShort,
}

/// AES-256-GCM wrapper used for the mapping store's per-entry integrity
/// tags. The nonce is prepended to the ciphertext.
#[derive(Clone)]
pub struct Encryptor {
    cipher: Aes256Gcm,
}

impl Encryptor {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Encryptor { cipher: Aes256Gcm::new(key.into()) }
    }

    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, data)
            .map_err(|e| CryptoError::Encrypt(e.to_string()))?;
        let mut out = nonce_bytes.to_vec();
        out.extend(ciphertext);
        Ok(out)
    }

    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if data.len() < NONCE_LEN {
            return Err(CryptoError::TooShort);
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| CryptoError::Decrypt(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let enc = Encryptor::new(&[7u8; KEY_LEN]);
        let sealed = enc.encrypt(b"203.0.113.7").unwrap();
        assert_eq!(enc.decrypt(&sealed).unwrap(), b"203.0.113.7");
    }

    #[test]
    fn rejects_truncated_input() {
        let enc = Encryptor::new(&[7u8; KEY_LEN]);
        assert!(matches!(enc.decrypt(&[0u8; 4]), Err(CryptoError::TooShort)));
    }
}
