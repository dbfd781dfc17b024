//! Encryption facility backing the secret store.
//!
//! Secrets are sealed with AES-256-GCM. The master key never touches the
//! disk: it lives in the OS keychain (Keychain on macOS, Credential Manager
//! on Windows, Secret Service on Linux) and is generated on first use.

use aes_gcm::{
    Aes256Gcm, Key, KeyInit, Nonce,
    aead::{Aead, OsRng, rand_core::RngCore},
};
use log::{debug, info};

use crate::error::SecretError;

const NONCE_SIZE: usize = 12;
pub const KEY_SIZE: usize = 32;

const KEYCHAIN_SERVICE: &str = "isc-cli";
const KEYCHAIN_USER: &str = "secret-store-key";

/// Failure reported by a [`SecretCipher`]
#[derive(Debug)]
pub enum CipherError {
    /// The facility itself cannot be used (locked keychain, no backend)
    Unavailable(String),
    /// The input could not be decrypted with this facility
    Invalid(String),
}

/// Platform-backed byte encryption used by [`super::SecretStore`]
pub trait SecretCipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError>;
    fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, CipherError>;
}

/// AES-256-GCM cipher; output is `nonce || ciphertext`
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    /// Cipher over an explicit key
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
        }
    }

    /// Cipher whose key is held by the OS keychain, created on first use
    pub fn from_keychain() -> Result<Self, SecretError> {
        let entry = keyring::Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_USER)
            .map_err(|e| SecretError::EncryptionUnavailable(e.to_string()))?;

        match entry.get_password() {
            Ok(encoded) => {
                debug!("Loaded secret store key from OS keychain");
                let key = decode_key(&encoded).ok_or_else(|| {
                    SecretError::EncryptionUnavailable(
                        "the secret store key in the OS keychain is malformed".to_string(),
                    )
                })?;
                Ok(Self::new(key))
            }
            Err(keyring::Error::NoEntry) => {
                let key = Aes256Gcm::generate_key(OsRng);
                entry
                    .set_password(&hex::encode(key))
                    .map_err(|e| SecretError::EncryptionUnavailable(e.to_string()))?;
                info!("Generated new secret store key in OS keychain");
                Ok(Self {
                    cipher: Aes256Gcm::new(&key),
                })
            }
            Err(e) => Err(SecretError::EncryptionUnavailable(e.to_string())),
        }
    }
}

fn decode_key(encoded: &str) -> Option<[u8; KEY_SIZE]> {
    let bytes = hex::decode(encoded.trim()).ok()?;
    bytes.try_into().ok()
}

impl SecretCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CipherError::Unavailable(format!("encryption failed: {e}")))?;

        let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, CipherError> {
        if sealed.len() < NONCE_SIZE {
            return Err(CipherError::Invalid("sealed value is truncated".to_string()));
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| CipherError::Invalid(format!("decryption failed: {e}")))
    }
}
