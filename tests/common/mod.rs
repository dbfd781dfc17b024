//! Shared fixtures for the integration tests

#![allow(dead_code)]

use aes::Aes256;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use cbc::cipher::{BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use chrono::Utc;
use isc_cli::auth::{Headless, PollSettings};
use isc_cli::config::{AuthMode, ConfigPaths, EnvironmentRegistry, UpdateEnvironmentRequest};
use isc_cli::secrets::SecretStore;
use isc_cli::secrets::cipher::AesGcmCipher;
use isc_cli::session::SessionManager;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const LOGIN_KEY: [u8; 32] = [0x5a; 32];
pub const LOGIN_IV: [u8; 16] = [0x11; 16];

/// Unsigned token carrying only an `exp` claim
pub fn jwt(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp},"tenant_id":"acme"}}"#));
    format!("{header}.{payload}.sig")
}

pub fn valid_jwt() -> String {
    jwt(Utc::now().timestamp() + 3600)
}

pub fn expired_jwt() -> String {
    jwt(Utc::now().timestamp() - 3600)
}

/// Seal a plaintext the way the login intermediary does: `hex(iv):hex(ciphertext)`
pub fn seal_token_info(plaintext: &str) -> String {
    let bytes = plaintext.as_bytes();
    let mut buffer = vec![0u8; bytes.len() + 16];
    buffer[..bytes.len()].copy_from_slice(bytes);
    let ciphertext = cbc::Encryptor::<Aes256>::new_from_slices(&LOGIN_KEY, &LOGIN_IV)
        .unwrap()
        .encrypt_padded_mut::<Pkcs7>(&mut buffer, bytes.len())
        .unwrap();
    format!("{}:{}", hex::encode(LOGIN_IV), hex::encode(ciphertext))
}

pub struct Harness {
    pub dir: TempDir,
    pub registry: EnvironmentRegistry,
}

impl Harness {
    /// Fresh config home whose login gateway points at `gateway_url`
    pub fn new(gateway_url: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let paths = ConfigPaths::from_root(dir.path().join(".sailpoint"));
        let secrets = SecretStore::new(paths.secure_dir(), Arc::new(AesGcmCipher::new([8u8; 32])));
        let registry = EnvironmentRegistry::from_paths(&paths, secrets);

        let mut config = registry.load_or_default().unwrap();
        config.auth_gateway_url = Some(gateway_url.to_string());
        registry.set_config(&config).unwrap();

        Self { dir, registry }
    }

    pub fn add_environment(
        &self,
        name: &str,
        base_url: &str,
        mode: AuthMode,
        credentials: Option<(&str, &str)>,
    ) {
        self.registry
            .update_environment(&UpdateEnvironmentRequest {
                environment: name.to_string(),
                tenant_url: format!("https://{name}.identitynow.com"),
                base_url: base_url.to_string(),
                auth_mode: mode,
                client_id: credentials.map(|(id, _)| id.to_string()),
                client_secret: credentials.map(|(_, secret)| secret.to_string()),
            })
            .unwrap();
    }

    pub fn secrets(&self) -> &SecretStore {
        self.registry.secrets()
    }

    pub fn manager(&self) -> SessionManager {
        self.manager_polling(PollSettings {
            interval: Duration::from_millis(300),
            timeout: Duration::from_secs(10),
        })
    }

    pub fn manager_polling(&self, poll: PollSettings) -> SessionManager {
        SessionManager::with_poll_settings(self.registry.clone(), Arc::new(Headless), poll).unwrap()
    }
}
