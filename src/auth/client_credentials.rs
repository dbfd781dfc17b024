//! Client-credentials grant against the tenant's own token endpoint

use chrono::Utc;
use log::{debug, info};
use reqwest::Client;
use serde::Deserialize;

use super::models::{self, AccessToken, ServiceCredentials};
use crate::api::constants::token_endpoint;
use crate::config::Environment;
use crate::error::{AuthError, AuthResult};
use crate::secrets::SecretStore;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
}

/// Exchange a client identifier and secret for an access token.
///
/// Nothing is persisted; see [`ServiceCredentialFlow::request_token`].
pub async fn exchange(
    http_client: &Client,
    base_url: &str,
    credentials: &ServiceCredentials,
) -> AuthResult<AccessToken> {
    let url = token_endpoint(base_url);
    debug!("Requesting client-credentials token from {}", url);

    let response = http_client
        .post(&url)
        .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
        .form(&[("grant_type", "client_credentials")])
        .send()
        .await
        .map_err(|e| AuthError::transport("Token request", e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::Status {
            context: "Token request",
            status: status.as_u16(),
            body,
        });
    }

    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| AuthError::transport("Token response", e))?;
    if let Some(token_type) = body.token_type.as_deref() {
        debug!("Received {} token", token_type);
    }

    Ok(AccessToken::from_token(body.access_token)?)
}

/// Service-credential flow bound to a secret store
#[derive(Clone)]
pub struct ServiceCredentialFlow {
    http_client: Client,
    secrets: SecretStore,
}

impl ServiceCredentialFlow {
    pub fn new(http_client: Client, secrets: SecretStore) -> Self {
        Self {
            http_client,
            secrets,
        }
    }

    /// Exchange the pair and persist the resulting access token for `environment`.
    ///
    /// The stored credential pair is never touched, success or failure.
    pub async fn request_token(
        &self,
        environment: &str,
        base_url: &str,
        credentials: &ServiceCredentials,
    ) -> AuthResult<AccessToken> {
        let token = exchange(&self.http_client, base_url, credentials).await?;
        models::save_service_token(&self.secrets, environment, &token)?;
        info!(
            "Obtained service token for '{}', expires at {}",
            environment, token.expires_at
        );
        Ok(token)
    }

    /// Re-derive the access token from the stored pair
    pub async fn refresh(&self, environment: &Environment) -> AuthResult<AccessToken> {
        let credentials = ServiceCredentials::load(&self.secrets, &environment.name)?
            .ok_or_else(|| AuthError::MissingCredentials(environment.name.clone()))?;
        self.request_token(&environment.name, &environment.base_url, &credentials)
            .await
    }

    /// Stored token if it is still inside its lifetime
    pub fn current_token(&self, environment: &str) -> AuthResult<Option<AccessToken>> {
        let now = Utc::now();
        Ok(models::load_service_token(&self.secrets, environment)?
            .filter(|token| !token.is_expired(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::cipher::AesGcmCipher;
    use crate::secrets::keys;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use httpmock::prelude::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn jwt(exp: i64) -> String {
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp}}}"#));
        format!("e30.{payload}.sig")
    }

    fn flow() -> (TempDir, ServiceCredentialFlow) {
        let dir = TempDir::new().unwrap();
        let store = SecretStore::new(dir.path(), Arc::new(AesGcmCipher::new([1u8; 32])));
        (dir, ServiceCredentialFlow::new(Client::new(), store))
    }

    fn credentials() -> ServiceCredentials {
        ServiceCredentials {
            client_id: "abc".into(),
            client_secret: "xyz".into(),
        }
    }

    #[tokio::test]
    async fn test_request_token_persists_access_token() {
        let server = MockServer::start_async().await;
        let token = jwt(2_000_000_000);
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/oauth/token")
                // base64("abc:xyz")
                .header("authorization", "Basic YWJjOnh5eg==")
                .body_includes("grant_type=client_credentials");
            then.status(200)
                .json_body(serde_json::json!({"access_token": token, "token_type": "bearer"}));
        });

        let (_dir, flow) = flow();
        let access = flow
            .request_token("prod", &server.base_url(), &credentials())
            .await
            .unwrap();
        mock.assert();
        assert_eq!(access.expires_at.timestamp(), 2_000_000_000);
        assert_eq!(
            flow.secrets.get(keys::PAT_ACCESS_TOKEN, "prod").unwrap(),
            Some(token)
        );
        assert!(flow.current_token("prod").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rejected_credentials_leave_store_untouched() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/oauth/token");
            then.status(401).body("invalid_client");
        });

        let (_dir, flow) = flow();
        credentials().save(&flow.secrets, "prod").unwrap();
        let err = flow
            .request_token("prod", &server.base_url(), &credentials())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Status { status: 401, .. }));
        assert_eq!(flow.secrets.get(keys::PAT_ACCESS_TOKEN, "prod").unwrap(), None);
        assert_eq!(
            ServiceCredentials::load(&flow.secrets, "prod").unwrap(),
            Some(credentials())
        );
    }

    #[tokio::test]
    async fn test_refresh_without_credentials() {
        let (_dir, flow) = flow();
        let env = Environment {
            name: "prod".into(),
            tenant_url: String::new(),
            base_url: "http://127.0.0.1:9".into(),
            auth_mode: crate::config::AuthMode::ServiceCredential,
        };
        let err = flow.refresh(&env).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials(_)));
    }
}
