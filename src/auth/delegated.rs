//! Browser-based delegated login through the token-issuing intermediary
//!
//! The intermediary hands out a one-time id, a symmetric key and a URL for
//! the user. Once the user completes the login in their browser, polling the
//! id returns the token pair sealed with that key.

use chrono::Utc;
use log::{debug, info, warn};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::crypto;
use super::models::DelegatedTokenSet;
use super::token;
use crate::api::constants::{
    LOGIN_POLL_INTERVAL, LOGIN_TIMEOUT, login_endpoint, login_status_endpoint, refresh_endpoint,
};
use crate::config::Environment;
use crate::error::{AuthError, AuthResult};
use crate::secrets::{SecretStore, keys};

/// Where a login attempt currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    Requesting,
    AwaitingUserAction,
    Polling,
    Success,
    Timeout,
    Failed,
}

/// Shows the login URL to the user
pub trait LoginPresenter: Send + Sync {
    /// Try to open `url` in a browser
    fn open_browser(&self, url: &str) -> std::io::Result<()>;

    /// Fallback when the browser could not be opened
    fn show_url(&self, url: &str);

    fn stage_changed(&self, _stage: LoginStage) {}
}

/// Opens the system browser, printing the URL if that fails
pub struct SystemBrowser;

impl LoginPresenter for SystemBrowser {
    fn open_browser(&self, url: &str) -> std::io::Result<()> {
        open::that(url)
    }

    fn show_url(&self, url: &str) {
        eprintln!("Open this URL in your browser to log in:\n  {url}");
    }
}

/// Presenter that never opens anything
pub struct Headless;

impl LoginPresenter for Headless {
    fn open_browser(&self, url: &str) -> std::io::Result<()> {
        debug!("Headless login, not opening {}", url);
        Ok(())
    }

    fn show_url(&self, _url: &str) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: LOGIN_POLL_INTERVAL,
            timeout: LOGIN_TIMEOUT,
        }
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    tenant: &'a str,
    #[serde(rename = "apiBaseURL")]
    api_base_url: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    id: String,
    #[serde(rename = "encryptionKey")]
    encryption_key: String,
    #[serde(rename = "authURL")]
    auth_url: String,
}

#[derive(Deserialize)]
struct LoginStatus {
    #[serde(rename = "tokenInfo")]
    token_info: String,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    #[serde(rename = "refreshToken")]
    refresh_token: &'a str,
    #[serde(rename = "apiBaseURL")]
    api_base_url: &'a str,
    tenant: &'a str,
}

#[derive(Deserialize)]
struct TokenPair {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Tenant name sent to the intermediary: first label of the tenant URL host,
/// or the raw value when it has no host
pub fn tenant_name(tenant_url: &str) -> String {
    let raw = tenant_url.trim();
    Url::parse(raw)
        .ok()
        .and_then(|url| {
            url.host_str()
                .and_then(|host| host.split('.').next())
                .filter(|label| !label.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| raw.to_string())
}

#[derive(Clone)]
pub struct DelegatedFlow {
    http_client: Client,
    secrets: SecretStore,
    gateway_url: String,
    poll: PollSettings,
    presenter: Arc<dyn LoginPresenter>,
}

impl DelegatedFlow {
    pub fn new(
        http_client: Client,
        secrets: SecretStore,
        gateway_url: impl Into<String>,
        presenter: Arc<dyn LoginPresenter>,
    ) -> Self {
        Self {
            http_client,
            secrets,
            gateway_url: gateway_url.into(),
            poll: PollSettings::default(),
            presenter,
        }
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_gateway_url(mut self, gateway_url: impl Into<String>) -> Self {
        self.gateway_url = gateway_url.into();
        self
    }

    fn stage(&self, stage: LoginStage) {
        debug!("Delegated login stage: {:?}", stage);
        self.presenter.stage_changed(stage);
    }

    /// Run a full browser login and store the resulting token pair
    pub async fn login(&self, environment: &Environment) -> AuthResult<DelegatedTokenSet> {
        let result = self.run_login(environment).await;
        match &result {
            Ok(_) => self.stage(LoginStage::Success),
            Err(AuthError::LoginTimeout(_)) => self.stage(LoginStage::Timeout),
            Err(e) => {
                warn!("Delegated login for '{}' failed: {}", environment.name, e);
                self.stage(LoginStage::Failed);
            }
        }
        result
    }

    async fn run_login(&self, environment: &Environment) -> AuthResult<DelegatedTokenSet> {
        if environment.tenant_url.trim().is_empty() {
            return Err(AuthError::MissingTenantUrl(environment.name.clone()));
        }
        let tenant = tenant_name(&environment.tenant_url);

        self.stage(LoginStage::Requesting);
        let login = self.initiate(&tenant, &environment.base_url).await?;

        self.stage(LoginStage::AwaitingUserAction);
        if let Err(e) = self.presenter.open_browser(&login.auth_url) {
            warn!("Could not open browser: {}", e);
            self.presenter.show_url(&login.auth_url);
        }

        self.stage(LoginStage::Polling);
        let sealed = self.poll_for_token_info(&login.id).await?;
        let plaintext = crypto::decrypt_token_info(&sealed, &login.encryption_key)?;

        let pair: TokenPair = serde_json::from_str(&plaintext)
            .map_err(|e| AuthError::Payload(format!("token payload is not JSON: {e}")))?;
        let access_token = pair
            .access_token
            .ok_or_else(|| AuthError::Payload("token payload has no access_token".to_string()))?;
        let refresh_token = pair
            .refresh_token
            .ok_or_else(|| AuthError::Payload("token payload has no refresh_token".to_string()))?;

        let set = DelegatedTokenSet::from_tokens(&access_token, &refresh_token)?;
        set.save(&self.secrets, &environment.name)?;
        info!(
            "Delegated login for '{}' complete, access token expires at {}",
            environment.name, set.access.expires_at
        );
        Ok(set)
    }

    async fn initiate(&self, tenant: &str, api_base_url: &str) -> AuthResult<LoginResponse> {
        let url = login_endpoint(&self.gateway_url);
        debug!("Initiating delegated login for tenant '{}' at {}", tenant, url);

        let response = self
            .http_client
            .post(&url)
            .json(&LoginRequest {
                tenant,
                api_base_url,
            })
            .send()
            .await
            .map_err(|e| AuthError::transport("Login initiation", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Status {
                context: "Login initiation",
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Payload(format!("login initiation response: {e}")))
    }

    /// Poll until the sealed token info shows up; errors are retried until the timeout
    async fn poll_for_token_info(&self, login_id: &str) -> AuthResult<String> {
        let url = login_status_endpoint(&self.gateway_url, login_id);
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.poll_once(&url).await {
                Ok(token_info) => {
                    debug!("Login completed after {} polls", attempts);
                    return Ok(token_info);
                }
                Err(e) => debug!("Login poll {} not ready: {}", attempts, e),
            }

            let elapsed = started.elapsed();
            if elapsed >= self.poll.timeout {
                return Err(AuthError::LoginTimeout(self.poll.timeout));
            }
            tokio::time::sleep(self.poll.interval.min(self.poll.timeout - elapsed)).await;
        }
    }

    async fn poll_once(&self, url: &str) -> AuthResult<String> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| AuthError::transport("Login poll", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Status {
                context: "Login poll",
                status: status.as_u16(),
                body: String::new(),
            });
        }

        let body: LoginStatus = response
            .json()
            .await
            .map_err(|e| AuthError::transport("Login poll response", e))?;
        Ok(body.token_info)
    }

    /// Exchange the stored refresh token for a new pair.
    ///
    /// An expired refresh token fails before any request is made.
    pub async fn refresh(&self, environment: &Environment) -> AuthResult<DelegatedTokenSet> {
        let refresh_token = self
            .secrets
            .get(keys::OAUTH_REFRESH_TOKEN, &environment.name)?
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AuthError::MissingRefreshToken(environment.name.clone()))?;

        if token::is_expired(&refresh_token, Utc::now())? {
            info!("Refresh token for '{}' has expired", environment.name);
            return Err(AuthError::RefreshTokenExpired);
        }
        if environment.tenant_url.trim().is_empty() {
            return Err(AuthError::MissingTenantUrl(environment.name.clone()));
        }
        let tenant = tenant_name(&environment.tenant_url);

        let url = refresh_endpoint(&self.gateway_url);
        debug!("Refreshing delegated tokens for '{}' at {}", environment.name, url);
        let response = self
            .http_client
            .post(&url)
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
                api_base_url: &environment.base_url,
                tenant: &tenant,
            })
            .send()
            .await
            .map_err(|e| AuthError::transport("Token refresh", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Status {
                context: "Token refresh",
                status: status.as_u16(),
                body,
            });
        }

        let pair: TokenPair = response
            .json()
            .await
            .map_err(|e| AuthError::Payload(format!("refresh response: {e}")))?;
        let access_token = pair
            .access_token
            .ok_or_else(|| AuthError::Payload("refresh response has no access_token".to_string()))?;
        // Not every refresh rotates the refresh token
        let refresh_token = pair.refresh_token.unwrap_or(refresh_token);

        let set = DelegatedTokenSet::from_tokens(&access_token, &refresh_token)?;
        set.save(&self.secrets, &environment.name)?;
        info!(
            "Refreshed delegated tokens for '{}', access token expires at {}",
            environment.name, set.access.expires_at
        );
        Ok(set)
    }
}
