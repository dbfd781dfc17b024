use reqwest::{Client, RequestBuilder};
use std::time::Duration;

use super::constants::{CONNECT_TIMEOUT, REQUEST_TIMEOUT, USER_AGENT};
use crate::error::{AuthError, AuthResult};

/// Build the shared HTTP client used by both credential flows and the probe
pub fn http_client() -> AuthResult<Client> {
    Client::builder()
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| AuthError::transport("HTTP client setup", e))
}

/// Minimal authenticated client for one tenant API
pub struct TenantClient {
    base_url: String,
    http_client: Client,
    access_token: String,
}

impl TenantClient {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>, http_client: Client) -> Self {
        Self {
            base_url: base_url.into(),
            http_client,
            access_token: access_token.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `url` with the bearer token attached
    pub fn get(&self, url: &str) -> RequestBuilder {
        self.http_client
            .get(url)
            .bearer_auth(&self.access_token)
            .header("Accept", "application/json")
    }
}
