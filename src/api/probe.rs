//! Live check that a credential is accepted by the tenant

use log::{debug, warn};
use reqwest::{Client, StatusCode};

use super::client::TenantClient;
use super::constants::tenant_endpoint;
use crate::auth::client_credentials;
use crate::auth::models::ServiceCredentials;

/// What to present to the tenant
#[derive(Debug, Clone)]
pub enum ProbeAuth {
    /// An access token from either flow
    Bearer(String),
    /// Exchange the pair for a throwaway token first; nothing is persisted
    ClientCredentials(ServiceCredentials),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Valid,
    /// The server answered with a non-success status
    Rejected(u16),
    /// No answer, or the credential exchange itself failed
    Unreachable(String),
}

impl ProbeOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ProbeOutcome::Valid)
    }

    pub fn describe(&self) -> String {
        match self {
            ProbeOutcome::Valid => "connection is valid".to_string(),
            ProbeOutcome::Rejected(status) => format!("server rejected the token (HTTP {status})"),
            ProbeOutcome::Unreachable(reason) => format!("could not reach the tenant: {reason}"),
        }
    }
}

#[derive(Clone)]
pub struct ConnectivityProbe {
    http_client: Client,
}

impl ConnectivityProbe {
    pub fn new(http_client: Client) -> Self {
        Self { http_client }
    }

    /// One authenticated read against the tenant; only HTTP 200 means valid
    pub async fn check(&self, base_url: &str, auth: &ProbeAuth) -> ProbeOutcome {
        let token = match auth {
            ProbeAuth::Bearer(token) => token.clone(),
            ProbeAuth::ClientCredentials(credentials) => {
                match client_credentials::exchange(&self.http_client, base_url, credentials).await {
                    Ok(token) => token.token,
                    Err(e) => {
                        warn!("Credential exchange failed during probe: {}", e);
                        return ProbeOutcome::Unreachable(e.to_string());
                    }
                }
            }
        };

        let client = TenantClient::new(base_url, token, self.http_client.clone());
        let url = tenant_endpoint(client.base_url());
        debug!("Probing {}", url);

        match client.get(&url).send().await {
            Ok(response) if response.status() == StatusCode::OK => ProbeOutcome::Valid,
            Ok(response) => {
                let status = response.status().as_u16();
                debug!("Probe rejected with status {}", status);
                ProbeOutcome::Rejected(status)
            }
            Err(e) => {
                warn!("Probe request failed: {}", e);
                ProbeOutcome::Unreachable(e.to_string())
            }
        }
    }
}
