use chrono::{DateTime, Utc};
use log::debug;

use super::token;
use crate::error::{SecretError, TokenError};
use crate::secrets::{SecretStore, keys};

/// A bearer token with its absolute expiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Wrap a token, reading the expiry from its claims
    pub fn from_token(token: impl Into<String>) -> Result<Self, TokenError> {
        let token = token.into();
        let expires_at = token::token_expiry(&token)?;
        Ok(Self { token, expires_at })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Access and refresh token obtained through the delegated flow.
///
/// Both halves are required; a set missing its refresh token is not a set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegatedTokenSet {
    pub access: AccessToken,
    pub refresh: AccessToken,
}

impl DelegatedTokenSet {
    pub fn from_tokens(access_token: &str, refresh_token: &str) -> Result<Self, TokenError> {
        Ok(Self {
            access: AccessToken::from_token(access_token)?,
            refresh: AccessToken::from_token(refresh_token)?,
        })
    }

    pub fn load(store: &SecretStore, environment: &str) -> Result<Option<Self>, SecretError> {
        let access = load_token(store, environment, keys::OAUTH_ACCESS_TOKEN, keys::OAUTH_EXPIRY)?;
        let refresh = load_token(
            store,
            environment,
            keys::OAUTH_REFRESH_TOKEN,
            keys::OAUTH_REFRESH_EXPIRY,
        )?;
        Ok(match (access, refresh) {
            (Some(access), Some(refresh)) => Some(Self { access, refresh }),
            _ => None,
        })
    }

    /// Replace the stored pair in full; a failed save keeps the previous pair
    pub fn save(&self, store: &SecretStore, environment: &str) -> Result<(), SecretError> {
        let access_expiry = self.access.expires_at.to_rfc3339();
        let refresh_expiry = self.refresh.expires_at.to_rfc3339();
        store.set_all(
            environment,
            &[
                (keys::OAUTH_ACCESS_TOKEN, self.access.token.as_str()),
                (keys::OAUTH_EXPIRY, access_expiry.as_str()),
                (keys::OAUTH_REFRESH_TOKEN, self.refresh.token.as_str()),
                (keys::OAUTH_REFRESH_EXPIRY, refresh_expiry.as_str()),
            ],
        )?;
        debug!("Saved delegated token set for environment: {}", environment);
        Ok(())
    }
}

/// Long-lived client identifier and secret
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ServiceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl ServiceCredentials {
    /// Stored pair, or `None` unless both halves are set
    pub fn load(store: &SecretStore, environment: &str) -> Result<Option<Self>, SecretError> {
        let client_id = store.get(keys::PAT_CLIENT_ID, environment)?;
        let client_secret = store.get(keys::PAT_CLIENT_SECRET, environment)?;
        Ok(match (client_id, client_secret) {
            (Some(client_id), Some(client_secret))
                if !client_id.is_empty() && !client_secret.is_empty() =>
            {
                Some(Self {
                    client_id,
                    client_secret,
                })
            }
            _ => None,
        })
    }

    pub fn save(&self, store: &SecretStore, environment: &str) -> Result<(), SecretError> {
        store.set_all(
            environment,
            &[
                (keys::PAT_CLIENT_ID, self.client_id.as_str()),
                (keys::PAT_CLIENT_SECRET, self.client_secret.as_str()),
            ],
        )
    }
}

/// Access token derived from the service credentials
pub fn load_service_token(
    store: &SecretStore,
    environment: &str,
) -> Result<Option<AccessToken>, SecretError> {
    load_token(store, environment, keys::PAT_ACCESS_TOKEN, keys::PAT_EXPIRY)
}

pub fn save_service_token(
    store: &SecretStore,
    environment: &str,
    token: &AccessToken,
) -> Result<(), SecretError> {
    let expiry = token.expires_at.to_rfc3339();
    store.set_all(
        environment,
        &[(keys::PAT_ACCESS_TOKEN, token.token.as_str()), (keys::PAT_EXPIRY, expiry.as_str())],
    )
}

fn load_token(
    store: &SecretStore,
    environment: &str,
    token_key: &str,
    expiry_key: &str,
) -> Result<Option<AccessToken>, SecretError> {
    let Some(token) = store.get(token_key, environment)?.filter(|t| !t.is_empty()) else {
        return Ok(None);
    };

    let stored_expiry = store
        .get(expiry_key, environment)?
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let expires_at = match stored_expiry {
        Some(expires_at) => expires_at,
        None => token::token_expiry(&token).map_err(|e| SecretError::Corrupt {
            path: store.path_for(token_key, environment),
            reason: e.to_string(),
        })?,
    };

    Ok(Some(AccessToken { token, expires_at }))
}
