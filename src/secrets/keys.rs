//! Names of the per-environment secrets

/// Service-credential client identifier
pub const PAT_CLIENT_ID: &str = "environments.pat.clientid";
/// Service-credential client secret
pub const PAT_CLIENT_SECRET: &str = "environments.pat.clientsecret";
/// Access token derived from the client credential pair
pub const PAT_ACCESS_TOKEN: &str = "environments.pat.accesstoken";
/// Expiry of [`PAT_ACCESS_TOKEN`], RFC 3339
pub const PAT_EXPIRY: &str = "environments.pat.expiry";

/// Delegated (browser login) access token
pub const OAUTH_ACCESS_TOKEN: &str = "environments.oauth.accesstoken";
/// Expiry of [`OAUTH_ACCESS_TOKEN`], RFC 3339
pub const OAUTH_EXPIRY: &str = "environments.oauth.expiry";
/// Delegated refresh token
pub const OAUTH_REFRESH_TOKEN: &str = "environments.oauth.refreshtoken";
/// Expiry of [`OAUTH_REFRESH_TOKEN`], RFC 3339
pub const OAUTH_REFRESH_EXPIRY: &str = "environments.oauth.refreshexpiry";

pub const SERVICE_CREDENTIAL_KEYS: [&str; 4] =
    [PAT_CLIENT_ID, PAT_CLIENT_SECRET, PAT_ACCESS_TOKEN, PAT_EXPIRY];

pub const DELEGATED_KEYS: [&str; 4] = [
    OAUTH_ACCESS_TOKEN,
    OAUTH_EXPIRY,
    OAUTH_REFRESH_TOKEN,
    OAUTH_REFRESH_EXPIRY,
];

/// Every secret an environment can own
pub fn all_keys() -> impl Iterator<Item = &'static str> {
    SERVICE_CREDENTIAL_KEYS
        .into_iter()
        .chain(DELEGATED_KEYS)
}
