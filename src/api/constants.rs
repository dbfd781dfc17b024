//! Endpoints and fixed values for the identity platform and the login intermediary

use std::time::Duration;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("isc-cli/", env!("CARGO_PKG_VERSION"));

/// Token endpoint for the client-credentials grant
pub const TOKEN_PATH: &str = "/oauth/token";

/// Cheap authenticated read used to confirm a token is accepted
pub const TENANT_PATH: &str = "/beta/tenant";

/// Login intermediary paths
pub mod gateway {
    pub const LOGIN_PATH: &str = "/uuid";
    pub const REFRESH_PATH: &str = "/refresh";
}

/// Delay between login completion polls
pub const LOGIN_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Give up on a browser login after this long
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(5 * 60);

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn join(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

pub fn token_endpoint(base_url: &str) -> String {
    join(base_url, TOKEN_PATH)
}

pub fn tenant_endpoint(base_url: &str) -> String {
    join(base_url, TENANT_PATH)
}

pub fn login_endpoint(gateway_url: &str) -> String {
    join(gateway_url, gateway::LOGIN_PATH)
}

/// Poll URL for a pending login
pub fn login_status_endpoint(gateway_url: &str, login_id: &str) -> String {
    format!("{}/{}", login_endpoint(gateway_url), login_id)
}

pub fn refresh_endpoint(gateway_url: &str) -> String {
    join(gateway_url, gateway::REFRESH_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_ignore_trailing_slash() {
        assert_eq!(
            token_endpoint("https://acme.api.identitynow.com/"),
            "https://acme.api.identitynow.com/oauth/token"
        );
        assert_eq!(
            tenant_endpoint("https://acme.api.identitynow.com"),
            "https://acme.api.identitynow.com/beta/tenant"
        );
    }

    #[test]
    fn test_gateway_endpoints() {
        let gw = "https://gw.example.com/Prod/sailapps";
        assert_eq!(login_endpoint(gw), "https://gw.example.com/Prod/sailapps/uuid");
        assert_eq!(
            login_status_endpoint(gw, "abc-123"),
            "https://gw.example.com/Prod/sailapps/uuid/abc-123"
        );
        assert_eq!(refresh_endpoint(gw), "https://gw.example.com/Prod/sailapps/refresh");
    }
}
