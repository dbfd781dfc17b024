//! Error types shared by the session core
//!
//! Every failure the auth core can report is classified into one of the
//! [`ErrorKind`] buckets so callers can decide between re-login, refresh and
//! a plain error message without matching on strings.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of session failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing environment, tenant URL or credential pair. Never retried.
    Configuration,
    /// Network failure or non-success HTTP status.
    Transport,
    /// A token or refresh token is past its expiry.
    Expiry,
    /// The platform encryption facility cannot be used.
    EncryptionUnavailable,
    /// Malformed token or login payload.
    Decode,
}

/// Errors raised by the secret store
#[derive(Debug, Error)]
pub enum SecretError {
    #[error(
        "Secure storage is unavailable: {0}. \
         Secrets are never written in plaintext; make sure an OS keychain \
         (Keychain on macOS, Credential Manager on Windows, or a Secret Service \
         provider such as gnome-keyring or KWallet on Linux) is running and \
         unlocked, then try again."
    )]
    EncryptionUnavailable(String),

    #[error("Stored secret at {path:?} could not be decrypted: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Secret store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while decoding a bearer token
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token must have 3 dot-separated segments, found {0}")]
    Segments(usize),

    #[error("token payload is not valid base64url: {0}")]
    Base64(String),

    #[error("token payload is not a JSON object: {0}")]
    Json(String),

    #[error("token has no numeric 'exp' claim")]
    MissingExpiry,
}

/// Errors raised by the credential flows and the session manager
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Environment '{0}' not found")]
    EnvironmentNotFound(String),

    #[error("No tenant URL configured for environment '{0}'")]
    MissingTenantUrl(String),

    #[error("No client ID and secret stored for environment '{0}'")]
    MissingCredentials(String),

    #[error("No refresh token stored for environment '{0}'")]
    MissingRefreshToken(String),

    #[error("refresh token has expired")]
    RefreshTokenExpired,

    #[error("access token has expired")]
    AccessTokenExpired,

    #[error("{context} failed with status {status}: {body}")]
    Status {
        context: &'static str,
        status: u16,
        body: String,
    },

    #[error("{context} request failed: {source}")]
    Transport {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("Timed out after {0:?} waiting for the browser login to complete")]
    LoginTimeout(Duration),

    #[error("Malformed token: {0}")]
    Token(#[from] TokenError),

    #[error("Invalid login payload: {0}")]
    Payload(String),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    pub(crate) fn transport(context: &'static str, source: reqwest::Error) -> Self {
        AuthError::Transport { context, source }
    }

    /// Classify this error for the caller's recovery decision
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::EnvironmentNotFound(_)
            | AuthError::MissingTenantUrl(_)
            | AuthError::MissingCredentials(_)
            | AuthError::MissingRefreshToken(_)
            | AuthError::Config(_) => ErrorKind::Configuration,
            AuthError::RefreshTokenExpired | AuthError::AccessTokenExpired => ErrorKind::Expiry,
            AuthError::Status { .. } | AuthError::Transport { .. } | AuthError::LoginTimeout(_) => {
                ErrorKind::Transport
            }
            AuthError::Token(_) | AuthError::Payload(_) => ErrorKind::Decode,
            AuthError::Secret(SecretError::EncryptionUnavailable(_)) => {
                ErrorKind::EncryptionUnavailable
            }
            AuthError::Secret(SecretError::Corrupt { .. }) => ErrorKind::Decode,
            AuthError::Secret(SecretError::Io(_)) => ErrorKind::Configuration,
        }
    }
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;
