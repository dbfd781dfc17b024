use chrono::{DateTime, Duration, Utc};
use std::fmt;

use crate::config::AuthMode;

/// Outcome of a top-level session operation; failures are values, not errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub success: bool,
    pub error: Option<String>,
}

impl OperationResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl fmt::Display) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// Why a token set did not validate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    /// Nothing stored yet: an initial login is needed
    Absent,
    /// Stored secrets could not be read back: force a new login
    Corrupt(String),
    /// Past its expiry by the local clock
    Expired,
    /// The tenant did not accept the token
    Rejected(String),
    /// Registry or secure storage problem
    Error(String),
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationFailure::Absent => write!(f, "no stored tokens"),
            ValidationFailure::Corrupt(reason) => write!(f, "stored tokens are unreadable: {reason}"),
            ValidationFailure::Expired => write!(f, "access token has expired"),
            ValidationFailure::Rejected(reason) => write!(f, "{reason}"),
            ValidationFailure::Error(reason) => write!(f, "{reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenValidation {
    pub is_valid: bool,
    /// A refresh has a chance of restoring the session
    pub needs_refresh: bool,
    pub auth_mode: AuthMode,
    pub expires_at: Option<DateTime<Utc>>,
    pub checked_at: DateTime<Utc>,
    pub failure: Option<ValidationFailure>,
}

impl TokenValidation {
    pub(crate) fn valid(auth_mode: AuthMode, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            is_valid: true,
            needs_refresh: false,
            auth_mode,
            expires_at: Some(expires_at),
            checked_at: now,
            failure: None,
        }
    }

    pub(crate) fn invalid(auth_mode: AuthMode, failure: ValidationFailure, now: DateTime<Utc>) -> Self {
        Self {
            is_valid: false,
            needs_refresh: false,
            auth_mode,
            expires_at: None,
            checked_at: now,
            failure: Some(failure),
        }
    }

    pub(crate) fn refreshable(mut self, needs_refresh: bool) -> Self {
        self.needs_refresh = needs_refresh;
        self
    }

    pub(crate) fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn error(&self) -> Option<String> {
        self.failure.as_ref().map(ToString::to_string)
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self.failure, Some(ValidationFailure::Corrupt(_)))
    }
}

/// In-memory connection state of one environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected(AuthMode),
    Refreshing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected(mode) => write!(f, "connected ({mode})"),
            ConnectionState::Refreshing => write!(f, "refreshing"),
        }
    }
}

/// Snapshot for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub environment: String,
    pub is_valid: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub auth_mode: AuthMode,
    pub last_checked: DateTime<Utc>,
    pub state: ConnectionState,
    pub error: Option<String>,
}

impl SessionStatus {
    /// Time left before expiry, zero once expired
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at
            .map(|expires_at| (expires_at - now).max(Duration::zero()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_until_expiry_clamps() {
        let now = Utc::now();
        let mut status = SessionStatus {
            environment: "prod".into(),
            is_valid: true,
            expires_at: Some(now + Duration::minutes(5)),
            auth_mode: AuthMode::Delegated,
            last_checked: now,
            state: ConnectionState::Connected(AuthMode::Delegated),
            error: None,
        };
        assert_eq!(status.time_until_expiry(now), Some(Duration::minutes(5)));
        assert_eq!(
            status.time_until_expiry(now + Duration::hours(1)),
            Some(Duration::zero())
        );
        status.expires_at = None;
        assert_eq!(status.time_until_expiry(now), None);
    }

    #[test]
    fn test_failure_messages() {
        let now = Utc::now();
        let validation =
            TokenValidation::invalid(AuthMode::Delegated, ValidationFailure::Expired, now)
                .refreshable(true);
        assert!(validation.needs_refresh);
        assert_eq!(validation.error().as_deref(), Some("access token has expired"));
        assert!(!validation.is_corrupt());
        assert_eq!(OperationResult::failed("boom").error.as_deref(), Some("boom"));
    }
}
