//! Session core for Identity Security Cloud clients
//!
//! Stores per-environment secrets encrypted at rest, obtains tokens through a
//! delegated browser login or a client-credentials grant, and keeps sessions
//! valid with single-flight refreshes.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod secrets;
pub mod session;

pub use config::{AuthMode, ConfigPaths, Environment, EnvironmentRegistry};
pub use error::{AuthError, ErrorKind, SecretError, TokenError};
pub use secrets::SecretStore;
pub use session::{OperationResult, SessionManager, SessionStatus, TokenValidation};
