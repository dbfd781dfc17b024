//! Token handling and the two credential flows

pub mod client_credentials;
pub mod credentials;
pub mod crypto;
pub mod delegated;
pub mod models;
pub mod token;

pub use client_credentials::ServiceCredentialFlow;
pub use credentials::CredentialImport;
pub use delegated::{DelegatedFlow, Headless, LoginPresenter, LoginStage, PollSettings, SystemBrowser};
pub use models::{AccessToken, DelegatedTokenSet, ServiceCredentials};
