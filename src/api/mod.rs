//! HTTP plumbing shared by the credential flows and the connectivity probe

pub mod client;
pub mod constants;
pub mod probe;

pub use client::{TenantClient, http_client};
pub use probe::{ConnectivityProbe, ProbeAuth, ProbeOutcome};
