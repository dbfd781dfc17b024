//! Session lifecycle: validation, refresh and login across both auth modes
//!
//! All mutable state lives on a [`SessionManager`] instance; clones share it.
//! Refreshes are single-flight per environment: callers that arrive while a
//! refresh is running await that same refresh and get its outcome.

pub mod status;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::api::{ConnectivityProbe, ProbeAuth, http_client};
use crate::auth::models::{self, AccessToken, DelegatedTokenSet, ServiceCredentials};
use crate::auth::{DelegatedFlow, LoginPresenter, PollSettings, ServiceCredentialFlow};
use crate::config::{AuthMode, Environment, EnvironmentRegistry};
use crate::error::{AuthError, AuthResult, ErrorKind, SecretError};
use crate::secrets::{SecretStore, keys};
pub use status::{ConnectionState, OperationResult, SessionStatus, TokenValidation, ValidationFailure};

type SharedRefresh = Shared<BoxFuture<'static, OperationResult>>;

#[derive(Default)]
struct SessionState {
    connections: HashMap<String, ConnectionState>,
    refreshes: HashMap<String, SharedRefresh>,
}

struct SessionInner {
    registry: EnvironmentRegistry,
    delegated: DelegatedFlow,
    service: ServiceCredentialFlow,
    probe: ConnectivityProbe,
    state: Mutex<SessionState>,
}

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

fn config_error(e: anyhow::Error) -> AuthError {
    AuthError::Config(format!("{e:#}"))
}

impl SessionManager {
    pub fn new(registry: EnvironmentRegistry, presenter: Arc<dyn LoginPresenter>) -> AuthResult<Self> {
        Self::with_poll_settings(registry, presenter, PollSettings::default())
    }

    pub fn with_poll_settings(
        registry: EnvironmentRegistry,
        presenter: Arc<dyn LoginPresenter>,
        poll: PollSettings,
    ) -> AuthResult<Self> {
        let http_client = http_client()?;
        let gateway_url = registry.auth_gateway_url().map_err(config_error)?;
        let secrets = registry.secrets().clone();
        debug!("Initial login gateway: {}", gateway_url);

        Ok(Self {
            inner: Arc::new(SessionInner {
                delegated: DelegatedFlow::new(
                    http_client.clone(),
                    secrets.clone(),
                    gateway_url,
                    presenter,
                )
                .with_poll_settings(poll),
                service: ServiceCredentialFlow::new(http_client.clone(), secrets),
                probe: ConnectivityProbe::new(http_client),
                registry,
                state: Mutex::new(SessionState::default()),
            }),
        })
    }

    pub fn registry(&self) -> &EnvironmentRegistry {
        &self.inner.registry
    }

    fn secrets(&self) -> &SecretStore {
        self.inner.registry.secrets()
    }

    fn environment(&self, name: &str) -> AuthResult<Environment> {
        self.inner
            .registry
            .get_environment(name)
            .map_err(config_error)?
            .ok_or_else(|| AuthError::EnvironmentNotFound(name.to_string()))
    }

    /// Delegated flow pointed at the gateway currently configured
    fn delegated_flow(&self) -> AuthResult<DelegatedFlow> {
        let gateway_url = self
            .inner
            .registry
            .auth_gateway_url()
            .map_err(config_error)?;
        Ok(self.inner.delegated.clone().with_gateway_url(gateway_url))
    }

    fn global_mode(&self) -> AuthResult<AuthMode> {
        self.inner.registry.global_auth_mode().map_err(config_error)
    }

    async fn set_state(&self, environment: &str, state: ConnectionState) {
        let mut session = self.inner.state.lock().await;
        session.connections.insert(environment.to_string(), state);
    }

    pub async fn connection_state(&self, environment: &str) -> ConnectionState {
        let session = self.inner.state.lock().await;
        session
            .connections
            .get(environment)
            .copied()
            .unwrap_or_default()
    }

    /// Check the stored tokens of the global auth mode.
    ///
    /// Unexpired tokens are confirmed against the tenant; expired ones are not.
    pub async fn validate_tokens(&self, environment: &str) -> TokenValidation {
        let now = Utc::now();
        let mode = match self.global_mode() {
            Ok(mode) => mode,
            Err(e) => {
                return TokenValidation::invalid(
                    AuthMode::default(),
                    ValidationFailure::Error(e.to_string()),
                    now,
                );
            }
        };
        let env = match self.environment(environment) {
            Ok(env) => env,
            Err(e) => {
                return TokenValidation::invalid(mode, ValidationFailure::Error(e.to_string()), now);
            }
        };

        let validation = match mode {
            AuthMode::Delegated => self.validate_delegated(&env, now).await,
            AuthMode::ServiceCredential => self.validate_service(&env, now).await,
        };
        debug!(
            "Validated '{}' ({}): valid={} needs_refresh={}",
            environment, mode, validation.is_valid, validation.needs_refresh
        );
        validation
    }

    async fn validate_delegated(&self, env: &Environment, now: DateTime<Utc>) -> TokenValidation {
        let mode = AuthMode::Delegated;
        let set = match DelegatedTokenSet::load(self.secrets(), &env.name) {
            Ok(Some(set)) => set,
            Ok(None) => return TokenValidation::invalid(mode, ValidationFailure::Absent, now),
            Err(e) => return secret_failure(mode, e, now),
        };

        let refreshable = !set.refresh.is_expired(now);
        if set.access.is_expired(now) {
            return TokenValidation::invalid(mode, ValidationFailure::Expired, now)
                .refreshable(refreshable)
                .expiring_at(set.access.expires_at);
        }
        self.confirm(env, mode, &set.access, refreshable, now).await
    }

    async fn validate_service(&self, env: &Environment, now: DateTime<Utc>) -> TokenValidation {
        let mode = AuthMode::ServiceCredential;
        let credentials = match ServiceCredentials::load(self.secrets(), &env.name) {
            Ok(credentials) => credentials,
            Err(e) => return secret_failure(mode, e, now),
        };
        let refreshable = credentials.is_some();

        let token = match models::load_service_token(self.secrets(), &env.name) {
            Ok(Some(token)) => token,
            Ok(None) => {
                return TokenValidation::invalid(mode, ValidationFailure::Absent, now)
                    .refreshable(refreshable);
            }
            Err(e) => return secret_failure(mode, e, now),
        };

        if token.is_expired(now) {
            return TokenValidation::invalid(mode, ValidationFailure::Expired, now)
                .refreshable(refreshable)
                .expiring_at(token.expires_at);
        }
        self.confirm(env, mode, &token, refreshable, now).await
    }

    async fn confirm(
        &self,
        env: &Environment,
        mode: AuthMode,
        token: &AccessToken,
        refreshable: bool,
        now: DateTime<Utc>,
    ) -> TokenValidation {
        let outcome = self
            .inner
            .probe
            .check(&env.base_url, &ProbeAuth::Bearer(token.token.clone()))
            .await;
        if outcome.is_valid() {
            TokenValidation::valid(mode, token.expires_at, now)
        } else {
            TokenValidation::invalid(mode, ValidationFailure::Rejected(outcome.describe()), now)
                .refreshable(refreshable)
                .expiring_at(token.expires_at)
        }
    }

    /// Refresh the tokens of the global auth mode.
    ///
    /// At most one refresh runs per environment; concurrent callers share its result.
    pub async fn refresh_tokens(&self, environment: &str) -> OperationResult {
        let (refresh, leader) = {
            let mut session = self.inner.state.lock().await;
            match session.refreshes.get(environment) {
                Some(in_flight) if in_flight.peek().is_none() => {
                    debug!("Refresh for '{}' already in progress, joining it", environment);
                    (in_flight.clone(), false)
                }
                _ => {
                    let manager = self.clone();
                    let name = environment.to_string();
                    let refresh = async move { manager.run_refresh(name).await }
                        .boxed()
                        .shared();
                    session
                        .refreshes
                        .insert(environment.to_string(), refresh.clone());
                    (refresh, true)
                }
            }
        };

        let outcome = refresh.clone().await;

        if leader {
            let mut session = self.inner.state.lock().await;
            if session
                .refreshes
                .get(environment)
                .is_some_and(|current| current.ptr_eq(&refresh))
            {
                session.refreshes.remove(environment);
            }
        }
        outcome
    }

    async fn run_refresh(&self, environment: String) -> OperationResult {
        let (env, mode) = match self
            .environment(&environment)
            .and_then(|env| Ok((env, self.global_mode()?)))
        {
            Ok(found) => found,
            Err(e) => return OperationResult::failed(e),
        };

        info!("Refreshing {} tokens for '{}'", mode, environment);
        self.set_state(&environment, ConnectionState::Refreshing).await;

        let refreshed = match mode {
            AuthMode::Delegated => match self.delegated_flow() {
                Ok(flow) => flow.refresh(&env).await.map(|set| set.access),
                Err(e) => Err(e),
            },
            AuthMode::ServiceCredential => self.inner.service.refresh(&env).await,
        };

        match refreshed {
            Ok(token) => {
                info!(
                    "Refreshed '{}', access token expires at {}",
                    environment, token.expires_at
                );
                self.set_state(&environment, ConnectionState::Connected(mode))
                    .await;
                OperationResult::ok()
            }
            Err(e) if e.kind() == ErrorKind::Transport => {
                warn!("Refresh for '{}' failed, reconnecting: {}", environment, e);
                self.handle_session_expired(&environment).await
            }
            Err(e) => {
                warn!("Refresh for '{}' failed: {}", environment, e);
                self.set_state(&environment, ConnectionState::Disconnected)
                    .await;
                OperationResult::failed(e)
            }
        }
    }

    /// Drop the connection and log in again without another refresh attempt
    fn handle_session_expired(&self, environment: &str) -> BoxFuture<'static, OperationResult> {
        let manager = self.clone();
        let environment = environment.to_string();
        async move {
            manager
                .set_state(&environment, ConnectionState::Disconnected)
                .await;
            manager.login(&environment, None, false).await
        }
        .boxed()
    }

    /// Connect using the global auth mode
    pub async fn connect(&self, environment: &str) -> OperationResult {
        self.unified_login(environment, None).await
    }

    /// Validate, refresh or log in from scratch, whichever gets a working session.
    ///
    /// `requested` defaults to the global auth mode. A successful fresh login
    /// in another mode makes that mode the global one.
    pub async fn unified_login(
        &self,
        environment: &str,
        requested: Option<AuthMode>,
    ) -> OperationResult {
        self.login(environment, requested, true).await
    }

    async fn login(
        &self,
        environment: &str,
        requested: Option<AuthMode>,
        allow_refresh: bool,
    ) -> OperationResult {
        match self.try_login(environment, requested, allow_refresh).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Login to '{}' failed: {}", environment, e);
                self.set_state(environment, ConnectionState::Disconnected)
                    .await;
                OperationResult::failed(e)
            }
        }
    }

    async fn try_login(
        &self,
        environment: &str,
        requested: Option<AuthMode>,
        allow_refresh: bool,
    ) -> AuthResult<OperationResult> {
        let env = self.environment(environment)?;
        let global = self.global_mode()?;
        let requested = requested.unwrap_or(global);
        self.set_state(environment, ConnectionState::Connecting).await;

        let validation = self.validate_tokens(environment).await;
        if validation.is_valid {
            if validation.auth_mode == requested {
                info!("Existing {} session for '{}' is valid", requested, environment);
                self.set_state(environment, ConnectionState::Connected(requested))
                    .await;
                return Ok(OperationResult::ok());
            }
            // The other mode's tokens stay in storage
            info!(
                "Session for '{}' is valid in {} mode, starting {} login",
                environment, validation.auth_mode, requested
            );
        } else if allow_refresh && validation.needs_refresh && validation.auth_mode == requested {
            let refreshed = self.refresh_tokens(environment).await;
            if !refreshed.success {
                return Ok(refreshed);
            }
            if self.validate_tokens(environment).await.is_valid {
                self.set_state(environment, ConnectionState::Connected(requested))
                    .await;
                return Ok(OperationResult::ok());
            }
            warn!("Refreshed tokens for '{}' were not accepted", environment);
        } else if validation.is_corrupt() && validation.auth_mode == requested {
            warn!(
                "Stored {} tokens for '{}' are unreadable, discarding them",
                requested, environment
            );
            self.clear_tokens(environment, requested)?;
        }

        let token = self.start_flow(&env, requested).await?;
        let outcome = self
            .inner
            .probe
            .check(&env.base_url, &ProbeAuth::Bearer(token.token))
            .await;
        if !outcome.is_valid() {
            self.set_state(environment, ConnectionState::Disconnected)
                .await;
            return Ok(OperationResult::failed(outcome.describe()));
        }

        if requested != global {
            self.inner
                .registry
                .set_global_auth_mode(requested)
                .map_err(config_error)?;
        }
        self.set_state(environment, ConnectionState::Connected(requested))
            .await;
        info!("Connected to '{}' using {} auth", environment, requested);
        Ok(OperationResult::ok())
    }

    async fn start_flow(&self, env: &Environment, mode: AuthMode) -> AuthResult<AccessToken> {
        match mode {
            AuthMode::Delegated => {
                if env.tenant_url.trim().is_empty() {
                    return Err(AuthError::MissingTenantUrl(env.name.clone()));
                }
                Ok(self.delegated_flow()?.login(env).await?.access)
            }
            AuthMode::ServiceCredential => {
                let credentials = ServiceCredentials::load(self.secrets(), &env.name)?
                    .ok_or_else(|| AuthError::MissingCredentials(env.name.clone()))?;
                self.inner
                    .service
                    .request_token(&env.name, &env.base_url, &credentials)
                    .await
            }
        }
    }

    /// Remove derived tokens of one mode; the credential pair is kept
    fn clear_tokens(&self, environment: &str, mode: AuthMode) -> Result<(), SecretError> {
        let doomed: &[&str] = match mode {
            AuthMode::Delegated => &keys::DELEGATED_KEYS,
            AuthMode::ServiceCredential => &[keys::PAT_ACCESS_TOKEN, keys::PAT_EXPIRY],
        };
        for key in doomed {
            self.secrets().delete(key, environment)?;
        }
        Ok(())
    }

    /// Forget every in-memory connection; stored tokens are kept
    pub async fn disconnect(&self) {
        let mut session = self.inner.state.lock().await;
        for state in session.connections.values_mut() {
            *state = ConnectionState::Disconnected;
        }
        info!("Disconnected all sessions");
    }

    pub async fn get_session_status(&self, environment: &str) -> SessionStatus {
        let validation = self.validate_tokens(environment).await;
        SessionStatus {
            environment: environment.to_string(),
            is_valid: validation.is_valid,
            expires_at: validation.expires_at,
            auth_mode: validation.auth_mode,
            last_checked: validation.checked_at,
            state: self.connection_state(environment).await,
            error: validation.error(),
        }
    }

    /// User-triggered refresh, confirmed against the tenant
    pub async fn manual_refresh(&self, environment: &str) -> OperationResult {
        let refreshed = self.refresh_tokens(environment).await;
        if !refreshed.success {
            return refreshed;
        }
        let validation = self.validate_tokens(environment).await;
        if validation.is_valid {
            OperationResult::ok()
        } else {
            OperationResult::failed(
                validation
                    .error()
                    .unwrap_or_else(|| "refreshed tokens were not accepted".to_string()),
            )
        }
    }

    /// Keep a session alive: refresh a valid one that expires within `margin`,
    /// reconnect one that is no longer valid.
    pub async fn keep_alive(&self, environment: &str, margin: chrono::Duration) -> OperationResult {
        let status = self.get_session_status(environment).await;
        if !status.is_valid {
            info!("Session for '{}' is not valid, reconnecting", environment);
            return self.connect(environment).await;
        }
        match status.time_until_expiry(Utc::now()) {
            Some(left) if left < margin => {
                info!(
                    "Session for '{}' expires in {}s, refreshing",
                    environment,
                    left.num_seconds()
                );
                self.manual_refresh(environment).await
            }
            _ => OperationResult::ok(),
        }
    }
}

fn secret_failure(mode: AuthMode, error: SecretError, now: DateTime<Utc>) -> TokenValidation {
    let failure = match error {
        SecretError::Corrupt { .. } => ValidationFailure::Corrupt(error.to_string()),
        other => ValidationFailure::Error(other.to_string()),
    };
    TokenValidation::invalid(mode, failure, now)
}
