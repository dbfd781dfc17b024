//! Delegated browser login and refresh against a mock intermediary

mod common;

use common::{Harness, LOGIN_KEY, expired_jwt, seal_token_info, valid_jwt};
use httpmock::prelude::*;
use isc_cli::auth::DelegatedTokenSet;
use isc_cli::config::AuthMode;
use isc_cli::secrets::keys;
use isc_cli::session::ConnectionState;
use serde_json::json;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_login_polls_until_token_info_arrives() {
    let server = MockServer::start_async().await;
    let access = valid_jwt();
    let refresh = valid_jwt();

    let initiate = server.mock(|when, then| {
        when.method(POST).path("/uuid").json_body(json!({
            "tenant": "acme",
            "apiBaseURL": server.base_url(),
        }));
        then.status(200).json_body(json!({
            "id": "login-1",
            "encryptionKey": hex::encode(LOGIN_KEY),
            "authURL": "https://acme.login.example.com/authorize",
        }));
    });
    let mut pending = server.mock(|when, then| {
        when.method(GET).path("/uuid/login-1");
        then.status(404);
    });
    server.mock(|when, then| {
        when.method(GET).path("/beta/tenant");
        then.status(200);
    });

    let harness = Harness::new(&server.base_url());
    harness.add_environment("acme", &server.base_url(), AuthMode::Delegated, None);
    let manager = harness.manager();

    let sealed = seal_token_info(&json!({"access_token": access, "refresh_token": refresh}).to_string());
    let started = Instant::now();
    let login = manager.connect("acme");
    let complete_after_three_polls = async {
        while pending.calls_async().await < 3 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        pending.delete_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/uuid/login-1");
                then.status(200).json_body(json!({"tokenInfo": sealed}));
            })
            .await
    };
    let (result, completed) = tokio::join!(login, complete_after_three_polls);

    assert!(result.success, "{:?}", result.error);
    assert!(started.elapsed() >= Duration::from_millis(900));
    initiate.assert_calls(1);
    completed.assert_calls(1);

    let set = DelegatedTokenSet::load(harness.secrets(), "acme").unwrap().unwrap();
    assert_eq!(set.access.token, access);
    assert_eq!(set.refresh.token, refresh);
    assert_eq!(
        manager.connection_state("acme").await,
        ConnectionState::Connected(AuthMode::Delegated)
    );
}

#[tokio::test]
async fn test_payload_without_refresh_token_stores_nothing() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/uuid");
        then.status(200).json_body(json!({
            "id": "login-2",
            "encryptionKey": hex::encode(LOGIN_KEY),
            "authURL": "https://acme.login.example.com/authorize",
        }));
    });
    let sealed = seal_token_info(&json!({"access_token": valid_jwt()}).to_string());
    server.mock(|when, then| {
        when.method(GET).path("/uuid/login-2");
        then.status(200).json_body(json!({"tokenInfo": sealed}));
    });

    let harness = Harness::new(&server.base_url());
    harness.add_environment("acme", &server.base_url(), AuthMode::Delegated, None);

    let result = harness.manager().connect("acme").await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("refresh_token"));
    assert_eq!(harness.secrets().get(keys::OAUTH_ACCESS_TOKEN, "acme").unwrap(), None);
}

#[tokio::test]
async fn test_expired_refresh_token_fails_without_network() {
    let server = MockServer::start_async().await;
    let refresh_mock = server.mock(|when, then| {
        when.method(POST).path("/refresh");
        then.status(200);
    });
    let initiate = server.mock(|when, then| {
        when.method(POST).path("/uuid");
        then.status(500);
    });

    let harness = Harness::new(&server.base_url());
    harness.add_environment("acme", &server.base_url(), AuthMode::Delegated, None);
    harness.secrets().set(keys::OAUTH_ACCESS_TOKEN, "acme", &expired_jwt()).unwrap();
    harness.secrets().set(keys::OAUTH_REFRESH_TOKEN, "acme", &expired_jwt()).unwrap();
    let manager = harness.manager();

    let result = manager.refresh_tokens("acme").await;
    assert_eq!(result.error.as_deref(), Some("refresh token has expired"));
    refresh_mock.assert_calls(0);
    initiate.assert_calls(0);

    let validation = manager.validate_tokens("acme").await;
    assert!(!validation.is_valid);
    assert!(!validation.needs_refresh);
}

#[tokio::test]
async fn test_expired_access_token_is_refreshed_on_connect() {
    let server = MockServer::start_async().await;
    let stored_refresh = valid_jwt();
    let new_access = valid_jwt();
    let refresh_mock = server.mock(|when, then| {
        when.method(POST).path("/refresh").json_body(json!({
            "refreshToken": stored_refresh,
            "apiBaseURL": server.base_url(),
            "tenant": "acme",
        }));
        then.status(200)
            .json_body(json!({"access_token": new_access, "refresh_token": valid_jwt()}));
    });
    let probe = server.mock(|when, then| {
        when.method(GET).path("/beta/tenant");
        then.status(200);
    });

    let harness = Harness::new(&server.base_url());
    harness.add_environment("acme", &server.base_url(), AuthMode::Delegated, None);
    harness.secrets().set(keys::OAUTH_ACCESS_TOKEN, "acme", &expired_jwt()).unwrap();
    harness.secrets().set(keys::OAUTH_REFRESH_TOKEN, "acme", &stored_refresh).unwrap();
    let manager = harness.manager();

    let validation = manager.validate_tokens("acme").await;
    assert!(validation.needs_refresh);
    // expired locally, so no probe was spent on it
    probe.assert_calls(0);

    let result = manager.connect("acme").await;
    assert!(result.success, "{:?}", result.error);
    refresh_mock.assert_calls(1);
    assert_eq!(
        harness.secrets().get(keys::OAUTH_ACCESS_TOKEN, "acme").unwrap(),
        Some(new_access)
    );
}

#[tokio::test]
async fn test_status_reports_time_left() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/beta/tenant");
        then.status(200);
    });

    let harness = Harness::new(&server.base_url());
    harness.add_environment("acme", &server.base_url(), AuthMode::Delegated, None);
    harness.secrets().set(keys::OAUTH_ACCESS_TOKEN, "acme", &valid_jwt()).unwrap();
    harness.secrets().set(keys::OAUTH_REFRESH_TOKEN, "acme", &valid_jwt()).unwrap();
    let manager = harness.manager();

    let status = manager.get_session_status("acme").await;
    assert!(status.is_valid);
    assert_eq!(status.state, ConnectionState::Disconnected);
    let left = status.time_until_expiry(chrono::Utc::now()).unwrap();
    assert!(left > chrono::Duration::minutes(50));

    assert!(manager.connect("acme").await.success);
    manager.disconnect().await;
    assert_eq!(manager.connection_state("acme").await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_gateway_change_applies_to_running_manager() {
    let server = MockServer::start_async().await;
    let refresh_mock = server.mock(|when, then| {
        when.method(POST).path("/refresh");
        then.status(200)
            .json_body(json!({"access_token": valid_jwt(), "refresh_token": valid_jwt()}));
    });

    let harness = Harness::new("http://127.0.0.1:9");
    harness.add_environment("acme", &server.base_url(), AuthMode::Delegated, None);
    harness.secrets().set(keys::OAUTH_ACCESS_TOKEN, "acme", &expired_jwt()).unwrap();
    harness.secrets().set(keys::OAUTH_REFRESH_TOKEN, "acme", &valid_jwt()).unwrap();
    let manager = harness.manager();

    let mut config = harness.registry.load_or_default().unwrap();
    config.auth_gateway_url = Some(server.base_url());
    harness.registry.set_config(&config).unwrap();

    let result = manager.refresh_tokens("acme").await;
    assert!(result.success, "{:?}", result.error);
    refresh_mock.assert_calls(1);
}
