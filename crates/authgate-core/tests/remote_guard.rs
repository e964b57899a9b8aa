//! Integration tests for the remote route guard.
//!
//! Verifies that `GET /auth/me` drives both the email store and redirects.

use std::sync::Arc;
use std::time::Duration;

use authgate_core::{
    ApiClient, ApiError, AuthContext, Config, GuardMode, GuardOutcome, RecordingNavigator,
    RouteGuard, SessionState,
};
use authgate_core::storage::MemoryStore;
use serde_json::json;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}

struct Harness {
    guard: RouteGuard,
    session: Arc<SessionState>,
    navigator: Arc<RecordingNavigator>,
}

fn remote_guard(server: &MockServer, token: Option<&str>) -> Harness {
    let session = Arc::new(SessionState::new(Arc::new(MemoryStore::standalone()), "token").unwrap());
    if let Some(token) = token {
        session.set_token(Some(token)).unwrap();
    }
    let navigator = Arc::new(RecordingNavigator::new());
    let api = ApiClient::new(server.uri())
        .unwrap()
        .with_retry_policy(2, Duration::from_millis(5));
    let guard = RouteGuard::new(Arc::clone(&session), navigator.clone()).remote(api);
    Harness {
        guard,
        session,
        navigator,
    }
}

#[tokio::test]
async fn test_profile_success_sets_email_and_allows_any_route() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .and(header("authorization", "Bearer abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"email": "a@b.com", "id": 7})))
        .expect(2)
        .mount(&server)
        .await;

    let h = remote_guard(&server, Some("abc"));
    assert_eq!(h.guard.mode(), GuardMode::Remote);

    assert_eq!(h.guard.check("/dashboard").await, GuardOutcome::Allowed);
    assert_eq!(h.guard.check("/about").await, GuardOutcome::Allowed);
    assert_eq!(h.session.email().as_deref(), Some("a@b.com"));
    assert!(h.navigator.redirects().is_empty());
}

#[tokio::test]
async fn test_profile_success_notifies_email_subscribers() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"email": "a@b.com"})))
        .mount(&server)
        .await;

    let h = remote_guard(&server, Some("abc"));
    let mut rx = h.session.subscribe_email();
    assert_eq!(*rx.borrow_and_update(), None);

    assert_eq!(h.guard.check("/dashboard").await, GuardOutcome::Allowed);
    tokio::time::timeout(Duration::from_secs(1), rx.changed())
        .await
        .expect("email published before timeout")
        .unwrap();
    assert_eq!(rx.borrow_and_update().as_deref(), Some("a@b.com"));

    // Same profile again is not a change
    assert_eq!(h.guard.check("/settings").await, GuardOutcome::Allowed);
    assert!(!rx.has_changed().unwrap());

    h.session.clear().unwrap();
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), None);
}

#[tokio::test]
async fn test_unauthorized_redirects_protected_route() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let h = remote_guard(&server, Some("expired"));

    assert_eq!(
        h.guard.check("/dashboard").await,
        GuardOutcome::Redirected("/login".to_string())
    );
    assert_eq!(h.navigator.redirects(), vec!["/login".to_string()]);
    assert_eq!(h.session.email(), None);
}

#[tokio::test]
async fn test_failure_on_public_route_is_swallowed() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let h = remote_guard(&server, Some("abc"));

    for route in ["/about", "/login", "/register", "/verify"] {
        assert!(h.guard.check(route).await.is_allowed());
    }
    assert!(h.navigator.redirects().is_empty());
    assert_eq!(h.session.email(), None);
}

#[tokio::test]
async fn test_server_error_with_valid_token_still_redirects() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let h = remote_guard(&server, Some("valid"));

    // A transient backend failure looks exactly like being signed out
    assert!(!h.guard.check("/dashboard").await.is_allowed());
    assert_eq!(h.navigator.last().as_deref(), Some("/login"));
}

#[tokio::test]
async fn test_no_token_sends_no_authorization_header() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"email": "a@b.com"})))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let h = remote_guard(&server, None);
    assert!(!h.guard.check("/dashboard").await.is_allowed());
}

#[tokio::test]
async fn test_malformed_body_counts_as_failure() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "no email"})))
        .mount(&server)
        .await;

    let h = remote_guard(&server, Some("abc"));
    assert!(!h.guard.check("/dashboard").await.is_allowed());
}

#[tokio::test]
async fn test_rate_limit_is_retried_then_fails() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let api = ApiClient::new(server.uri())
        .unwrap()
        .with_retry_policy(2, Duration::from_millis(5))
        .with_token("abc".to_string());
    assert!(matches!(api.fetch_current_user().await, Err(ApiError::RateLimited)));
}

#[tokio::test]
async fn test_auth_context_refresh_profile() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .and(header("authorization", "Bearer abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"email": "a@b.com"})))
        .mount(&server)
        .await;

    let config = Config {
        api_base_url: server.uri(),
        ..Config::default()
    };
    let ctx = AuthContext::new(
        config,
        Arc::new(MemoryStore::standalone()),
        Arc::new(RecordingNavigator::new()),
    )
    .unwrap();
    ctx.login("abc").unwrap();

    let user = ctx.refresh_profile().await.unwrap();
    assert_eq!(user.email, "a@b.com");
    assert_eq!(ctx.session().email().as_deref(), Some("a@b.com"));

    ctx.logout().unwrap();
    assert_eq!(ctx.session().email(), None);
}
