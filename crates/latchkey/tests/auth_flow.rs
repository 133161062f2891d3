use std::collections::VecDeque;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{TimeDelta, Utc};
use http::{StatusCode, header};
use latchkey::oauth::RequestErrorKind;
use latchkey::oauth::pkce;
use latchkey::oauth::repository::keys;
use latchkey::{
    ApiClient, ApiError, AuthConfig, AuthError, AuthManager, AuthState, CallbackParams, Effect,
    FileStorage, GuardDecision, HttpClient, MemoryStorage, RouteGuard, Storage,
};
use tokio::sync::{Mutex, Notify};
use url::Url;

#[derive(Clone, Default)]
struct MockClient {
    queue: Arc<Mutex<VecDeque<http::Response<Vec<u8>>>>>,
    seen: Arc<Mutex<Vec<http::Request<Vec<u8>>>>>,
    gate: Option<Arc<Notify>>,
}

impl MockClient {
    fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Default::default()
        }
    }

    async fn push(&self, status: StatusCode, body: impl Into<Vec<u8>>) {
        self.queue.lock().await.push_back(
            http::Response::builder()
                .status(status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
                .unwrap(),
        );
    }

    async fn requests(&self) -> usize {
        self.seen.lock().await.len()
    }
}

impl HttpClient for MockClient {
    type Error = std::convert::Infallible;
    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl core::future::Future<
        Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>,
    > + Send {
        let queue = self.queue.clone();
        let seen = self.seen.clone();
        let gate = self.gate.clone();
        async move {
            seen.lock().await.push(request);
            if let Some(gate) = gate {
                gate.notified().await;
            }
            Ok(queue.lock().await.pop_front().expect("no queued response"))
        }
    }
}

fn config() -> AuthConfig {
    AuthConfig::new(
        "client-123",
        Url::parse("https://auth.example.com").unwrap(),
        Url::parse("https://app.example.com").unwrap(),
    )
    .unwrap()
}

fn jwt(payload: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap());
    format!("{header}.{body}.sig")
}

fn token_body(access_token: &str, expires_in: i64) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "access_token": access_token,
        "id_token": jwt(serde_json::json!({
            "sub": "2481",
            "name": "Ada Lovelace",
            "email": "ada@example.com"
        })),
        "refresh_token": "refresh",
        "expires_in": expires_in,
        "token_type": "Bearer"
    }))
    .unwrap()
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

fn callback_for(login: &Effect, code: &str) -> CallbackParams {
    let url = login.redirect_url().expect("login redirects");
    CallbackParams {
        code: Some(code.into()),
        state: query_value(url, "state").map(Into::into),
        ..Default::default()
    }
}

fn seed_session<S: Storage>(store: &S, access_token: &str, expires_at_ms: i64) {
    store.set(keys::ACCESS_TOKEN, access_token).unwrap();
    store.set(keys::ID_TOKEN, "").unwrap();
    store.set(keys::REFRESH_TOKEN, "").unwrap();
    store.set(keys::EXPIRES_AT, &expires_at_ms.to_string()).unwrap();
    store.set(keys::USER, r#"{"name":"Ada"}"#).unwrap();
}

fn assert_session_gone<S: Storage>(store: &S) {
    for key in keys::SESSION {
        assert_eq!(store.get(key).unwrap(), None, "{key} should be purged");
    }
}

#[tokio::test]
async fn exchange_then_restore_yields_same_session() {
    let store = MemoryStorage::new();
    let client = MockClient::default();
    let manager = AuthManager::new(config(), store.clone(), client.clone());
    assert_eq!(manager.restore(), AuthState::Unauthenticated);

    let login = manager.login("/").unwrap();
    client.push(StatusCode::OK, token_body("at-1", 3600)).await;
    let exchanged_at = Utc::now();
    let effect = manager
        .handle_callback(callback_for(&login, "code-1"))
        .await
        .unwrap();
    assert_eq!(
        effect,
        Effect::Redirect(Url::parse("https://app.example.com/").unwrap())
    );
    assert!(manager.state().is_authenticated());

    // token request shape
    {
        let seen = client.seen.lock().await;
        let req = &seen[0];
        assert_eq!(*req.method(), http::Method::POST);
        assert_eq!(req.uri(), "https://auth.example.com/oauth/v2/token");
        assert_eq!(
            req.headers()[header::CONTENT_TYPE],
            "application/x-www-form-urlencoded"
        );
        let form: Vec<(String, String)> = url::form_urlencoded::parse(req.body())
            .into_owned()
            .collect();
        let get = |k: &str| form.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());
        assert_eq!(get("grant_type"), Some("authorization_code"));
        assert_eq!(get("client_id"), Some("client-123"));
        assert_eq!(get("code"), Some("code-1"));
        assert_eq!(get("redirect_uri"), Some("https://app.example.com/callback"));
        assert_eq!(get("code_verifier").map(str::len), Some(pkce::CODE_VERIFIER_LEN));
    }

    // a fresh manager over the same store sees the session
    let reloaded = AuthManager::new(config(), store.clone(), MockClient::default());
    let restored = reloaded.restore();
    let user = restored.user().expect("user claims restored");
    assert_eq!(user.name.as_deref(), Some("Ada Lovelace"));
    assert_eq!(user.sub.as_deref(), Some("2481"));
    assert_eq!(reloaded.access_token().as_deref(), Some("at-1"));

    let session = reloaded.repository().load_session().unwrap().unwrap();
    let drift = (session.expires_at - (exchanged_at + TimeDelta::seconds(3600))).abs();
    assert!(drift < TimeDelta::seconds(5), "expires_at drifted by {drift}");

    // the flow is gone once the exchange is done
    for key in keys::FLOW {
        assert_eq!(store.get(key).unwrap(), None);
    }
}

#[tokio::test]
async fn expired_session_is_purged_on_restore() {
    let store = MemoryStorage::new();
    seed_session(&store, "abc", Utc::now().timestamp_millis() - 1000);
    store.set(keys::RETURN_TO, "/profile").unwrap();

    let manager = AuthManager::new(config(), store.clone(), MockClient::default());
    assert_eq!(manager.restore(), AuthState::Unauthenticated);
    assert_session_gone(&store);
    assert_eq!(manager.access_token(), None);
    // flow keys are not part of the session
    assert_eq!(store.get(keys::RETURN_TO).unwrap().as_deref(), Some("/profile"));

    let mut rx = manager.subscribe();
    let _ = rx.borrow_and_update();
    assert_eq!(manager.restore(), AuthState::Unauthenticated);
    assert!(!rx.has_changed().unwrap());
}

#[tokio::test]
async fn active_seeded_session_restores() {
    let store = MemoryStorage::new();
    seed_session(&store, "abc", Utc::now().timestamp_millis() + 3_600_000);

    let manager = AuthManager::new(config(), store, MockClient::default());
    let state = manager.restore();
    assert!(state.is_authenticated());
    assert_eq!(state.user().and_then(|u| u.name.as_deref()), Some("Ada"));
    assert_eq!(manager.access_token().as_deref(), Some("abc"));
}

#[tokio::test]
async fn unreadable_session_counts_as_absent() {
    let store = MemoryStorage::new();
    store.set(keys::ACCESS_TOKEN, "abc").unwrap();
    store.set(keys::EXPIRES_AT, "soon").unwrap();

    let manager = AuthManager::new(config(), store.clone(), MockClient::default());
    assert_eq!(manager.restore(), AuthState::Unauthenticated);
    assert_session_gone(&store);
}

#[tokio::test]
async fn tampered_state_halts_without_network() {
    let store = MemoryStorage::new();
    let client = MockClient::default();
    let manager = AuthManager::new(config(), store.clone(), client.clone());
    manager.restore();

    let _login = manager.login("/profile").unwrap();
    let nonce = store.get(keys::AUTH_STATE).unwrap().unwrap();

    let err = manager
        .handle_callback(CallbackParams {
            code: Some("code".into()),
            state: Some("forged".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::StateMismatch));

    let err = manager
        .handle_callback(CallbackParams {
            code: Some("code".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::StateMismatch));

    assert_eq!(client.requests().await, 0);
    assert_eq!(manager.state(), AuthState::Unauthenticated);
    assert_eq!(manager.access_token(), None);
    assert_eq!(store.get(keys::AUTH_STATE).unwrap(), Some(nonce));
    assert!(store.get(keys::CODE_VERIFIER).unwrap().is_some());
}

#[tokio::test]
async fn second_login_replaces_first_flow() {
    let store = MemoryStorage::new();
    let client = MockClient::default();
    let manager = AuthManager::new(config(), store, client.clone());
    manager.restore();

    let first = manager.login("/").unwrap();
    let second = manager.login("/").unwrap();

    let err = manager
        .handle_callback(callback_for(&first, "code"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::StateMismatch));

    client.push(StatusCode::OK, token_body("at", 3600)).await;
    manager
        .handle_callback(callback_for(&second, "code"))
        .await
        .unwrap();
    assert!(manager.state().is_authenticated());
}

#[tokio::test]
async fn failed_exchange_keeps_prior_session() {
    let store = MemoryStorage::new();
    let client = MockClient::default();
    let manager = AuthManager::new(config(), store.clone(), client.clone());
    manager.restore();

    let login = manager.login("/").unwrap();
    client.push(StatusCode::OK, token_body("first", 3600)).await;
    manager
        .handle_callback(callback_for(&login, "code-1"))
        .await
        .unwrap();

    let login = manager.login("/").unwrap();
    client
        .push(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"code expired"}"#,
        )
        .await;
    let err = manager
        .handle_callback(callback_for(&login, "code-2"))
        .await
        .unwrap_err();

    let request_error = err.request_error().expect("token exchange error");
    assert_eq!(request_error.status(), Some(StatusCode::BAD_REQUEST));
    assert!(manager.state().is_authenticated());
    assert_eq!(manager.access_token().as_deref(), Some("first"));
    for key in keys::FLOW {
        assert_eq!(store.get(key).unwrap(), None);
    }
}

async fn assert_unusable_token_response_rejected(body: &str) {
    let store = MemoryStorage::new();
    let client = MockClient::default();
    let manager = AuthManager::new(config(), store.clone(), client.clone());
    manager.restore();

    let login = manager.login("/").unwrap();
    client.push(StatusCode::OK, body).await;
    let err = manager
        .handle_callback(callback_for(&login, "code"))
        .await
        .unwrap_err();

    let request_error = err.request_error().expect("token exchange error");
    assert!(matches!(
        request_error.kind(),
        RequestErrorKind::InvalidTokenResponse
    ));
    assert_eq!(manager.state(), AuthState::Unauthenticated);
    assert_eq!(manager.access_token(), None);
    assert_session_gone(&store);
    for key in keys::FLOW {
        assert_eq!(store.get(key).unwrap(), None);
    }
}

#[tokio::test]
async fn empty_access_token_is_not_a_login() {
    assert_unusable_token_response_rejected(
        r#"{"access_token":"","id_token":"x","expires_in":3600}"#,
    )
    .await;
}

#[tokio::test]
async fn zero_lifetime_token_is_not_a_login() {
    assert_unusable_token_response_rejected(
        r#"{"access_token":"at","id_token":"x","expires_in":0}"#,
    )
    .await;
    assert_unusable_token_response_rejected(
        r#"{"access_token":"","id_token":"x","expires_in":0}"#,
    )
    .await;
}

#[tokio::test]
async fn undecodable_id_token_still_authenticates() {
    let client = MockClient::default();
    let manager = AuthManager::new(config(), MemoryStorage::new(), client.clone());
    manager.restore();

    let login = manager.login("/").unwrap();
    client
        .push(
            StatusCode::OK,
            r#"{"access_token":"opaque","id_token":"not-a-jwt","expires_in":60}"#,
        )
        .await;
    manager
        .handle_callback(callback_for(&login, "code"))
        .await
        .unwrap();
    assert_eq!(manager.state(), AuthState::Authenticated { user: None });
}

#[tokio::test]
async fn provider_error_callback_is_ignored() {
    let client = MockClient::default();
    let manager = AuthManager::new(config(), MemoryStorage::new(), client.clone());
    manager.restore();
    let _login = manager.login("/").unwrap();

    let url = Url::parse(
        "https://app.example.com/callback?error=access_denied&error_description=user+cancelled",
    )
    .unwrap();
    assert!(manager.is_callback(&url));
    assert_eq!(manager.handle_callback_url(&url).await.unwrap(), Effect::None);
    assert_eq!(client.requests().await, 0);
    assert_eq!(manager.state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn logout_is_idempotent() {
    let store = MemoryStorage::new();
    seed_session(&store, "abc", Utc::now().timestamp_millis() + 3_600_000);
    let manager = AuthManager::new(config(), store.clone(), MockClient::default());
    assert!(manager.restore().is_authenticated());

    let first = manager.logout();
    assert_session_gone(&store);
    assert_eq!(manager.state(), AuthState::Unauthenticated);

    let second = manager.logout();
    assert_eq!(first, second);
    let url = second.redirect_url().unwrap();
    assert_eq!(url.path(), "/oauth/v2/logout");
    assert_eq!(query_value(url, "client_id").as_deref(), Some("client-123"));
    assert_eq!(
        query_value(url, "post_logout_redirect_uri").as_deref(),
        Some("https://app.example.com")
    );
    assert_eq!(manager.state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn guard_login_callback_returns_to_guarded_location() {
    let client = MockClient::default();
    let manager = AuthManager::new(config(), MemoryStorage::new(), client.clone());
    manager.restore();
    let guard = RouteGuard::new(manager.config());

    let GuardDecision::Redirect(login_location) = guard.check(&manager.state(), "/profile?tab=keys")
    else {
        panic!("unauthenticated visitor must be redirected");
    };
    assert_eq!(login_location, "/login?redirect=%2Fprofile%3Ftab%3Dkeys");

    // the login route picks up the redirect parameter
    let (_, query) = login_location.split_once('?').unwrap();
    let redirect = latchkey::oauth::guard::redirect_param(query);
    assert_eq!(manager.enter_login_route(redirect.as_deref()).unwrap(), Effect::None);

    let login = manager.login("/login").unwrap();
    client.push(StatusCode::OK, token_body("at", 3600)).await;
    let effect = manager
        .handle_callback(callback_for(&login, "code"))
        .await
        .unwrap();

    assert_eq!(
        effect,
        Effect::Redirect(Url::parse("https://app.example.com/profile?tab=keys").unwrap())
    );
    assert_eq!(
        guard.check(&manager.state(), "/profile?tab=keys"),
        GuardDecision::Allow
    );
}

#[tokio::test]
async fn foreign_return_to_falls_back_to_root() {
    let client = MockClient::default();
    let manager = AuthManager::new(config(), MemoryStorage::new(), client.clone());
    manager.restore();

    manager
        .enter_login_route(Some("https://evil.example.net/phish"))
        .unwrap();
    let login = manager.login("/").unwrap();
    client.push(StatusCode::OK, token_body("at", 3600)).await;
    let effect = manager
        .handle_callback(callback_for(&login, "code"))
        .await
        .unwrap();
    assert_eq!(
        effect,
        Effect::Redirect(Url::parse("https://app.example.com/").unwrap())
    );
}

#[tokio::test]
async fn restore_during_callback_does_not_override_it() {
    let gate = Arc::new(Notify::new());
    let client = MockClient::gated(gate.clone());
    let store = MemoryStorage::new();
    let manager = AuthManager::new(config(), store.clone(), client.clone());
    manager.restore();

    let login = manager.login("/").unwrap();
    client.push(StatusCode::OK, token_body("at", 3600)).await;

    let mut rx = manager.subscribe();
    let callback = manager.handle_callback(callback_for(&login, "code"));
    let racer = async {
        rx.wait_for(|s| *s == AuthState::CallbackProcessing)
            .await
            .unwrap();
        assert_eq!(manager.restore(), AuthState::CallbackProcessing);
        gate.notify_one();
    };

    let (effect, ()) = tokio::join!(callback, racer);
    assert!(matches!(effect.unwrap(), Effect::Redirect(_)));
    assert!(manager.state().is_authenticated());
    assert_eq!(store.get(keys::ACCESS_TOKEN).unwrap().as_deref(), Some("at"));

    // once settled, restore agrees with the callback
    assert!(manager.restore().is_authenticated());
}

#[tokio::test]
async fn api_calls_carry_the_session_token() {
    let store = MemoryStorage::new();
    seed_session(&store, "abc", Utc::now().timestamp_millis() + 3_600_000);
    let client = MockClient::default();
    let manager = AuthManager::new(config(), store, client.clone());
    manager.restore();

    let api = ApiClient::new(manager.authenticated_client())
        .with_base_url(Url::parse("https://api.example.com/api").unwrap());

    client
        .push(StatusCode::OK, r#"{"accountType":"free","quota":5}"#)
        .await;
    let profile = api.get_user_profile().await.unwrap();
    assert_eq!(profile.account_type, "free");
    assert_eq!(profile.extra["quota"], serde_json::json!(5));

    client.push(StatusCode::UNAUTHORIZED, "").await;
    assert!(matches!(
        api.fetch_protected_resource().await,
        Err(ApiError::Unauthorized)
    ));

    let seen = client.seen.lock().await;
    assert_eq!(seen[0].uri(), "https://api.example.com/api/user/profile");
    assert_eq!(seen[0].headers()[header::AUTHORIZATION], "Bearer abc");
    assert_eq!(seen[1].uri(), "https://api.example.com/api/protected-resource");
}

#[tokio::test]
async fn requests_without_session_have_no_authorization() {
    let client = MockClient::default();
    let manager = AuthManager::new(config(), MemoryStorage::new(), client.clone());
    manager.restore();

    let api = ApiClient::new(manager.authenticated_client());
    client.push(StatusCode::OK, "{}").await;
    api.fetch_protected_resource().await.unwrap();

    let seen = client.seen.lock().await;
    assert!(seen[0].headers().get(header::AUTHORIZATION).is_none());
}

#[tokio::test]
async fn file_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("session.json");
    let client = MockClient::default();

    let manager = AuthManager::new(config(), FileStorage::new(&path), client.clone());
    manager.restore();
    let login = manager.login("/dashboard").unwrap();

    // the flow has to survive the round trip to the provider as well
    let relaunched = AuthManager::new(config(), FileStorage::new(&path), client.clone());
    relaunched.restore();
    client.push(StatusCode::OK, token_body("persisted", 3600)).await;
    let effect = relaunched
        .handle_callback(callback_for(&login, "code"))
        .await
        .unwrap();
    assert_eq!(
        effect,
        Effect::Redirect(Url::parse("https://app.example.com/dashboard").unwrap())
    );

    let again = AuthManager::new(config(), FileStorage::new(&path), MockClient::default());
    assert!(again.restore().is_authenticated());
    assert_eq!(again.access_token().as_deref(), Some("persisted"));
}

#[tokio::test]
async fn corrupt_store_file_does_not_block_login() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, "{not json").unwrap();
    let client = MockClient::default();

    let manager = AuthManager::new(config(), FileStorage::new(&path), client.clone());
    assert_eq!(manager.restore(), AuthState::Unauthenticated);

    let first = manager.login("/settings").unwrap();
    // the pending return location from the first login carries over
    let second = manager.login("/").unwrap();
    assert_ne!(
        query_value(first.redirect_url().unwrap(), "state"),
        query_value(second.redirect_url().unwrap(), "state")
    );

    client.push(StatusCode::OK, token_body("fresh", 3600)).await;
    let effect = manager
        .handle_callback(callback_for(&second, "code"))
        .await
        .unwrap();
    assert_eq!(
        effect,
        Effect::Redirect(Url::parse("https://app.example.com/settings").unwrap())
    );

    let again = AuthManager::new(config(), FileStorage::new(&path), MockClient::default());
    assert!(again.restore().is_authenticated());
    assert_eq!(again.access_token().as_deref(), Some("fresh"));
}

#[tokio::test]
async fn logout_recovers_corrupt_store_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, "[]").unwrap();

    let store = FileStorage::new(&path);
    let manager = AuthManager::new(config(), store.clone(), MockClient::default());
    assert!(manager.logout().redirect_url().is_some());
    assert_eq!(store.get(keys::ACCESS_TOKEN).unwrap(), None);
    manager.login("/").unwrap();
    assert!(store.get(keys::AUTH_STATE).unwrap().is_some());
}

#[test]
fn code_challenge_is_url_safe() {
    for _ in 0..32 {
        let (challenge, verifier) = pkce::generate_pkce();
        assert_eq!(challenge, pkce::generate_code_challenge(&verifier));
        assert_eq!(challenge.len(), 43);
        assert!(!challenge.contains(['+', '/', '=']));
        assert!(verifier.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
