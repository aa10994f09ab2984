//! End-to-end session lifecycle flows against a scripted transport:
//! login/logout, silent refresh, 401 recovery and registration.

use std::collections::VecDeque;
use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use tempfile::TempDir;

use mindspace_cli::api::notes::NotesApi;
use mindspace_cli::api::{ApiClient, Transport, TransportRequest, TransportResponse};
use mindspace_cli::auth::{RegisterFields, SessionManager, TokenPair, TokenStore};
use mindspace_cli::error::ApiError;

struct ScriptedTransport {
    responses: Mutex<VecDeque<TransportResponse>>,
    sent: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    fn new(responses: Vec<TransportResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn sent(&self) -> Vec<TransportRequest> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, ApiError> {
        self.sent.lock().push(request);
        self.responses.lock().pop_front().ok_or(ApiError::Network {
            message: "connection refused".into(),
        })
    }
}

fn access_token(username: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({
            "token_type": "access",
            "user_id": 1,
            "username": username,
            "exp": 4_102_444_800_i64,
        })
        .to_string()
        .as_bytes(),
    );
    format!("{header}.{payload}.sig")
}

fn json_response(status: u16, body: serde_json::Value) -> TransportResponse {
    TransportResponse {
        status,
        body: body.to_string().into_bytes(),
    }
}

fn manager(temp: &TempDir, transport: Arc<ScriptedTransport>) -> Arc<SessionManager> {
    let store = TokenStore::new(temp.path().join("tokens.json"));
    Arc::new(SessionManager::new(transport, store))
}

fn seeded_manager(temp: &TempDir, transport: Arc<ScriptedTransport>) -> Arc<SessionManager> {
    let store = TokenStore::new(temp.path().join("tokens.json"));
    store
        .save(&TokenPair {
            access: access_token("ada"),
            refresh: "refresh-1".into(),
        })
        .expect("seed tokens");
    Arc::new(SessionManager::new(transport, store))
}

fn token_store(temp: &TempDir) -> TokenStore {
    TokenStore::new(temp.path().join("tokens.json"))
}

#[tokio::test]
async fn login_with_valid_credentials_yields_matching_session() {
    let temp = TempDir::new().expect("tempdir");
    let transport = ScriptedTransport::new(vec![json_response(
        200,
        serde_json::json!({"access": access_token("ada"), "refresh": "refresh-1"}),
    )]);
    let auth = manager(&temp, transport.clone());

    let session = auth.login("ada", "hunter22").await.expect("login");
    assert_eq!(session.username(), Some("ada"));
    assert!(auth.session().is_some());

    // The pair is persisted under the single durable key.
    let stored = token_store(&temp).load().expect("load").expect("pair");
    assert_eq!(stored.refresh, "refresh-1");

    // Credential posts are unauthenticated.
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].path, "token/");
    assert!(sent[0].bearer.is_none());
}

#[tokio::test]
async fn rejected_login_does_not_mutate_state() {
    let temp = TempDir::new().expect("tempdir");
    let transport = ScriptedTransport::new(vec![json_response(
        401,
        serde_json::json!({"detail": "No active account found"}),
    )]);
    let auth = manager(&temp, transport);

    let err = auth.login("ada", "wrong").await.expect_err("must fail");
    assert_matches!(err, ApiError::Auth);
    assert!(auth.session().is_none());
    assert_eq!(token_store(&temp).load().expect("load"), None);
}

#[tokio::test]
async fn refresh_with_invalid_token_always_clears_the_session() {
    let temp = TempDir::new().expect("tempdir");
    let transport = ScriptedTransport::new(vec![json_response(
        401,
        serde_json::json!({"detail": "Token is invalid or expired"}),
    )]);
    let auth = seeded_manager(&temp, transport);
    assert!(auth.session().is_some());

    assert!(!auth.refresh().await);
    assert!(auth.session().is_none());
    assert_eq!(token_store(&temp).load().expect("load"), None);
}

#[tokio::test]
async fn refresh_replaces_only_the_access_token() {
    let temp = TempDir::new().expect("tempdir");
    let new_access = access_token("ada");
    let transport = ScriptedTransport::new(vec![json_response(
        200,
        serde_json::json!({"access": new_access}),
    )]);
    let auth = seeded_manager(&temp, transport);

    assert!(auth.refresh().await);
    let stored = token_store(&temp).load().expect("load").expect("pair");
    assert_eq!(stored.access, new_access);
    assert_eq!(stored.refresh, "refresh-1", "refresh token must be kept");
    assert!(auth.session().is_some());
}

#[tokio::test]
async fn expired_access_token_recovers_with_exactly_one_refresh_and_retry() {
    let temp = TempDir::new().expect("tempdir");
    let new_access = access_token("ada");
    let transport = ScriptedTransport::new(vec![
        json_response(401, serde_json::json!({"detail": "token expired"})),
        json_response(200, serde_json::json!({"access": new_access})),
        json_response(
            200,
            serde_json::json!([
                {"id": 1, "title": "first", "updated_at": "2024-05-01T10:00:00Z"},
            ]),
        ),
    ]);
    let auth = seeded_manager(&temp, transport.clone());
    let notes = NotesApi::new(ApiClient::new(transport.clone(), auth));

    let listing = notes.list().await.expect("list succeeds after retry");
    assert_eq!(listing.len(), 1);

    let sent = transport.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].path, "notes/");
    assert_eq!(sent[1].path, "token/refresh/");
    assert_eq!(sent[2].path, "notes/");
    assert_eq!(
        sent[2].bearer.as_deref(),
        Some(new_access.as_str()),
        "retry must carry the freshly minted access token"
    );
}

#[tokio::test]
async fn a_request_is_never_retried_twice() {
    let temp = TempDir::new().expect("tempdir");
    let transport = ScriptedTransport::new(vec![
        json_response(401, serde_json::json!({"detail": "token expired"})),
        json_response(200, serde_json::json!({"access": access_token("ada")})),
        json_response(401, serde_json::json!({"detail": "still unauthorized"})),
    ]);
    let auth = seeded_manager(&temp, transport.clone());
    let notes = NotesApi::new(ApiClient::new(transport.clone(), auth));

    let err = notes.list().await.expect_err("second 401 must propagate");
    assert_matches!(err, ApiError::Status { status: 401, .. });
    // One refresh, one resend — and then the loop stops.
    assert_eq!(transport.sent().len(), 3);
}

#[tokio::test]
async fn failed_refresh_during_retry_forces_logout() {
    let temp = TempDir::new().expect("tempdir");
    let transport = ScriptedTransport::new(vec![
        json_response(401, serde_json::json!({"detail": "token expired"})),
        json_response(401, serde_json::json!({"detail": "refresh expired"})),
    ]);
    let auth = seeded_manager(&temp, transport.clone());
    let notes = NotesApi::new(ApiClient::new(transport.clone(), auth.clone()));

    let err = notes.list().await.expect_err("must fail");
    assert_matches!(err, ApiError::Refresh);
    assert!(auth.session().is_none());
    assert_eq!(token_store(&temp).load().expect("load"), None);
}

#[tokio::test]
async fn registration_succeeds_only_on_201() {
    let fields = RegisterFields {
        username: "ada".into(),
        email: Some("ada@example.com".into()),
        password: "hunter22".into(),
        password2: "hunter22".into(),
    };

    let temp = TempDir::new().expect("tempdir");
    let transport = ScriptedTransport::new(vec![json_response(
        201,
        serde_json::json!({"id": 1, "username": "ada", "email": "ada@example.com"}),
    )]);
    let auth = manager(&temp, transport);
    assert!(auth.register(&fields).await.expect("register"));
    assert!(auth.session().is_none(), "registration never logs in");

    let temp = TempDir::new().expect("tempdir");
    let transport = ScriptedTransport::new(vec![json_response(
        400,
        serde_json::json!({"username": ["A user with that username already exists."]}),
    )]);
    let auth = manager(&temp, transport);
    assert!(!auth.register(&fields).await.expect("register"));

    // An exhausted script behaves like a network failure: also false.
    let temp = TempDir::new().expect("tempdir");
    let transport = ScriptedTransport::new(vec![]);
    let auth = manager(&temp, transport);
    assert!(!auth.register(&fields).await.expect("register"));
}

#[tokio::test]
async fn mismatched_passwords_block_registration_before_any_network_call() {
    let temp = TempDir::new().expect("tempdir");
    let transport = ScriptedTransport::new(vec![]);
    let auth = manager(&temp, transport.clone());

    let fields = RegisterFields {
        username: "ada".into(),
        email: None,
        password: "hunter22".into(),
        password2: "different".into(),
    };
    let err = auth.register(&fields).await.expect_err("must fail");
    assert_matches!(err, ApiError::Validation(_));
    assert!(transport.sent().is_empty());

    let fields = RegisterFields {
        username: "ada".into(),
        email: None,
        password: "short".into(),
        password2: "short".into(),
    };
    assert_matches!(
        auth.register(&fields).await,
        Err(ApiError::Validation(_))
    );
    assert!(transport.sent().is_empty());
}
