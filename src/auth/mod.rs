use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::api::{Transport, TransportRequest};
use crate::error::ApiError;

pub mod claims;
pub mod scheduler;
pub mod token_store;

pub use claims::Claims;
pub use token_store::{TokenPair, TokenStore};

const MIN_PASSWORD_LEN: usize = 6;

/// Identity derived from the access token. Never stored; recomputed whenever
/// the token pair changes and dropped on logout.
#[derive(Debug, Clone)]
pub struct Session {
    claims: Claims,
}

impl Session {
    fn from_access(access: &str) -> Result<Self, ApiError> {
        Ok(Self {
            claims: Claims::decode(access)?,
        })
    }

    pub fn user_id(&self) -> i64 {
        self.claims.user_id
    }

    pub fn username(&self) -> Option<&str> {
        self.claims.username.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.claims.email.as_deref()
    }

    pub fn expires_at(&self) -> OffsetDateTime {
        self.claims.expires_at()
    }
}

/// Registration payload for `POST /register/`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterFields {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub password: String,
    pub password2: String,
}

impl RegisterFields {
    /// Client-side checks that block submission before any network call.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.username.trim().is_empty() {
            return Err(ApiError::Validation("username cannot be empty".into()));
        }
        if self.password != self.password2 {
            return Err(ApiError::Validation("passwords do not match".into()));
        }
        if self.password.len() < MIN_PASSWORD_LEN {
            return Err(ApiError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
}

#[derive(Default)]
struct SessionState {
    tokens: Option<TokenPair>,
    session: Option<Session>,
}

/// Owns the login/logout/refresh lifecycle and the persisted token pair.
///
/// Shared via `Arc` between the request pipeline (401 recovery) and the
/// proactive refresh scheduler; both may race, last write wins.
pub struct SessionManager {
    transport: Arc<dyn Transport>,
    store: TokenStore,
    state: RwLock<SessionState>,
}

impl SessionManager {
    /// Restores any persisted session from the token store. A missing or
    /// undecodable pair starts the manager logged out.
    pub fn new(transport: Arc<dyn Transport>, store: TokenStore) -> Self {
        let mut state = SessionState::default();
        match store.load() {
            Ok(Some(pair)) => match Session::from_access(&pair.access) {
                Ok(session) => {
                    state.tokens = Some(pair);
                    state.session = Some(session);
                }
                Err(err) => {
                    tracing::warn!(%err, "stored access token is undecodable, discarding");
                    if let Err(err) = store.clear() {
                        tracing::warn!(%err, "failed to clear token store");
                    }
                }
            },
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(%err, "failed to read token store, starting logged out");
            }
        }
        Self {
            transport,
            store,
            state: RwLock::new(state),
        }
    }

    pub fn session(&self) -> Option<Session> {
        self.state.read().session.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.state
            .read()
            .tokens
            .as_ref()
            .map(|pair| pair.access.clone())
    }

    fn refresh_token(&self) -> Option<String> {
        self.state
            .read()
            .tokens
            .as_ref()
            .map(|pair| pair.refresh.clone())
    }

    /// Exchanges credentials for a token pair. On any non-success status the
    /// current state is left untouched.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, ApiError> {
        let request = TransportRequest::new(Method::POST, "token/").json(serde_json::json!({
            "username": username,
            "password": password,
        }));
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            if response.status >= 400 && response.status < 500 {
                return Err(ApiError::Auth);
            }
            return Err(ApiError::status(response.status, response.body_text()));
        }

        let pair: TokenPair = response.json()?;
        let session = Session::from_access(&pair.access)?;
        self.install(pair, session.clone());
        tracing::info!(username, "logged in");
        Ok(session)
    }

    /// Clears the token pair and session unconditionally. Idempotent.
    pub fn logout(&self) {
        let mut state = self.state.write();
        state.tokens = None;
        state.session = None;
        drop(state);
        if let Err(err) = self.store.clear() {
            tracing::warn!(%err, "failed to clear token store");
        }
    }

    /// Silently mints a new access token using the stored refresh token.
    ///
    /// On success only the access token is replaced; the refresh token is kept
    /// as-is. Any failure, including transport errors, forces a logout.
    pub async fn refresh(&self) -> bool {
        let Some(refresh) = self.refresh_token() else {
            tracing::debug!("refresh requested without a refresh token");
            self.logout();
            return false;
        };

        let request = TransportRequest::new(Method::POST, "token/refresh/")
            .json(serde_json::json!({ "refresh": refresh }));
        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(%err, "token refresh failed, logging out");
                self.logout();
                return false;
            }
        };
        if !response.is_success() {
            tracing::warn!(status = response.status, "refresh token rejected, logging out");
            self.logout();
            return false;
        }

        let access = match response.json::<RefreshResponse>() {
            Ok(body) => body.access,
            Err(err) => {
                tracing::warn!(%err, "unreadable refresh response, logging out");
                self.logout();
                return false;
            }
        };
        let session = match Session::from_access(&access) {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(%err, "refreshed access token is undecodable, logging out");
                self.logout();
                return false;
            }
        };

        self.install(TokenPair { access, refresh }, session);
        tracing::debug!("access token refreshed");
        true
    }

    /// Creates an account. True only for a `201 Created` response; any other
    /// status or a transport failure yields false. Never logs the user in.
    pub async fn register(&self, fields: &RegisterFields) -> Result<bool, ApiError> {
        fields.validate()?;
        let request = TransportRequest::new(Method::POST, "register/").json(
            serde_json::to_value(fields).map_err(|err| ApiError::Decode(err.to_string()))?,
        );
        match self.transport.send(request).await {
            Ok(response) if response.status == 201 => Ok(true),
            Ok(response) => {
                tracing::warn!(
                    status = response.status,
                    body = %response.body_text(),
                    "registration rejected"
                );
                Ok(false)
            }
            Err(err) => {
                tracing::warn!(%err, "registration request failed");
                Ok(false)
            }
        }
    }

    fn install(&self, pair: TokenPair, session: Session) {
        if let Err(err) = self.store.save(&pair) {
            tracing::warn!(%err, "failed to persist token pair");
        }
        let mut state = self.state.write();
        state.tokens = Some(pair);
        state.session = Some(session);
    }
}
