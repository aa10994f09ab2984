use thiserror::Error;

/// Failures surfaced by the API layer.
///
/// `Refresh` always means the stored token pair has been cleared and the user
/// has to authenticate again; everything else leaves the session untouched.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The token endpoint rejected the supplied credentials.
    #[error("invalid username or password")]
    Auth,

    /// The refresh token was rejected; the session has been cleared.
    #[error("session expired; run `mindspace login` to sign in again")]
    Refresh,

    /// Transport-level failure (connect, timeout, body read). Retryable.
    #[error("network error: {message}")]
    Network { message: String },

    /// Client-side validation failure. Blocks submission before any
    /// network call is made.
    #[error("{0}")]
    Validation(String),

    /// The API answered with a status the caller did not expect.
    #[error("unexpected response status {status}")]
    Status { status: u16, body: String },

    /// The access token payload could not be decoded.
    #[error("decoding access token: {0}")]
    Token(String),

    /// A response body could not be deserialized.
    #[error("decoding response body: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Network {
            message: err.to_string(),
        }
    }
}

impl ApiError {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        ApiError::Status {
            status,
            body: body.into(),
        }
    }

    /// Whether the error is worth retrying later (transient transport issue).
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Network { .. })
    }
}
