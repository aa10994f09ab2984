use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use time::OffsetDateTime;

use crate::error::ApiError;

/// Claims carried in the access token payload.
///
/// Decoded client-side for identity display only; the signature is never
/// verified here, the backend does that on every request.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Expiry as a unix timestamp.
    pub exp: i64,
}

impl Claims {
    /// Decodes the payload segment of a JWT without verifying the signature.
    pub fn decode(access: &str) -> Result<Self, ApiError> {
        let mut segments = access.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(ApiError::Token("expected three dot-separated segments".into()));
        };
        let raw = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|err| ApiError::Token(format!("payload is not base64url: {err}")))?;
        serde_json::from_slice(&raw)
            .map_err(|err| ApiError::Token(format!("payload is not valid claims json: {err}")))
    }

    pub fn expires_at(&self) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(self.exp).unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at() <= OffsetDateTime::now_utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn fake_token(payload: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());
        format!("{header}.{body}.signature")
    }

    #[test]
    fn decodes_simplejwt_style_payload() {
        let token = fake_token(serde_json::json!({
            "token_type": "access",
            "exp": 4_102_444_800_i64,
            "iat": 1_700_000_000,
            "jti": "abc123",
            "user_id": 7,
            "username": "ada",
            "email": "ada@example.com",
        }));
        let claims = Claims::decode(&token).expect("decode");
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.username.as_deref(), Some("ada"));
        assert_eq!(claims.email.as_deref(), Some("ada@example.com"));
        assert!(!claims.is_expired());
    }

    #[test]
    fn username_and_email_are_optional() {
        let token = fake_token(serde_json::json!({"user_id": 1, "exp": 0}));
        let claims = Claims::decode(&token).expect("decode");
        assert_eq!(claims.username, None);
        assert!(claims.is_expired());
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert_matches!(Claims::decode("not-a-jwt"), Err(ApiError::Token(_)));
        assert_matches!(Claims::decode("a.b"), Err(ApiError::Token(_)));
        assert_matches!(
            Claims::decode("a.!!!not-base64!!!.c"),
            Err(ApiError::Token(_))
        );
    }
}
