use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use url::Url;

use crate::auth::SessionManager;
use crate::config::ApiOptions;
use crate::error::ApiError;

pub mod notes;

/// One outgoing API call, path relative to the configured base URL.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub bearer: Option<String>,
}

impl TransportRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            bearer: None,
        }
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token;
        self
    }
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body).map_err(|err| ApiError::Decode(err.to_string()))
    }
}

/// Seam between the request pipeline and the wire. Production uses
/// [`HttpTransport`]; tests substitute scripted fakes.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, ApiError>;
}

/// `reqwest`-backed transport bound to the configured API root.
pub struct HttpTransport {
    client: reqwest::Client,
    base: Url,
}

impl HttpTransport {
    pub fn new(options: &ApiOptions) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout())
            .build()?;
        Ok(Self {
            client,
            base: options.base_url()?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, ApiError> {
        let url = self.base.join(&request.path).map_err(|err| ApiError::Network {
            message: format!("joining url {}: {err}", request.path),
        })?;
        let mut builder = self.client.request(request.method.clone(), url);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(TransportResponse { status, body })
    }
}

/// Authenticated request pipeline.
///
/// Attaches the current access token as a bearer credential and recovers from
/// a single 401 per logical request: refresh, re-attach, resend once. The
/// attempt counter is explicit, so a 401 on the resent request propagates
/// instead of looping.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    auth: Arc<SessionManager>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, auth: Arc<SessionManager>) -> Self {
        Self { transport, auth }
    }

    pub fn auth(&self) -> &Arc<SessionManager> {
        &self.auth
    }

    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<TransportResponse, ApiError> {
        let mut attempt: u8 = 0;
        loop {
            let mut request =
                TransportRequest::new(method.clone(), path).bearer(self.auth.access_token());
            if let Some(body) = &body {
                request = request.json(body.clone());
            }
            let response = self.transport.send(request).await?;
            if response.status == 401 && attempt == 0 {
                attempt += 1;
                tracing::debug!(path, "401 received, attempting silent refresh");
                if self.auth.refresh().await {
                    continue;
                }
                // The manager has already cleared the token pair.
                return Err(ApiError::Refresh);
            }
            return Ok(response);
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.execute(Method::GET, path, None).await?;
        Self::expect_success(response)?.json()
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, ApiError> {
        let response = self.execute(Method::POST, path, Some(body)).await?;
        Self::expect_success(response)?.json()
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, ApiError> {
        let response = self.execute(Method::PUT, path, Some(body)).await?;
        Self::expect_success(response)?.json()
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let response = self.execute(Method::DELETE, path, None).await?;
        Self::expect_success(response).map(|_| ())
    }

    fn expect_success(response: TransportResponse) -> Result<TransportResponse, ApiError> {
        if response.is_success() {
            Ok(response)
        } else {
            Err(ApiError::status(response.status, response.body_text()))
        }
    }
}
