use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::auth::{AuthError, TokenProvider};
use crate::http::{HttpError, HttpExecutor, HttpRequest, HttpResponse, Method};

/// Upper bound accepted by signed upload URLs (100 MiB).
pub const UPLOAD_CONTENT_LENGTH_RANGE: &str = "0,104857600";

/// Product identifier sent with every request.
pub fn default_user_agent() -> String {
    format!("fndeploy/{}", env!("CARGO_PKG_VERSION"))
}

/// Authenticated JSON transport with bounded retries for reads.
pub struct RestClient<H: HttpExecutor, A: TokenProvider> {
    http: H,
    auth: A,
    user_agent: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl<H: HttpExecutor, A: TokenProvider> RestClient<H, A> {
    pub fn new(http: H, auth: A) -> Self {
        Self {
            http,
            auth,
            user_agent: default_user_agent(),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }

    /// Send an authenticated JSON request and decode the JSON response.
    ///
    /// An empty success body decodes as `{}`.
    pub async fn request<T, B>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let token = self
            .auth
            .access_token()
            .await
            .map_err(|e| ApiError::Auth { source: e })?
            .ok_or(ApiError::MissingToken)?;

        let mut request = HttpRequest::new(method, url)
            .header("authorization", format!("Bearer {token}"))
            .header("accept", "application/json")
            .header("user-agent", self.user_agent.as_str());
        if let Some(body) = body {
            let bytes = serde_json::to_vec(body).map_err(|e| ApiError::Encode { source: e })?;
            request = request
                .header("content-type", "application/json")
                .body(bytes);
        }

        let response = self.send(request).await?;
        let text = if response.body.trim().is_empty() {
            "{}"
        } else {
            response.body.as_str()
        };
        serde_json::from_str(text).map_err(|e| ApiError::Decode {
            method,
            url: url.to_owned(),
            source: e,
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        self.request(Method::Get, url, None::<&()>).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        self.request(Method::Delete, url, None::<&()>).await
    }

    /// PUT a zip file to a signed upload URL, streaming it from disk. No
    /// bearer token is sent.
    pub async fn upload(&self, url: &str, archive: &Path) -> Result<(), ApiError> {
        let request = HttpRequest::new(Method::Put, url)
            .header("content-type", "application/zip")
            .header("x-goog-content-length-range", UPLOAD_CONTENT_LENGTH_RANGE)
            .header("user-agent", self.user_agent.as_str())
            .body_file(archive);

        self.send(request).await?;
        Ok(())
    }

    /// Execute, retrying transient failures of idempotent reads.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let retries = if request.method.is_idempotent_read() {
            self.max_retries
        } else {
            0
        };

        let mut attempt = 0;
        loop {
            tracing::debug!(method = %request.method, url = %request.url, attempt, "http request");
            let result = self.http.execute(request.clone()).await;

            let retryable = result
                .as_ref()
                .map_or(true, |response| is_transient_status(response.status));
            if retryable && attempt < retries {
                attempt += 1;
                let delay = self.retry_backoff * attempt;
                match &result {
                    Ok(response) => tracing::warn!(
                        method = %request.method,
                        url = %request.url,
                        status = response.status,
                        attempt,
                        "transient response, retrying in {delay:?}"
                    ),
                    Err(e) => tracing::warn!(
                        method = %request.method,
                        url = %request.url,
                        error = %e,
                        attempt,
                        "request failed, retrying in {delay:?}"
                    ),
                }
                tokio::time::sleep(delay).await;
                continue;
            }

            let response = result.map_err(|e| ApiError::Transport { source: e })?;
            if !response.is_success() {
                return Err(ApiError::Status {
                    method: request.method,
                    url: request.url,
                    status: response.status,
                    body: response.body,
                });
            }
            return Ok(response);
        }
    }
}

fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("failed to get auth token")]
    Auth { source: AuthError },

    #[error("failed to get auth token: no credentials found")]
    MissingToken,

    #[error(transparent)]
    Transport { source: HttpError },

    #[error("{method} {url} failed with status {status}: {body}")]
    Status {
        method: Method,
        url: String,
        status: u16,
        body: String,
    },

    #[error("failed to encode request body")]
    Encode { source: serde_json::Error },

    #[error("failed to decode response from {method} {url}")]
    Decode {
        method: Method,
        url: String,
        source: serde_json::Error,
    },
}

impl ApiError {
    /// The resource does not exist (HTTP 404 or a `NOT_FOUND` status body).
    pub fn is_not_found(&self) -> bool {
        match self {
            ApiError::Status { status, body, .. } => *status == 404 || body.contains("NOT_FOUND"),
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
