//! Access-token acquisition.
//!
//! The client never sends an unauthenticated API call; a provider that has
//! no credentials returns `Ok(None)` and the request fails up front.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::adc::AdcFileProvider;
use crate::gcloud::{GcloudCli, GcloudError, GcloudExecutor};
use crate::http::{HttpError, HttpExecutor, ReqwestExecutor};

/// Environment variables holding a ready-made OAuth2 access token, in lookup order.
pub const TOKEN_ENV_VARS: [&str; 2] = ["CLOUDSDK_AUTH_ACCESS_TOKEN", "GOOGLE_OAUTH_ACCESS_TOKEN"];

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const METADATA_TIMEOUT: Duration = Duration::from_secs(3);

/// Source of OAuth2 bearer tokens.
#[allow(async_fn_in_trait)]
pub trait TokenProvider: Send + Sync {
    /// A bearer token, or `None` when this provider has no credentials.
    async fn access_token(&self) -> Result<Option<String>, AuthError>;
}

// ── Static ──

/// A fixed token, typically exported by an earlier auth step.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// Read the first non-empty variable of [`TOKEN_ENV_VARS`].
    pub fn from_env() -> Self {
        let token = TOKEN_ENV_VARS.iter().find_map(|name| {
            std::env::var(name)
                // arch-lint: allow(no-silent-result-drop) reason="an unset token variable means this provider has no credentials"
                .ok()
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        });
        Self { token }
    }
}

impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<Option<String>, AuthError> {
        Ok(self.token.clone())
    }
}

// ── gcloud ──

/// Borrows the active gcloud account via `gcloud auth print-access-token`.
///
/// Covers service-account keys and workload identity federation once the
/// credentials are activated in gcloud.
pub struct GcloudTokenProvider<E: GcloudExecutor = GcloudCli> {
    executor: E,
}

impl GcloudTokenProvider<GcloudCli> {
    pub fn new() -> Self {
        Self {
            executor: GcloudCli::new(),
        }
    }
}

impl Default for GcloudTokenProvider<GcloudCli> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: GcloudExecutor> GcloudTokenProvider<E> {
    pub fn with_executor(executor: E) -> Self {
        Self { executor }
    }
}

impl<E: GcloudExecutor> TokenProvider for GcloudTokenProvider<E> {
    async fn access_token(&self) -> Result<Option<String>, AuthError> {
        let args = ["auth", "print-access-token", "--quiet"]
            .iter()
            .map(|s| (*s).to_owned())
            .collect::<Vec<_>>();

        let output = self
            .executor
            .exec(&args)
            .await
            .map_err(|e| AuthError::Gcloud { source: e })?;

        let token = output.trim();
        if token.is_empty() {
            Ok(None)
        } else {
            Ok(Some(token.to_owned()))
        }
    }
}

// ── Metadata server ──

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
}

/// The GCE / GKE / Cloud Run metadata server (workload identity on GCP).
#[derive(Debug, Clone)]
pub struct MetadataTokenProvider {
    client: reqwest::Client,
    url: String,
}

impl MetadataTokenProvider {
    pub fn new() -> Self {
        Self::with_url(METADATA_TOKEN_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

impl Default for MetadataTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenProvider for MetadataTokenProvider {
    async fn access_token(&self) -> Result<Option<String>, AuthError> {
        let response = match self
            .client
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .timeout(METADATA_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(error = %e, "metadata server unreachable");
                return Ok(None);
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Metadata {
                detail: format!("status {status}"),
            });
        }

        let token: MetadataToken = response.json().await.map_err(|e| AuthError::Metadata {
            detail: e.to_string(),
        })?;
        tracing::info!("retrieved access token from metadata server");
        Ok(Some(token.access_token))
    }
}

// ── Default chain ──

/// Environment token, then the credentials file, then gcloud, then the
/// metadata server.
///
/// The first token found is cached for the lifetime of the provider.
pub struct DefaultTokenProvider<E: GcloudExecutor = GcloudCli, H: HttpExecutor = ReqwestExecutor> {
    env: StaticTokenProvider,
    adc: AdcFileProvider<H>,
    gcloud: GcloudTokenProvider<E>,
    metadata: MetadataTokenProvider,
    cached: OnceCell<Option<String>>,
}

impl DefaultTokenProvider<GcloudCli, ReqwestExecutor> {
    pub fn new() -> Self {
        Self::with_parts(
            StaticTokenProvider::from_env(),
            AdcFileProvider::from_env(),
            GcloudTokenProvider::new(),
            MetadataTokenProvider::new(),
        )
    }
}

impl Default for DefaultTokenProvider<GcloudCli, ReqwestExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: GcloudExecutor, H: HttpExecutor> DefaultTokenProvider<E, H> {
    pub fn with_parts(
        env: StaticTokenProvider,
        adc: AdcFileProvider<H>,
        gcloud: GcloudTokenProvider<E>,
        metadata: MetadataTokenProvider,
    ) -> Self {
        Self {
            env,
            adc,
            gcloud,
            metadata,
            cached: OnceCell::new(),
        }
    }

    async fn resolve(&self) -> Result<Option<String>, AuthError> {
        if let Some(token) = self.env.access_token().await? {
            tracing::debug!("using access token from environment");
            return Ok(Some(token));
        }

        // A configured credentials file is authoritative; its errors propagate.
        if let Some(token) = self.adc.access_token().await? {
            tracing::debug!("using application default credentials file");
            return Ok(Some(token));
        }

        match self.gcloud.access_token().await {
            Ok(Some(token)) => {
                tracing::debug!("using access token from gcloud");
                return Ok(Some(token));
            }
            Ok(None) => {}
            Err(e) => tracing::debug!(error = %e, "gcloud credentials unavailable"),
        }

        self.metadata.access_token().await
    }
}

impl<E: GcloudExecutor, H: HttpExecutor> TokenProvider for DefaultTokenProvider<E, H> {
    async fn access_token(&self) -> Result<Option<String>, AuthError> {
        let token = self.cached.get_or_try_init(|| self.resolve()).await?;
        Ok(token.clone())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("failed to get access token from gcloud")]
    Gcloud { source: GcloudError },

    #[error("failed to get access token from metadata server: {detail}")]
    Metadata { detail: String },

    // ── Credentials file ──
    #[error("failed to read credentials file {path}")]
    ReadCredentials {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse credentials file {path}")]
    ParseCredentials {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to sign service account JWT")]
    SignJwt { source: jsonwebtoken::errors::Error },

    #[error("failed to get subject token: {detail}")]
    SubjectToken { detail: String },

    #[error(transparent)]
    TokenRequest { source: HttpError },

    #[error("token request to {url} failed with status {status}: {body}")]
    TokenEndpoint {
        url: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode token response from {url}")]
    TokenResponse {
        url: String,
        source: serde_json::Error,
    },

    #[error("system clock is before the Unix epoch")]
    Clock { source: std::time::SystemTimeError },
}
