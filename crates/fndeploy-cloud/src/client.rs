use std::path::{Path, PathBuf};
use std::time::Duration;

use fndeploy_build::{ArchiveError, ArchiveOptions};
use fndeploy_core::{ClientSettings, CloudFunction, ResourceName, parent_from_name};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::auth::{DefaultTokenProvider, TokenProvider};
use crate::http::{HttpExecutor, Method, ReqwestExecutor};
use crate::mask::update_mask;
use crate::observer::DeployObserver;
use crate::operation::{Operation, UploadUrlResponse, operation_path};
use crate::poller::{PollError, PollPolicy, poll_operation};
use crate::rest::{ApiError, RestClient, default_user_agent};

/// Settings for a [`CloudFunctionsClient`], built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    /// Expands short function names and secret references.
    pub project_id: Option<String>,
    /// Expands short function names.
    pub location: Option<String>,
    pub user_agent: String,
    pub poll_interval: Duration,
    /// Zero polls until the operation finishes.
    pub deploy_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl ClientConfig {
    pub fn from_settings(
        settings: &ClientSettings,
        project_id: Option<String>,
        location: Option<String>,
    ) -> Self {
        Self {
            base_url: settings.base_url.trim_end_matches('/').to_owned(),
            project_id,
            location,
            user_agent: default_user_agent(),
            poll_interval: Duration::from_secs(settings.poll_interval_secs),
            deploy_timeout: Duration::from_secs(settings.deploy_timeout_secs),
            max_retries: settings.max_retries,
            retry_backoff: Duration::from_millis(settings.retry_backoff_ms),
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::from_timeout(self.poll_interval, self.deploy_timeout)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_settings(&ClientSettings::default(), None, None)
    }
}

/// Per-call options for [`CloudFunctionsClient::deploy_from_local_source`].
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    pub archive: ArchiveOptions,
    /// Where to write the zip; a fresh temp file when `None`.
    pub archive_path: Option<PathBuf>,
    /// Wall-clock limit for polling, on top of the configured attempt bound.
    pub deadline: Option<Instant>,
    pub cancel: CancellationToken,
}

/// Cloud Functions v1 client, parameterized over transport and credentials
/// for testability.
pub struct CloudFunctionsClient<
    H: HttpExecutor = ReqwestExecutor,
    A: TokenProvider = DefaultTokenProvider,
> {
    rest: RestClient<H, A>,
    config: ClientConfig,
}

impl CloudFunctionsClient<ReqwestExecutor, DefaultTokenProvider> {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_parts(ReqwestExecutor::new(), DefaultTokenProvider::new(), config)
    }
}

impl<H: HttpExecutor, A: TokenProvider> CloudFunctionsClient<H, A> {
    pub fn with_parts(http: H, auth: A, config: ClientConfig) -> Self {
        let rest = RestClient::new(http, auth)
            .with_user_agent(config.user_agent.clone())
            .with_retries(config.max_retries, config.retry_backoff);
        Self { rest, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Expand `name` with the configured project and location.
    pub fn resolve_name(&self, name: &str) -> fndeploy_core::Result<ResourceName> {
        ResourceName::resolve(
            name,
            self.config.project_id.as_deref(),
            self.config.location.as_deref(),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path)
    }

    // ── Reads ──

    /// Fetch a function, or `None` if it does not exist.
    pub async fn get(&self, name: &str) -> Result<Option<CloudFunction>, ApiError> {
        match self.rest.get(&self.url(name)).await {
            Ok(function) => Ok(Some(function)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Whether a function exists. The body is not decoded into
    /// [`CloudFunction`], so any successful response counts.
    pub async fn exists(&self, name: &str) -> Result<bool, ApiError> {
        match self.rest.get::<serde_json::Value>(&self.url(name)).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn get_operation(&self, name: &str) -> Result<Operation, ApiError> {
        self.rest.get(&self.url(&operation_path(name))).await
    }

    // ── Source upload ──

    /// Request a signed URL to upload source for functions under `parent`.
    pub async fn generate_upload_url(&self, parent: &str) -> Result<String, ApiError> {
        let url = self.url(&format!("{parent}/functions:generateUploadUrl"));
        let response: UploadUrlResponse = self
            .rest
            .request(Method::Post, &url, Some(&serde_json::json!({})))
            .await?;
        Ok(response.upload_url)
    }

    pub async fn upload_source(&self, upload_url: &str, archive: &Path) -> Result<(), ApiError> {
        self.rest.upload(upload_url, archive).await
    }

    // ── Create / Patch / Delete ──

    /// Create `function` and wait for the operation.
    pub async fn create(
        &self,
        function: &CloudFunction,
        policy: &PollPolicy,
        cancel: &CancellationToken,
        observer: &mut dyn DeployObserver,
    ) -> Result<CloudFunction, DeployError> {
        let name = self.canonical_name(&function.name)?;
        let parent =
            parent_from_name(name.as_str()).map_err(|e| DeployError::ResourceName { source: e })?;
        let wrap = |source| DeployError::Create {
            name: name.to_string(),
            source,
        };

        let body = CloudFunction {
            name: name.to_string(),
            ..function.clone()
        };
        tracing::info!(function = %name, "creating function");
        let op: Operation = self
            .rest
            .request(Method::Post, &self.url(&format!("{parent}/functions")), Some(&body))
            .await
            .map_err(|e| wrap(OperationError::Request { source: e }))?;

        let done = self
            .await_operation(&op, policy, cancel, observer)
            .await
            .map_err(wrap)?;
        finished_function(&done, "create").map_err(wrap)
    }

    /// Patch `function`, asserting every field present in the body, and wait
    /// for the operation.
    pub async fn patch(
        &self,
        function: &CloudFunction,
        policy: &PollPolicy,
        cancel: &CancellationToken,
        observer: &mut dyn DeployObserver,
    ) -> Result<CloudFunction, DeployError> {
        let name = self.canonical_name(&function.name)?;
        let wrap = |source| DeployError::Patch {
            name: name.to_string(),
            source,
        };

        let body = serde_json::to_value(CloudFunction {
            name: name.to_string(),
            ..function.clone()
        })
        .map_err(|e| {
            wrap(OperationError::Request {
                source: ApiError::Encode { source: e },
            })
        })?;
        let mask = update_mask(&body).join(",");
        tracing::info!(function = %name, update_mask = %mask, "patching function");

        let url = self.url(&format!("{name}?updateMask={mask}"));
        let op: Operation = self
            .rest
            .request(Method::Patch, &url, Some(&body))
            .await
            .map_err(|e| wrap(OperationError::Request { source: e }))?;

        let done = self
            .await_operation(&op, policy, cancel, observer)
            .await
            .map_err(wrap)?;
        finished_function(&done, "patch").map_err(wrap)
    }

    /// Delete a function and wait until the operation reports completion.
    pub async fn delete(
        &self,
        name: &str,
        policy: &PollPolicy,
        cancel: &CancellationToken,
        observer: &mut dyn DeployObserver,
    ) -> Result<(), DeployError> {
        let name = self.canonical_name(name)?;
        let wrap = |source| DeployError::Delete {
            name: name.to_string(),
            source,
        };

        tracing::info!(function = %name, "deleting function");
        let op: Operation = self
            .rest
            .delete(&self.url(name.as_str()))
            .await
            .map_err(|e| wrap(OperationError::Request { source: e }))?;

        self.await_operation(&op, policy, cancel, observer)
            .await
            .map_err(wrap)?;
        tracing::info!(function = %name, "function deleted");
        Ok(())
    }

    // ── Deploy ──

    /// Zip `source_dir`, upload it, then create or patch `function`.
    ///
    /// The temporary archive is removed once the upload attempt finishes,
    /// whether or not it succeeded. An archive that is already gone counts
    /// as removed.
    pub async fn deploy_from_local_source(
        &self,
        function: CloudFunction,
        source_dir: &Path,
        options: &DeployOptions,
        observer: &mut dyn DeployObserver,
    ) -> Result<CloudFunction, DeployError> {
        // 1. Archive
        let archive_path = options
            .archive_path
            .clone()
            .unwrap_or_else(fndeploy_build::temp_archive_path);
        observer.on_zip(source_dir, &archive_path);
        let summary = fndeploy_build::build_archive(
            source_dir,
            &archive_path,
            &options.archive,
            &mut |entry| observer.on_entry(entry),
        )
        .map_err(|e| DeployError::Archive { source: e })?;

        // 2-6. Upload, then clean up the local archive. An upload failure
        // takes precedence over a failed removal.
        let uploaded = self
            .upload_archive(&function.name, &summary.path, summary.bytes)
            .await;
        let removed = fndeploy_build::remove_archive(&summary.path);
        let (name, upload_url) = uploaded?;
        removed.map_err(|e| DeployError::Archive { source: e })?;
        let function = CloudFunction {
            name: name.to_string(),
            source_upload_url: Some(upload_url),
            ..function
        };

        // 7. Existence check
        let exists = self
            .exists(name.as_str())
            .await
            .map_err(|e| DeployError::Lookup {
                name: name.to_string(),
                source: e,
            })?;

        // 8-10. Create or patch, then poll
        let policy = self.config.poll_policy().with_deadline(options.deadline);
        if exists {
            tracing::info!(function = %name, "updating existing function");
            observer.on_existing();
            self.patch(&function, &policy, &options.cancel, observer)
                .await
        } else {
            tracing::info!(function = %name, "creating new function");
            observer.on_new();
            self.create(&function, &policy, &options.cancel, observer)
                .await
        }
    }

    async fn upload_archive(
        &self,
        name: &str,
        archive: &Path,
        bytes: u64,
    ) -> Result<(ResourceName, String), DeployError> {
        let name = self.canonical_name(name)?;
        let parent =
            parent_from_name(name.as_str()).map_err(|e| DeployError::ResourceName { source: e })?;

        let upload_url = self
            .generate_upload_url(&parent)
            .await
            .map_err(|e| DeployError::UploadPreparation { source: e })?;

        tracing::info!(bytes, "uploading function source");
        self.upload_source(&upload_url, archive)
            .await
            .map_err(|e| DeployError::Upload { source: e })?;

        Ok((name, upload_url))
    }

    // ── Helpers ──

    fn canonical_name(&self, name: &str) -> Result<ResourceName, DeployError> {
        self.resolve_name(name)
            .map_err(|e| DeployError::ResourceName { source: e })
    }

    async fn await_operation(
        &self,
        op: &Operation,
        policy: &PollPolicy,
        cancel: &CancellationToken,
        observer: &mut dyn DeployObserver,
    ) -> Result<Operation, OperationError> {
        tracing::debug!(operation = %op.name, "waiting for operation");
        let name = op.name.as_str();
        poll_operation(move || self.get_operation(name), policy, cancel, observer)
            .await
            .map_err(|e| OperationError::Poll { source: e })
    }
}

fn finished_function(op: &Operation, verb: &'static str) -> Result<CloudFunction, OperationError> {
    op.function()
        .map_err(|e| OperationError::Decode { source: e })?
        .ok_or(OperationError::MissingFunction { verb })
}

// ── Error types ──

#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error(transparent)]
    Request { source: ApiError },

    #[error(transparent)]
    Poll { source: PollError },

    #[error("failed to decode operation response")]
    Decode { source: serde_json::Error },

    #[error("{verb} operation result did not include function")]
    MissingFunction { verb: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("failed to create source archive")]
    Archive { source: ArchiveError },

    #[error("failed to resolve function name")]
    ResourceName { source: fndeploy_core::Error },

    #[error("failed to generate upload url")]
    UploadPreparation { source: ApiError },

    #[error("failed to upload source archive")]
    Upload { source: ApiError },

    #[error("failed to look up existing function {name}")]
    Lookup { name: String, source: ApiError },

    #[error("failed to create function {name}")]
    Create {
        name: String,
        source: OperationError,
    },

    #[error("failed to patch function {name}")]
    Patch {
        name: String,
        source: OperationError,
    },

    #[error("failed to delete function {name}")]
    Delete {
        name: String,
        source: OperationError,
    },
}
