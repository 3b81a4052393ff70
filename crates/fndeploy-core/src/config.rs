use serde::{Deserialize, Serialize};

/// Name of the optional configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "fndeploy.toml";

/// fndeploy.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FndeployConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub client: ClientSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// GCP project ID used to expand short function names
    pub project_id: Option<String>,
    /// GCP region (defaults to us-central1)
    #[serde(default = "default_region")]
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Cloud Functions REST endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Seconds between operation polls
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Overall deploy timeout in seconds; 0 polls until the operation finishes
    #[serde(default = "default_deploy_timeout_secs")]
    pub deploy_timeout_secs: u64,
    /// Retries for idempotent reads on transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Linear backoff step between read retries, in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            region: default_region(),
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            poll_interval_secs: default_poll_interval_secs(),
            deploy_timeout_secs: default_deploy_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl FndeployConfig {
    /// Load from fndeploy.toml in the given directory, or return defaults if not found.
    pub fn load(dir: &std::path::Path) -> crate::Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            tracing::debug!(path = %config_path.display(), "loading config");
            let content =
                std::fs::read_to_string(&config_path).map_err(|e| crate::Error::ConfigLoad {
                    path: config_path.clone(),
                    source: e,
                })?;
            toml::from_str(&content).map_err(|e| crate::Error::ConfigParse {
                path: config_path,
                source: e,
            })
        } else {
            Ok(Self::default())
        }
    }
}

fn default_region() -> String {
    "us-central1".to_owned()
}

fn default_base_url() -> String {
    "https://cloudfunctions.googleapis.com/v1".to_owned()
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_deploy_timeout_secs() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}
