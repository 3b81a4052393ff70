//! The gcloud CLI, used only to borrow an already authenticated account.

use std::process::Stdio;
use std::time::Duration;

/// Upper bound for a single gcloud invocation.
pub const DEFAULT_GCLOUD_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs gcloud and captures stdout. Tests substitute a mockall mock.
#[allow(async_fn_in_trait)]
pub trait GcloudExecutor: Send + Sync {
    async fn exec(&self, args: &[String]) -> Result<String, GcloudError>;
}

/// The `gcloud` binary found on `PATH` (or an explicit program).
#[derive(Debug, Clone)]
pub struct GcloudCli {
    program: String,
    timeout: Duration,
}

impl GcloudCli {
    pub fn new() -> Self {
        Self {
            program: "gcloud".to_owned(),
            timeout: DEFAULT_GCLOUD_TIMEOUT,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for GcloudCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GcloudExecutor for GcloudCli {
    async fn exec(&self, args: &[String]) -> Result<String, GcloudError> {
        tracing::debug!(program = %self.program, ?args, "running gcloud");

        let child = tokio::process::Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|e| GcloudError::TimedOut {
                secs: self.timeout.as_secs(),
                source: e,
            })?
            .map_err(|e| GcloudError::NotFound {
                program: self.program.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(GcloudError::CommandFailed {
                args: args.to_vec(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        String::from_utf8(output.stdout).map_err(|e| GcloudError::InvalidUtf8 { source: e })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GcloudError {
    #[error("failed to run '{program}': is the Google Cloud SDK installed?")]
    NotFound {
        program: String,
        source: std::io::Error,
    },

    #[error("gcloud {} failed: {stderr}", args.join(" "))]
    CommandFailed { args: Vec<String>, stderr: String },

    #[error("gcloud did not finish within {secs}s")]
    TimedOut {
        secs: u64,
        source: tokio::time::error::Elapsed,
    },

    #[error("gcloud output was not valid UTF-8")]
    InvalidUtf8 { source: std::string::FromUtf8Error },
}
