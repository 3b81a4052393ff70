mod delete;
mod deploy;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use fndeploy_build::ArchiveEntry;
use fndeploy_cloud::DeployObserver;

pub use delete::{DeleteArgs, delete};
pub use deploy::{DeployArgs, deploy};

/// Reports deploy progress through tracing.
pub(crate) struct LogObserver;

impl DeployObserver for LogObserver {
    fn on_zip(&mut self, source_dir: &Path, archive: &Path) {
        tracing::info!(
            source = %source_dir.display(),
            archive = %archive.display(),
            "creating zip of function source"
        );
    }

    fn on_entry(&mut self, entry: ArchiveEntry<'_>) {
        match entry {
            ArchiveEntry::Included(path) => tracing::debug!(path, "zip: added"),
            ArchiveEntry::Excluded(path) => tracing::debug!(path, "zip: ignored"),
        }
    }

    fn on_poll(&mut self, attempt: u32) {
        tracing::debug!(attempt, "checking operation status");
    }

    fn on_new(&mut self) {
        tracing::info!("function does not exist yet, creating");
    }

    fn on_existing(&mut self) {
        tracing::info!("function exists, updating");
    }
}

/// Parse an optional numeric input; blank means unset.
pub(crate) fn parse_number<T>(name: &str, value: Option<&str>) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    value
        .parse()
        .map(Some)
        .map_err(|e| anyhow::anyhow!("invalid {name} '{value}': {e}"))
}

/// Parse an optional `true`/`false` input; blank means false.
pub(crate) fn parse_bool(name: &str, value: Option<&str>) -> anyhow::Result<bool> {
    match value.map(str::trim).unwrap_or("") {
        "" => Ok(false),
        v if v.eq_ignore_ascii_case("true") => Ok(true),
        v if v.eq_ignore_ascii_case("false") => Ok(false),
        v => anyhow::bail!("invalid {name} '{v}': expected true or false"),
    }
}

pub(crate) fn non_blank_path(path: Option<&Path>) -> Option<PathBuf> {
    path.filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}
