//! Step outputs: appended to `$GITHUB_OUTPUT` inside Actions, printed otherwise.

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use fndeploy_core::CloudFunction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionOutputs {
    pub name: String,
    pub status: String,
    pub version: String,
    pub runtime: String,
    /// Only for HTTPS-triggered functions.
    pub url: Option<String>,
}

impl FunctionOutputs {
    pub fn from_function(function: &CloudFunction) -> Self {
        Self {
            name: function.name.clone(),
            status: function.status.as_deref().unwrap_or("").to_owned(),
            version: function.version_id.as_deref().unwrap_or("").to_owned(),
            runtime: function.runtime.clone(),
            url: function.https_url().map(str::to_owned),
        }
    }

    fn pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = vec![
            ("name", self.name.as_str()),
            ("status", self.status.as_str()),
            ("version", self.version.as_str()),
            ("runtime", self.runtime.as_str()),
        ];
        if let Some(url) = &self.url {
            pairs.push(("url", url.as_str()));
        }
        pairs
    }

    /// Write `key=value` lines.
    pub fn write_to(&self, out: &mut impl Write) -> std::io::Result<()> {
        for (key, value) in self.pairs() {
            writeln!(out, "{key}={value}")?;
        }
        Ok(())
    }
}

/// Publish outputs to the file named by `GITHUB_OUTPUT`, or stdout when unset.
pub fn write_outputs(outputs: &FunctionOutputs) -> anyhow::Result<()> {
    match std::env::var_os("GITHUB_OUTPUT").filter(|p| !p.is_empty()) {
        Some(path) => append_outputs(Path::new(&path), outputs),
        None => {
            outputs.write_to(&mut std::io::stdout().lock())?;
            Ok(())
        }
    }
}

fn append_outputs(path: &Path, outputs: &FunctionOutputs) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    outputs
        .write_to(&mut file)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::debug!(path = %path.display(), "wrote step outputs");
    Ok(())
}
