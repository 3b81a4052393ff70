//! Secret Manager references for secret-backed environment variables and volumes.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::function::{SecretEnvVar, SecretVersionPath, SecretVolume};

const VERSION: &str = r"(latest|[1-9][0-9]*)";

static SHORT_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^([^/:]+):{VERSION}$")).expect("short secret pattern is a valid regex")
});

static FULL_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^projects/([^/]+)/secrets/([^/:]+)/versions/{VERSION}$"))
        .expect("full secret pattern is a valid regex")
});

static COLON_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^projects/([^/]+)/secrets/([^/:]+):{VERSION}$"))
        .expect("colon secret pattern is a valid regex")
});

static UNVERSIONED_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^projects/([^/]+)/secrets/([^/:]+)$")
        .expect("unversioned secret pattern is a valid regex")
});

static REPEATED_SLASHES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/+").expect("slash pattern is a valid regex"));

/// A pointer to a versioned secret.
///
/// `version` is always `"latest"` or a positive integer string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretReference {
    /// `None` for the `SECRET:VERSION` shorthand; the caller supplies a default.
    pub project: Option<String>,
    pub secret: String,
    pub version: String,
}

impl SecretReference {
    /// Parse a reference, trying each accepted grammar in order.
    ///
    /// 1. `SECRET:VERSION`
    /// 2. `projects/PROJECT/secrets/SECRET/versions/VERSION`
    /// 3. `projects/PROJECT/secrets/SECRET:VERSION`
    /// 4. `projects/PROJECT/secrets/SECRET` (version `latest`)
    ///
    /// # Examples
    ///
    /// ```
    /// use fndeploy_core::SecretReference;
    ///
    /// let r = SecretReference::parse("projects/p/secrets/db-pass/versions/2").unwrap();
    /// assert_eq!(r.project.as_deref(), Some("p"));
    /// assert_eq!(r.secret, "db-pass");
    /// assert_eq!(r.version, "2");
    /// ```
    pub fn parse(input: &str) -> crate::Result<Self> {
        let s = input.trim();
        if s.is_empty() {
            return Err(crate::Error::MissingSecretName);
        }

        if let Some(c) = SHORT_REF.captures(s) {
            return Ok(Self {
                project: None,
                secret: c[1].to_owned(),
                version: c[2].to_owned(),
            });
        }

        for pattern in [&*FULL_REF, &*COLON_REF] {
            if let Some(c) = pattern.captures(s) {
                return Ok(Self {
                    project: Some(c[1].to_owned()),
                    secret: c[2].to_owned(),
                    version: c[3].to_owned(),
                });
            }
        }

        if let Some(c) = UNVERSIONED_REF.captures(s) {
            return Ok(Self {
                project: Some(c[1].to_owned()),
                secret: c[2].to_owned(),
                version: "latest".to_owned(),
            });
        }

        Err(crate::Error::InvalidSecretReference(s.to_owned()))
    }

    /// Fill in the project from `default_project` when the reference has none.
    pub fn with_default_project(mut self, default_project: Option<&str>) -> crate::Result<Self> {
        if self.project.is_none() {
            let project = default_project
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .ok_or_else(|| crate::Error::SecretProjectRequired(self.secret.clone()))?;
            self.project = Some(project.to_owned());
        }
        Ok(self)
    }

    /// `projects/P/secrets/S/versions/V`, or `secrets/S/versions/V` without a project.
    pub fn self_link(&self) -> String {
        match &self.project {
            Some(project) => format!(
                "projects/{project}/secrets/{}/versions/{}",
                self.secret, self.version
            ),
            None => format!("secrets/{}/versions/{}", self.secret, self.version),
        }
    }

    fn project_or_empty(&self) -> String {
        self.project.clone().unwrap_or_else(String::new)
    }
}

/// Split a secret mount path into `(mount_path, secret_path)`.
///
/// The split happens at a literal `:` if present, otherwise at the final `/`.
/// Runs of slashes collapse to one and the leaf always starts with `/`.
///
/// ```
/// use fndeploy_core::secret::split_mount_path;
///
/// assert_eq!(
///     split_mount_path("/etc//secrets/api-key").unwrap(),
///     ("/etc/secrets".to_owned(), "/api-key".to_owned()),
/// );
/// assert_eq!(
///     split_mount_path("/etc/secrets:/nested/key").unwrap(),
///     ("/etc/secrets".to_owned(), "/nested/key".to_owned()),
/// );
/// ```
pub fn split_mount_path(input: &str) -> crate::Result<(String, String)> {
    let canonical = REPEATED_SLASHES.replace_all(input.trim(), "/").into_owned();

    let (dir, leaf) = match canonical.split_once(':') {
        Some((dir, leaf)) => (dir.to_owned(), leaf.to_owned()),
        None => match canonical.rsplit_once('/') {
            Some((dir, leaf)) => (dir.to_owned(), leaf.to_owned()),
            None => return Err(crate::Error::InvalidMountPath(input.to_owned())),
        },
    };

    let dir = dir.trim_end_matches('/');
    let leaf = leaf.trim_start_matches('/');
    if dir.is_empty() || leaf.is_empty() {
        return Err(crate::Error::InvalidMountPath(input.to_owned()));
    }

    Ok((dir.to_owned(), format!("/{leaf}")))
}

/// Build secret-backed environment variables from `KEY=REFERENCE` pairs.
pub fn secret_env_vars(
    pairs: &BTreeMap<String, String>,
    default_project: Option<&str>,
) -> crate::Result<Vec<SecretEnvVar>> {
    pairs
        .iter()
        .map(|(key, value)| {
            let reference = SecretReference::parse(value)?.with_default_project(default_project)?;
            Ok(SecretEnvVar {
                key: key.clone(),
                project_id: reference.project_or_empty(),
                secret: reference.secret,
                version: reference.version,
            })
        })
        .collect()
}

/// Build secret volumes from `MOUNT_PATH=REFERENCE` pairs.
pub fn secret_volumes(
    pairs: &BTreeMap<String, String>,
    default_project: Option<&str>,
) -> crate::Result<Vec<SecretVolume>> {
    pairs
        .iter()
        .map(|(path, value)| {
            let (mount_path, secret_path) = split_mount_path(path)?;
            let reference = SecretReference::parse(value)?.with_default_project(default_project)?;
            Ok(SecretVolume {
                mount_path,
                project_id: reference.project_or_empty(),
                secret: reference.secret.clone(),
                versions: vec![SecretVersionPath {
                    path: secret_path,
                    version: reference.version,
                }],
            })
        })
        .collect()
}
