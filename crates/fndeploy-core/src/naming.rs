//! Canonical Cloud Functions resource names.
//!
//! A function is addressed as `projects/{project}/locations/{location}/functions/{name}`.
//! Short names are expanded with the client's default project and location;
//! names that already contain a `/` are validated and passed through untouched.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static RESOURCE_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^projects/.+/locations/.+/functions/.+$")
        .expect("resource name pattern is a valid regex")
});

/// A validated, fully-qualified function resource name.
///
/// # Examples
///
/// ```
/// use fndeploy_core::ResourceName;
///
/// let name = ResourceName::resolve("hello", Some("my-project"), Some("us-central1")).unwrap();
/// assert_eq!(name.as_str(), "projects/my-project/locations/us-central1/functions/hello");
/// assert_eq!(name.parent(), "projects/my-project/locations/us-central1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceName(String);

impl ResourceName {
    /// Resolve a short or fully-qualified name.
    ///
    /// A canonical input is never re-derived from the defaults, even when
    /// both defaults are present.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyName`](crate::Error::EmptyName) for empty or whitespace input
    /// - [`Error::InvalidResourceName`](crate::Error::InvalidResourceName) if the
    ///   input contains `/` but is not canonical
    /// - [`Error::MissingProjectId`](crate::Error::MissingProjectId) /
    ///   [`Error::MissingLocation`](crate::Error::MissingLocation) when a short
    ///   name cannot be expanded
    pub fn resolve(
        input: &str,
        default_project: Option<&str>,
        default_location: Option<&str>,
    ) -> crate::Result<Self> {
        let name = input.trim();
        if name.is_empty() {
            return Err(crate::Error::EmptyName);
        }

        if name.contains('/') {
            if RESOURCE_NAME_PATTERN.is_match(name) {
                return Ok(Self(name.to_owned()));
            }
            return Err(crate::Error::InvalidResourceName(name.to_owned()));
        }

        let project = non_empty(default_project).ok_or(crate::Error::MissingProjectId)?;
        let location = non_empty(default_location).ok_or(crate::Error::MissingLocation)?;

        Ok(Self(format!(
            "projects/{project}/locations/{location}/functions/{name}"
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The collection path, e.g. `projects/p/locations/l`.
    pub fn parent(&self) -> String {
        // A validated name always has at least the six canonical segments.
        let segments: Vec<&str> = self.0.split('/').collect();
        segments[..segments.len() - 2].join("/")
    }

    /// The project segment of the name.
    pub fn project(&self) -> &str {
        self.0
            .strip_prefix("projects/")
            .and_then(|rest| rest.split_once("/locations/"))
            .map(|(project, _)| project)
            .unwrap_or("")
    }

    /// The trailing function identifier.
    pub fn function_id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Expand `input` into a canonical resource name string.
pub fn full_resource_name(
    input: &str,
    default_project: Option<&str>,
    default_location: Option<&str>,
) -> crate::Result<String> {
    ResourceName::resolve(input, default_project, default_location).map(|n| n.0)
}

/// Strip the last two segments of a resource name.
///
/// `projects/p/locations/l/functions/f` becomes `projects/p/locations/l`.
pub fn parent_from_name(name: &str) -> crate::Result<String> {
    let segments: Vec<&str> = name.split('/').collect();
    if segments.len() < 3 {
        return Err(crate::Error::InvalidOrMissingName(name.to_owned()));
    }
    Ok(segments[..segments.len() - 2].join("/"))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
