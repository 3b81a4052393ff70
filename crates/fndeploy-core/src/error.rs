use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    // ── Resource naming ──
    #[error("failed to parse resource name: name cannot be empty")]
    EmptyName,

    #[error("invalid resource name '{0}' (expected 'projects/p/locations/l/functions/f')")]
    InvalidResourceName(String),

    #[error("failed to get project ID to build resource name; set `project_id`")]
    MissingProjectId,

    #[error("failed to get location (region) to build resource name; set `region`")]
    MissingLocation,

    #[error("invalid or missing name '{0}' (expected 'projects/p/locations/l/functions/f')")]
    InvalidOrMissingName(String),

    // ── Secrets ──
    #[error("missing secret name")]
    MissingSecretName,

    #[error(
        "failed to parse secret reference \"{0}\": values must be of the format \
         \"SECRET:VERSION\", \"projects/PROJECT/secrets/SECRET/versions/VERSION\", \
         \"projects/PROJECT/secrets/SECRET:VERSION\" or \"projects/PROJECT/secrets/SECRET\""
    )]
    InvalidSecretReference(String),

    #[error("invalid secret mount path '{0}': expected an absolute path with a file component")]
    InvalidMountPath(String),

    #[error("secret reference \"{0}\" has no project and no default project ID is set")]
    SecretProjectRequired(String),

    // ── Key/value input ──
    #[error("the expected data format should be \"KEY1=VALUE1\", got \"{pair}\" while parsing \"{input}\"")]
    InvalidKvPair { pair: String, input: String },

    #[error("failed to read key/value file {path}")]
    KvFileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse key/value file {path}")]
    KvFileParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("key/value file {path} must contain only string keys and values; got a non-string for key '{key}'")]
    KvFileNonString { path: PathBuf, key: String },

    // ── Function definition ──
    #[error("an event trigger requires both event_trigger_type and event_trigger_resource")]
    IncompleteEventTrigger,

    #[error("https_trigger_security_level cannot be combined with an event trigger")]
    ConflictingTrigger,

    #[error("runtime is required")]
    MissingRuntime,
}
