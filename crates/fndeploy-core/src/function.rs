use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A Cloud Function as sent to and returned by the v1 API.
///
/// Optional fields are omitted from the JSON body when `None`, which keeps
/// them out of the patch update mask as well. Output-only fields are read from
/// responses and never serialized. Responses may omit any field, so decoding
/// never requires one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudFunction {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub runtime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_memory_mb: Option<u32>,
    /// Duration string such as `"60s"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_instances: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_instances: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_variables: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_environment_variables: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_worker_pool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_repository: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kms_key_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress_settings: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_connector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_connector_egress_settings: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_environment_variables: Option<Vec<SecretEnvVar>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_volumes: Option<Vec<SecretVolume>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_upload_url: Option<String>,
    #[serde(flatten)]
    pub trigger: Option<Trigger>,

    // ── Output only ──
    #[serde(skip_serializing)]
    pub status: Option<String>,
    #[serde(skip_serializing)]
    pub update_time: Option<String>,
    #[serde(skip_serializing)]
    pub version_id: Option<String>,
    #[serde(skip_serializing)]
    pub build_id: Option<String>,
    #[serde(skip_serializing)]
    pub build_name: Option<String>,
}

impl CloudFunction {
    /// The invocation URL, present only for HTTPS-triggered functions.
    pub fn https_url(&self) -> Option<&str> {
        match &self.trigger {
            Some(Trigger::Https(t)) => t.url.as_deref(),
            _ => None,
        }
    }
}

/// The function's trigger. Exactly one variant is ever serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Trigger {
    #[serde(rename = "httpsTrigger")]
    Https(HttpsTrigger),
    #[serde(rename = "eventTrigger")]
    Event(EventTrigger),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpsTrigger {
    #[serde(skip_serializing)]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_level: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTrigger {
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub resource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_policy: Option<FailurePolicy>,
}

/// Presence of `retry` enables retries on failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailurePolicy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretEnvVar {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretVolume {
    #[serde(default)]
    pub mount_path: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub secret: String,
    /// Omitted by the API when only the latest version is mounted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<SecretVersionPath>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretVersionPath {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub version: String,
}
