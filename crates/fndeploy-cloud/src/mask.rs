//! Patch update masks.
//!
//! The mask is the subset of [`UPDATABLE_FIELDS`] present in the outgoing
//! request body, in table order. Maps and arrays are leaves, so `labels` is
//! asserted as a whole rather than key by key.

use serde_json::Value;

/// Dotted paths of every field fndeploy may send in a patch. `name` first.
pub const UPDATABLE_FIELDS: &[&str] = &[
    "name",
    "description",
    "sourceUploadUrl",
    "runtime",
    "entryPoint",
    "availableMemoryMb",
    "timeout",
    "minInstances",
    "maxInstances",
    "labels",
    "environmentVariables",
    "buildEnvironmentVariables",
    "buildWorkerPool",
    "dockerRepository",
    "kmsKeyName",
    "ingressSettings",
    "vpcConnector",
    "vpcConnectorEgressSettings",
    "serviceAccountEmail",
    "secretEnvironmentVariables",
    "secretVolumes",
    "httpsTrigger",
    "eventTrigger.eventType",
    "eventTrigger.resource",
    "eventTrigger.service",
    "eventTrigger.failurePolicy",
];

/// Compute the mask for a serialized function body.
pub fn update_mask(body: &Value) -> Vec<String> {
    UPDATABLE_FIELDS
        .iter()
        .filter(|path| is_present(body, path))
        .map(|path| (*path).to_owned())
        .collect()
}

fn is_present(body: &Value, path: &str) -> bool {
    let mut current = body;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return false,
        }
    }
    !current.is_null()
}
