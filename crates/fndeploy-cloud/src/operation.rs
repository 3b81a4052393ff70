use fndeploy_core::CloudFunction;
use serde::{Deserialize, Serialize};

/// A long-running operation returned by create, patch and delete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationStatus>,
    /// The finished resource; `google.protobuf.Empty` for deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Operation {
    /// The function embedded in a finished create or patch operation.
    pub fn function(&self) -> Result<Option<CloudFunction>, serde_json::Error> {
        match &self.response {
            Some(value) if value.get("name").is_some() => {
                serde_json::from_value(value.clone()).map(Some)
            }
            _ => Ok(None),
        }
    }
}

/// `google.rpc.Status` as carried by a failed operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UploadUrlResponse {
    pub upload_url: String,
}

/// Ensure an operation id is addressed as `operations/{id}`.
pub fn operation_path(name: &str) -> String {
    if name.starts_with("operations/") {
        name.to_owned()
    } else {
        format!("operations/{name}")
    }
}
