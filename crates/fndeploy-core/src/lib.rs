//! Core types and configuration for fndeploy.
//!
//! This crate defines the Cloud Functions request model ([`CloudFunction`]),
//! canonical resource naming ([`ResourceName`]), secret references
//! ([`SecretReference`]), key/value input parsing, the `fndeploy.toml` schema
//! ([`FndeployConfig`]), and shared error types.

pub mod config;
pub mod error;
pub mod function;
pub mod inputs;
pub mod kv;
pub mod naming;
pub mod secret;

pub use config::{ClientSettings, FndeployConfig, ProjectConfig};
pub use error::{Error, Result};
pub use function::{
    CloudFunction, EventTrigger, FailurePolicy, HttpsTrigger, RetryPolicy, SecretEnvVar,
    SecretVersionPath, SecretVolume, Trigger,
};
pub use inputs::FunctionInputs;
pub use naming::{ResourceName, full_resource_name, parent_from_name};
pub use secret::SecretReference;
