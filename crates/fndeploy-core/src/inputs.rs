//! Raw deploy inputs (flags or `INPUT_*` variables) and their translation into
//! a [`CloudFunction`] request body.

use std::path::PathBuf;

use crate::function::{
    CloudFunction, EventTrigger, FailurePolicy, HttpsTrigger, RetryPolicy, Trigger,
};
use crate::kv;
use crate::secret;

/// User-facing deploy inputs before validation.
///
/// Empty strings are treated the same as absent values.
#[derive(Debug, Clone, Default)]
pub struct FunctionInputs {
    pub name: String,
    pub runtime: String,
    pub description: Option<String>,
    pub entry_point: Option<String>,
    pub memory_mb: Option<u32>,
    /// Seconds, without the `s` suffix.
    pub timeout_secs: Option<u32>,
    pub min_instances: Option<u32>,
    pub max_instances: Option<u32>,
    pub labels: Option<String>,
    pub env_vars: Option<String>,
    pub env_vars_file: Option<PathBuf>,
    pub build_environment_variables: Option<String>,
    pub build_environment_variables_file: Option<PathBuf>,
    pub secret_environment_variables: Option<String>,
    pub secret_volumes: Option<String>,
    pub build_worker_pool: Option<String>,
    pub docker_repository: Option<String>,
    pub kms_key_name: Option<String>,
    pub ingress_settings: Option<String>,
    pub vpc_connector: Option<String>,
    pub vpc_connector_egress_settings: Option<String>,
    pub service_account_email: Option<String>,
    pub event_trigger_type: Option<String>,
    pub event_trigger_resource: Option<String>,
    pub event_trigger_service: Option<String>,
    pub event_trigger_retry: bool,
    pub https_trigger_security_level: Option<String>,
}

impl FunctionInputs {
    /// Validate the inputs and build the request body.
    ///
    /// `resolved_name` is the canonical resource name; `default_project` fills
    /// in secret references that do not name a project.
    ///
    /// # Errors
    ///
    /// Any malformed key/value string, secret reference, or trigger combination.
    pub fn to_function(
        &self,
        resolved_name: &str,
        default_project: Option<&str>,
    ) -> crate::Result<CloudFunction> {
        let runtime = self.runtime.trim();
        if runtime.is_empty() {
            return Err(crate::Error::MissingRuntime);
        }

        let trigger = self.trigger()?;

        let labels = kv::parse_kv_inputs(self.labels.as_deref(), None)?;
        let environment_variables =
            kv::parse_kv_inputs(self.env_vars.as_deref(), self.env_vars_file.as_deref())?;
        let build_environment_variables = kv::parse_kv_inputs(
            self.build_environment_variables.as_deref(),
            self.build_environment_variables_file.as_deref(),
        )?;

        let secret_environment_variables =
            match kv::parse_kv_inputs(self.secret_environment_variables.as_deref(), None)? {
                Some(pairs) => Some(secret::secret_env_vars(&pairs, default_project)?),
                None => None,
            };
        let secret_volumes = match kv::parse_kv_inputs(self.secret_volumes.as_deref(), None)? {
            Some(pairs) => Some(secret::secret_volumes(&pairs, default_project)?),
            None => None,
        };

        Ok(CloudFunction {
            name: resolved_name.to_owned(),
            runtime: runtime.to_owned(),
            description: present(&self.description),
            entry_point: present(&self.entry_point),
            available_memory_mb: self.memory_mb.filter(|m| *m > 0),
            timeout: self.timeout_secs.filter(|t| *t > 0).map(|t| format!("{t}s")),
            min_instances: self.min_instances,
            max_instances: self.max_instances.filter(|m| *m > 0),
            labels,
            environment_variables,
            build_environment_variables,
            build_worker_pool: present(&self.build_worker_pool),
            docker_repository: present(&self.docker_repository),
            kms_key_name: present(&self.kms_key_name),
            ingress_settings: present(&self.ingress_settings),
            vpc_connector: present(&self.vpc_connector),
            vpc_connector_egress_settings: present(&self.vpc_connector_egress_settings),
            service_account_email: present(&self.service_account_email),
            secret_environment_variables,
            secret_volumes,
            trigger: Some(trigger),
            ..Default::default()
        })
    }

    fn trigger(&self) -> crate::Result<Trigger> {
        let event_type = present(&self.event_trigger_type);
        let resource = present(&self.event_trigger_resource);
        let service = present(&self.event_trigger_service);
        let security_level = present(&self.https_trigger_security_level);

        match (event_type, resource) {
            (Some(event_type), Some(resource)) => {
                if security_level.is_some() {
                    return Err(crate::Error::ConflictingTrigger);
                }
                Ok(Trigger::Event(EventTrigger {
                    event_type,
                    resource,
                    service,
                    failure_policy: self.event_trigger_retry.then(|| FailurePolicy {
                        retry: Some(RetryPolicy {}),
                    }),
                }))
            }
            (None, None) if service.is_none() && !self.event_trigger_retry => {
                Ok(Trigger::Https(HttpsTrigger {
                    url: None,
                    security_level,
                }))
            }
            _ => Err(crate::Error::IncompleteEventTrigger),
        }
    }
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}
