use std::path::PathBuf;

use clap::Args;
use fndeploy_cloud::{ClientConfig, CloudFunctionsClient, DeployOptions};
use fndeploy_core::FunctionInputs;
use tokio_util::sync::CancellationToken;

use super::{LogObserver, non_blank_path, parse_bool, parse_number};
use crate::outputs;

/// Inputs of `fndeploy deploy`. Each flag can also come from the matching
/// GitHub Actions `INPUT_*` variable.
///
/// Numbers and booleans are taken as text so that blank action inputs mean
/// "not set" instead of a parse error.
#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Function name, short or `projects/P/locations/L/functions/F`
    #[arg(long, env = "INPUT_NAME")]
    pub name: String,

    /// Runtime, e.g. nodejs20 or python312
    #[arg(long, env = "INPUT_RUNTIME")]
    pub runtime: String,

    #[arg(long, env = "INPUT_DESCRIPTION")]
    pub description: Option<String>,

    /// Directory to zip and upload
    #[arg(long, env = "INPUT_SOURCE_DIR", default_value = "./")]
    pub source_dir: PathBuf,

    /// Exported function to execute
    #[arg(long, env = "INPUT_ENTRY_POINT")]
    pub entry_point: Option<String>,

    /// Memory in MB
    #[arg(long, env = "INPUT_MEMORY_MB")]
    pub memory_mb: Option<String>,

    /// Runtime environment variables as KEY1=VALUE1,KEY2=VALUE2
    #[arg(long, env = "INPUT_ENV_VARS")]
    pub env_vars: Option<String>,

    /// YAML file of runtime environment variables
    #[arg(long, env = "INPUT_ENV_VARS_FILE")]
    pub env_vars_file: Option<PathBuf>,

    /// Build-time environment variables as KEY1=VALUE1,KEY2=VALUE2
    #[arg(long, env = "INPUT_BUILD_ENVIRONMENT_VARIABLES")]
    pub build_environment_variables: Option<String>,

    /// YAML file of build-time environment variables
    #[arg(long, env = "INPUT_BUILD_ENVIRONMENT_VARIABLES_FILE")]
    pub build_environment_variables_file: Option<PathBuf>,

    /// KEY=SECRET_REF pairs exposed as environment variables
    #[arg(long, env = "INPUT_SECRET_ENVIRONMENT_VARIABLES")]
    pub secret_environment_variables: Option<String>,

    /// MOUNT_PATH=SECRET_REF pairs mounted as files
    #[arg(long, env = "INPUT_SECRET_VOLUMES")]
    pub secret_volumes: Option<String>,

    #[arg(long, env = "INPUT_SERVICE_ACCOUNT_EMAIL")]
    pub service_account_email: Option<String>,

    /// Function timeout in seconds
    #[arg(long, env = "INPUT_TIMEOUT")]
    pub timeout: Option<String>,

    #[arg(long, env = "INPUT_MIN_INSTANCES")]
    pub min_instances: Option<String>,

    #[arg(long, env = "INPUT_MAX_INSTANCES")]
    pub max_instances: Option<String>,

    /// ALLOW_ALL, ALLOW_INTERNAL_ONLY or ALLOW_INTERNAL_AND_GCLB
    #[arg(long, env = "INPUT_INGRESS_SETTINGS")]
    pub ingress_settings: Option<String>,

    #[arg(long, env = "INPUT_VPC_CONNECTOR")]
    pub vpc_connector: Option<String>,

    /// PRIVATE_RANGES_ONLY or ALL_TRAFFIC
    #[arg(long, env = "INPUT_VPC_CONNECTOR_EGRESS_SETTINGS")]
    pub vpc_connector_egress_settings: Option<String>,

    /// Event type, e.g. google.pubsub.topic.publish
    #[arg(long, env = "INPUT_EVENT_TRIGGER_TYPE")]
    pub event_trigger_type: Option<String>,

    /// Event resource, e.g. projects/P/topics/T
    #[arg(long, env = "INPUT_EVENT_TRIGGER_RESOURCE")]
    pub event_trigger_resource: Option<String>,

    #[arg(long, env = "INPUT_EVENT_TRIGGER_SERVICE")]
    pub event_trigger_service: Option<String>,

    /// Retry failed event deliveries
    #[arg(
        long,
        env = "INPUT_EVENT_TRIGGER_RETRY",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub event_trigger_retry: Option<String>,

    /// SECURE_ALWAYS or SECURE_OPTIONAL
    #[arg(long, env = "INPUT_HTTPS_TRIGGER_SECURITY_LEVEL")]
    pub https_trigger_security_level: Option<String>,

    /// Labels as KEY1=VALUE1,KEY2=VALUE2
    #[arg(long, env = "INPUT_LABELS")]
    pub labels: Option<String>,

    #[arg(long, env = "INPUT_BUILD_WORKER_POOL")]
    pub build_worker_pool: Option<String>,

    #[arg(long, env = "INPUT_DOCKER_REPOSITORY")]
    pub docker_repository: Option<String>,

    #[arg(long, env = "INPUT_KMS_KEY_NAME")]
    pub kms_key_name: Option<String>,
}

impl DeployArgs {
    fn to_inputs(&self) -> anyhow::Result<FunctionInputs> {
        Ok(FunctionInputs {
            name: self.name.clone(),
            runtime: self.runtime.clone(),
            description: self.description.clone(),
            entry_point: self.entry_point.clone(),
            memory_mb: parse_number("memory_mb", self.memory_mb.as_deref())?,
            timeout_secs: parse_number("timeout", self.timeout.as_deref())?,
            min_instances: parse_number("min_instances", self.min_instances.as_deref())?,
            max_instances: parse_number("max_instances", self.max_instances.as_deref())?,
            labels: self.labels.clone(),
            env_vars: self.env_vars.clone(),
            env_vars_file: non_blank_path(self.env_vars_file.as_deref()),
            build_environment_variables: self.build_environment_variables.clone(),
            build_environment_variables_file: non_blank_path(
                self.build_environment_variables_file.as_deref(),
            ),
            secret_environment_variables: self.secret_environment_variables.clone(),
            secret_volumes: self.secret_volumes.clone(),
            build_worker_pool: self.build_worker_pool.clone(),
            docker_repository: self.docker_repository.clone(),
            kms_key_name: self.kms_key_name.clone(),
            ingress_settings: self.ingress_settings.clone(),
            vpc_connector: self.vpc_connector.clone(),
            vpc_connector_egress_settings: self.vpc_connector_egress_settings.clone(),
            service_account_email: self.service_account_email.clone(),
            event_trigger_type: self.event_trigger_type.clone(),
            event_trigger_resource: self.event_trigger_resource.clone(),
            event_trigger_service: self.event_trigger_service.clone(),
            event_trigger_retry: parse_bool(
                "event_trigger_retry",
                self.event_trigger_retry.as_deref(),
            )?,
            https_trigger_security_level: self.https_trigger_security_level.clone(),
        })
    }
}

/// Validate inputs, deploy from local source and publish the outputs.
pub async fn deploy(
    args: DeployArgs,
    config: ClientConfig,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let client = CloudFunctionsClient::new(config);

    // Validate everything before touching the network
    let name = client.resolve_name(&args.name)?;
    let function = args
        .to_inputs()?
        .to_function(name.as_str(), Some(name.project()))?;

    tracing::info!(function = %name, source = %args.source_dir.display(), "deploying");
    let options = DeployOptions {
        cancel,
        ..Default::default()
    };
    let deployed = client
        .deploy_from_local_source(function, &args.source_dir, &options, &mut LogObserver)
        .await?;

    tracing::info!(
        function = %deployed.name,
        status = deployed.status.as_deref().unwrap_or("UNKNOWN"),
        "deployed"
    );
    outputs::write_outputs(&outputs::FunctionOutputs::from_function(&deployed))?;
    Ok(())
}
