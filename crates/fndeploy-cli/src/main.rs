mod commands;
mod outputs;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use fndeploy_cloud::ClientConfig;
use fndeploy_core::FndeployConfig;
use tokio_util::sync::CancellationToken;

/// Variables exported by `google-github-actions/auth` and the gcloud SDK.
const PROJECT_ENV_VARS: [&str; 4] = [
    "CLOUDSDK_CORE_PROJECT",
    "GCLOUD_PROJECT",
    "GCP_PROJECT",
    "GOOGLE_CLOUD_PROJECT",
];

#[derive(Parser)]
#[command(
    name = "fndeploy",
    about = "Deploy Google Cloud Functions from local source"
)]
#[command(version)]
struct Cli {
    /// Directory containing fndeploy.toml
    #[arg(long, global = true, default_value = ".", env = "FNDEPLOY_CONFIG_DIR")]
    config_dir: PathBuf,

    /// Project that owns the function (defaults to fndeploy.toml, then the gcloud environment)
    #[arg(long, global = true, env = "INPUT_PROJECT_ID")]
    project_id: Option<String>,

    /// Region of the function (default: us-central1)
    #[arg(long, global = true, env = "INPUT_REGION")]
    region: Option<String>,

    /// Seconds to wait for the operation; 0 waits indefinitely
    #[arg(long, global = true, env = "INPUT_DEPLOY_TIMEOUT")]
    deploy_timeout: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Zip a source directory and create or update a function from it
    Deploy(Box<commands::DeployArgs>),
    /// Delete a function
    Delete(commands::DeleteArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if std::env::var_os("GITHUB_ACTIONS").is_some_and(|v| v == "true") {
                eprintln!("::error::fndeploy failed with: {e:#}");
            } else {
                eprintln!("fndeploy failed with: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let file_config = FndeployConfig::load(&cli.config_dir)?;
    let config = client_config(&cli, &file_config)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("interrupted, cancelling");
                on_signal.cancel();
            }
            Err(e) => tracing::debug!(error = %e, "failed to listen for ctrl-c"),
        }
    });

    match cli.command {
        Commands::Deploy(args) => commands::deploy(*args, config, cancel).await?,
        Commands::Delete(args) => commands::delete(args, config, cancel).await?,
    }

    Ok(())
}

/// Flags and `INPUT_*` variables override fndeploy.toml.
fn client_config(cli: &Cli, file: &FndeployConfig) -> anyhow::Result<ClientConfig> {
    let project_id = non_blank(cli.project_id.as_deref())
        .or_else(|| non_blank(file.project.project_id.as_deref()))
        .or_else(project_from_env);
    let region = non_blank(cli.region.as_deref()).unwrap_or_else(|| file.project.region.clone());

    let mut config = ClientConfig::from_settings(&file.client, project_id, Some(region));
    let deploy_timeout =
        commands::parse_number::<u64>("deploy_timeout", cli.deploy_timeout.as_deref())?;
    if let Some(secs) = deploy_timeout {
        config.deploy_timeout = Duration::from_secs(secs);
    }
    Ok(config)
}

fn project_from_env() -> Option<String> {
    PROJECT_ENV_VARS.iter().find_map(|name| {
        std::env::var(name)
            // arch-lint: allow(no-silent-result-drop) reason="an unset project variable means the environment names no default project"
            .ok()
            .and_then(|v| non_blank(Some(&v)))
    })
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}
