use clap::Args;
use fndeploy_cloud::{ClientConfig, CloudFunctionsClient};
use tokio_util::sync::CancellationToken;

use super::LogObserver;

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Function name, short or `projects/P/locations/L/functions/F`
    #[arg(long, env = "INPUT_NAME")]
    pub name: String,
}

/// Delete a function and wait for the operation to finish.
pub async fn delete(
    args: DeleteArgs,
    config: ClientConfig,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let client = CloudFunctionsClient::new(config);
    let name = client.resolve_name(&args.name)?;
    let policy = client.config().poll_policy();

    client
        .delete(name.as_str(), &policy, &cancel, &mut LogObserver)
        .await?;

    println!("Deleted {name}");
    Ok(())
}
