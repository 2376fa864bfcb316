use kube::Client;
use kube::config::KubeConfigOptions;
use tracing::info;

use crate::Result;

/// Builds a client for the named kubeconfig context, or infers one from the
/// in-cluster environment falling back to the local kubeconfig.
pub async fn try_client(context: Option<String>) -> Result<Client> {
    let config = match context {
        Some(context) => {
            info!("using kubeconfig context {}", context);
            kube::Config::from_kubeconfig(&KubeConfigOptions {
                context: Some(context),
                ..Default::default()
            })
            .await?
        }
        None => kube::Config::infer().await?,
    };
    Ok(Client::try_from(config)?)
}
