use node_taint_manager_controller::{TaintMetrics, start_taint_controller};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Settings;
use crate::{Error, Result, kubernetes, metrics};

pub async fn start(
    settings: Settings,
    ready: CancellationToken,
    cancel: CancellationToken,
) -> Result<()> {
    let client = kubernetes::try_client(settings.context).await?;

    let taint_metrics = {
        let mut registry = metrics::REGISTRY
            .write()
            .map_err(|_| Error::Other("metrics registry lock poisoned".into()))?;
        TaintMetrics::new(&mut registry)
    };

    info!(
        taint_key = %settings.controller.taint_key,
        "starting taint controller"
    );
    start_taint_controller(client, settings.controller, taint_metrics, ready, cancel).await?;
    Ok(())
}
