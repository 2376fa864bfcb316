use clap::Parser;
use node_taint_manager::{Error, Result, config::Cli, controller, http};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_subscriber();
    let settings = cli.load_settings().await?;

    let cancel = CancellationToken::new();
    // cancelled by the controller once its caches have synced
    let ready = CancellationToken::new();

    let mut metrics_handle = tokio::spawn(http::serve_metrics(
        settings.metrics_address,
        ready.child_token(),
        cancel.child_token(),
    ));
    let mut controller_handle =
        tokio::spawn(controller::start(settings, ready, cancel.child_token()));
    let mut shutdown_handle = tokio::spawn(shutdown_signal());

    // the first task to finish decides the outcome
    let outcome = tokio::select! {
        h = &mut metrics_handle => {
            cancel.cancel();
            let _ = controller_handle.await;
            exit("metrics", h)
        }
        h = &mut controller_handle => {
            cancel.cancel();
            let _ = metrics_handle.await;
            exit("controller", h)
        }
        signal = &mut shutdown_handle => {
            cancel.cancel();
            let (metrics, controller) = tokio::join!(metrics_handle, controller_handle);
            if let Err(e) = exit("metrics", metrics) {
                error!("metrics exited with error: {e}");
            }
            match exit("controller", controller) {
                // shut down before the caches finished syncing
                Err(e) if e.is_cancelled() => {}
                res => res?,
            }
            signal.map_err(|e| Error::Task(e.to_string()))?
        }
    };
    info!("Exiting...");
    outcome
}

fn setup_subscriber() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "node_taint_manager=info,node_taint_manager_controller=info,node_taint_manager_k8s_utils=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() -> Result<()> {
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("captured ctrl_c signal");
        },
        _ = terminate.recv() => {
            info!("captured terminate signal");
        },
    }
    Ok(())
}

fn exit(task: &str, out: Result<Result<()>, JoinError>) -> Result<()> {
    match out {
        Ok(Ok(_)) => {
            info!("{task} exited");
            Ok(())
        }
        Ok(Err(e)) => {
            error!("{task} failed with error: {e}");
            Err(e)
        }
        Err(e) => {
            error!("{task} task failed to complete: {e}");
            Err(Error::Task(e.to_string()))
        }
    }
}
