use std::pin::pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::runtime::reflector::ReflectHandle;
use kube::runtime::watcher;
use kube::{Api, Client, ResourceExt};
use node_taint_manager_k8s_utils::{Index, StoreConfig, create_store_and_subscriber};
use tokio::time::{Instant, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::eligibility::{has_gating_taint, is_gating_daemon_pod};
use crate::projection::{pod_node_name, project_node, project_pod};
use crate::{Cache, Context, ControllerConfig, Error, NodeQueue, Result, TaintMetrics, run};

// unscheduled pods cannot hold back a node
const SCHEDULED_PODS: &str = "spec.nodeName!=";

/// Syncs the node and pod caches, then reconciles until `cancel` fires.
/// `ready` is cancelled once the caches are synced.
pub async fn start_taint_controller(
    client: Client,
    config: ControllerConfig,
    metrics: TaintMetrics,
    ready: CancellationToken,
    cancel: CancellationToken,
) -> Result<()> {
    config.validate()?;
    let pods_by_node = Arc::new(Index::new(pod_node_name));

    info!("starting node and pod caches");
    let store_init = timeout(config.cache_sync_timeout, async {
        tokio::try_join!(
            create_store_and_subscriber(
                Api::<Node>::all(client.clone()),
                StoreConfig {
                    projection: project_node,
                    ..Default::default()
                },
                cancel.clone(),
            ),
            create_store_and_subscriber(
                Api::<Pod>::all(client.clone()),
                StoreConfig {
                    watcher: watcher::Config::default().fields(SCHEDULED_PODS),
                    projection: project_pod,
                    index: Some(pods_by_node.clone()),
                    timeout: None,
                },
                cancel.clone(),
            ),
        )
    })
    .await
    .map_err(|_| Error::Timeout)??;

    let ((nodes, node_subscriber), (_, pod_subscriber)) = store_init;
    info!(
        nodes = nodes.state().len(),
        pods = pods_by_node.len(),
        "node and pod caches fully synced"
    );

    let ctx = Arc::new(Context {
        client: Api::<Node>::all(client),
        cache: Cache::new(nodes, pods_by_node),
        config,
        metrics,
    });
    ready.cancel();

    let queue = if ctx.config.watch_events {
        let queue = Arc::new(NodeQueue::default());
        let key = ctx.config.taint_key.clone();
        tokio::spawn(enqueue_nodes(
            node_subscriber,
            queue.clone(),
            key.clone(),
            cancel.clone(),
        ));
        tokio::spawn(enqueue_pod_nodes(
            pod_subscriber,
            queue.clone(),
            key.clone(),
            cancel.clone(),
        ));
        tokio::spawn(resync(
            ctx.cache.clone(),
            ctx.config.resync_interval,
            queue.clone(),
            key,
            cancel.clone(),
        ));
        Some(queue)
    } else {
        drop(node_subscriber);
        drop(pod_subscriber);
        None
    };

    run(ctx, queue, cancel).await;
    Ok(())
}

async fn enqueue_nodes(
    subscriber: ReflectHandle<Node>,
    queue: Arc<NodeQueue>,
    key: String,
    cancel: CancellationToken,
) {
    let mut stream = pin!(subscriber);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = stream.next() => {
                let Some(node) = next else {
                    break;
                };
                if has_gating_taint(&node, &key) && queue.push(node.name_any()) {
                    debug!("queued node {} after node update", node.name_any());
                }
            }
        }
    }
}

async fn enqueue_pod_nodes(
    subscriber: ReflectHandle<Pod>,
    queue: Arc<NodeQueue>,
    key: String,
    cancel: CancellationToken,
) {
    let mut stream = pin!(subscriber);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = stream.next() => {
                let Some(pod) = next else {
                    break;
                };
                if !is_gating_daemon_pod(&pod, &key) {
                    continue;
                }
                if let Some(node_name) = pod_node_name(&pod)
                    && queue.push(node_name.clone())
                {
                    debug!("queued node {} after update of pod {}", node_name, pod.name_any());
                }
            }
        }
    }
}

/// Periodically queues every gated node so no update is missed for longer than
/// one resync period.
async fn resync(
    cache: Cache,
    period: std::time::Duration,
    queue: Arc<NodeQueue>,
    key: String,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let nodes = cache.nodes();
                for node in nodes.iter().filter(|n| has_gating_taint(n, &key)) {
                    queue.push(node.name_any());
                }
                debug!(queued = queue.len(), "resynced gated nodes");
            }
        }
    }
}
