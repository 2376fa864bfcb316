use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::eligibility::evaluate;
use crate::patch::{removal_operations, to_json_patch};
use crate::projection::project_node;
use crate::{Context, Error, NodeClient, NodeQueue, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeOutcome {
    /// The node carries no gating taint.
    Untouched,
    /// Gating taints remain and none can be removed yet.
    Gated { pending: usize },
    Untainted { removed: usize, pending: usize },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub nodes: usize,
    pub untainted: usize,
    pub gated: usize,
    pub failed: usize,
}

/// Runs evaluate, build and apply for one node. A conflicting patch is retried
/// against a snapshot read straight from the API server, up to the configured
/// number of attempts.
#[tracing::instrument(skip(node, ctx), fields(node = %node.name_any()))]
pub async fn reconcile_node<C: NodeClient>(
    node: Arc<Node>,
    ctx: &Context<C>,
) -> Result<NodeOutcome> {
    let name = node.name_any();
    let key = ctx.config.taint_key.as_str();
    let retry = ctx.config.retry_policy();
    let mut node = node;
    let mut attempt = 1;
    loop {
        let pods = ctx.cache.pods_on_node(&name);
        let decision = evaluate(&node, &pods, key);
        if !decision.is_gated() {
            return Ok(NodeOutcome::Untouched);
        }
        if decision.removable.is_empty() {
            debug!(pending = decision.pending(), "daemonset pods not ready yet");
            return Ok(NodeOutcome::Gated {
                pending: decision.pending(),
            });
        }

        // taken before patching so API latency does not skew the metric, and
        // only once every daemonset on the node is ready
        let time_to_ready = if decision.pending() == 0 {
            time_since_creation(&node)
        } else {
            None
        };
        let ops = removal_operations(&node, &decision.removable, key)?;
        match ctx.client.patch_node(&name, to_json_patch(&ops)?).await {
            Ok(()) => {
                ctx.metrics.record_untaint(time_to_ready);
                info!(
                    removed = decision.removable.len(),
                    pending = decision.pending(),
                    "untainted node {}",
                    name
                );
                return Ok(NodeOutcome::Untainted {
                    removed: decision.removable.len(),
                    pending: decision.pending(),
                });
            }
            Err(e) if e.is_conflict() && attempt < retry.attempts => {
                debug!(attempt, "node changed before patch applied, retrying");
                tokio::time::sleep(retry.delay(attempt)).await;
                let mut fresh = ctx.client.get_node(&name).await?;
                project_node(&mut fresh);
                node = Arc::new(fresh);
                attempt += 1;
            }
            Err(e) if e.is_conflict() => {
                return Err(Error::RetriesExhausted {
                    node: name,
                    attempts: attempt,
                });
            }
            Err(e) => return Err(e),
        }
    }
}

/// Reconciles every cached node. Failures stay scoped to their node.
pub async fn reconcile_all<C: NodeClient>(ctx: &Context<C>) -> PassSummary {
    let nodes = ctx.cache.nodes();
    ctx.metrics.set_nodes_monitored(nodes.len());
    let mut summary = PassSummary {
        nodes: nodes.len(),
        ..Default::default()
    };
    for node in nodes {
        let name = node.name_any();
        match reconcile_node(node, ctx).await {
            Ok(NodeOutcome::Untouched) => {}
            Ok(NodeOutcome::Gated { .. }) => summary.gated += 1,
            Ok(NodeOutcome::Untainted { .. }) => summary.untainted += 1,
            Err(e) => {
                summary.failed += 1;
                error_policy(&name, &e, ctx);
            }
        }
    }
    summary
}

async fn reconcile_named<C: NodeClient>(name: &str, ctx: &Context<C>) {
    // deleted since it was queued
    let Some(node) = ctx.cache.node(name) else {
        return;
    };
    if let Err(e) = reconcile_node(node, ctx).await {
        error_policy(name, &e, ctx);
    }
}

fn error_policy<C: NodeClient>(name: &str, error: &Error, ctx: &Context<C>) {
    ctx.metrics.count_failure(error);
    match error {
        Error::RetriesExhausted { attempts, .. } => {
            warn!(attempts, "node {} kept changing, deferring to next tick", name)
        }
        _ => warn!(%error, "skipping node {}", name),
    }
}

/// Drives reconciliation until `cancel` fires: a full pass on every tick and,
/// when a queue is given, single nodes as they are queued in between.
pub async fn run<C: NodeClient>(
    ctx: Arc<Context<C>>,
    queue: Option<Arc<NodeQueue>>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(ctx.config.reconcile_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        "reconciling node taints with daemonset pods every {:?}",
        ctx.config.reconcile_interval
    );

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    summary = reconcile_all(&ctx) => {
                        if summary.untainted > 0 || summary.failed > 0 {
                            debug!(?summary, "reconciliation pass complete");
                        }
                    }
                }
            }
            name = next_queued(queue.as_deref()) => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = reconcile_named(&name, &ctx) => {}
                }
            }
        }
    }
    info!("reconciliation loop stopped");
}

async fn next_queued(queue: Option<&NodeQueue>) -> String {
    match queue {
        Some(queue) => queue.next().await,
        None => std::future::pending().await,
    }
}

fn time_since_creation(node: &Node) -> Option<Duration> {
    let created = node.creation_timestamp()?;
    (Utc::now() - created.0).to_std().ok()
}
