//! Decides which gating taints on a node may be removed.
//!
//! A gating taint instance is removable once every daemonset pod associated
//! with it reports ready. An instance with no associated pod stays in place.

use std::sync::Arc;

use k8s_openapi::api::core::v1::{Node, Pod, Taint};
use kube::ResourceExt;

pub const DAEMONSET_KIND: &str = "DaemonSet";

const TOLERATION_OP_EXISTS: &str = "Exists";
const POD_CONDITION_READY: &str = "Ready";

/// Outcome of evaluating one node snapshot. Positions index into the taint list
/// of that exact snapshot and are ascending.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Decision {
    pub gating: Vec<usize>,
    pub removable: Vec<usize>,
}

impl Decision {
    pub fn is_gated(&self) -> bool {
        !self.gating.is_empty()
    }

    /// Gating taints that have to stay after the removable ones are gone.
    pub fn pending(&self) -> usize {
        self.gating.len() - self.removable.len()
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Scope<'a> {
    Any,
    Value(&'a str),
}

/// A daemonset pod that tolerates the gating key.
#[derive(Debug)]
struct DaemonPod<'a> {
    daemonset: &'a str,
    scopes: Vec<Scope<'a>>,
    ready: bool,
}

impl<'a> DaemonPod<'a> {
    fn from_pod(pod: &'a Pod, key: &str) -> Option<Self> {
        let daemonset = daemonset_owner(pod)?;
        let scopes: Vec<Scope<'a>> = pod
            .spec
            .as_ref()?
            .tolerations
            .as_ref()?
            .iter()
            .filter(|t| t.key.as_deref() == Some(key))
            .map(|t| {
                let value = t.value.as_deref().unwrap_or_default();
                if t.operator.as_deref() == Some(TOLERATION_OP_EXISTS) || value.is_empty() {
                    Scope::Any
                } else {
                    Scope::Value(value)
                }
            })
            .collect();
        if scopes.is_empty() {
            return None;
        }
        Some(Self {
            daemonset,
            scopes,
            ready: is_pod_ready(pod),
        })
    }

    fn covers(&self, taint_value: &str) -> bool {
        // an unvalued gate is held back by every gating daemon pod
        if taint_value.is_empty() {
            return true;
        }
        self.scopes.iter().any(|scope| match scope {
            Scope::Value(v) => *v == taint_value,
            Scope::Any => taint_value == self.daemonset,
        })
    }
}

/// Evaluates `node` against the pods currently bound to it.
pub fn evaluate(node: &Node, pods: &[Arc<Pod>], key: &str) -> Decision {
    let taints = node_taints(node);
    let gating: Vec<usize> = taints
        .iter()
        .enumerate()
        .filter(|(_, t)| t.key == key)
        .map(|(i, _)| i)
        .collect();
    if gating.is_empty() {
        return Decision::default();
    }

    let daemons: Vec<DaemonPod> = pods
        .iter()
        .filter_map(|pod| DaemonPod::from_pod(pod, key))
        .collect();

    let removable = gating
        .iter()
        .copied()
        .filter(|&i| {
            let value = taints[i].value.as_deref().unwrap_or_default();
            let mut associated = daemons.iter().filter(|d| d.covers(value)).peekable();
            associated.peek().is_some() && associated.all(|d| d.ready)
        })
        .collect();

    Decision { gating, removable }
}

pub fn node_taints(node: &Node) -> &[Taint] {
    node.spec
        .as_ref()
        .and_then(|spec| spec.taints.as_deref())
        .unwrap_or_default()
}

pub fn has_gating_taint(node: &Node, key: &str) -> bool {
    node_taints(node).iter().any(|t| t.key == key)
}

/// Whether the pod could hold back a gating taint, i.e. it is run by a
/// daemonset and tolerates `key`.
pub fn is_gating_daemon_pod(pod: &Pod, key: &str) -> bool {
    DaemonPod::from_pod(pod, key).is_some()
}

/// Name of the daemonset controlling the pod, if any.
pub fn daemonset_owner(pod: &Pod) -> Option<&str> {
    pod.owner_references()
        .iter()
        .find(|owner| owner.controller == Some(true))
        .filter(|owner| owner.kind == DAEMONSET_KIND)
        .map(|owner| owner.name.as_str())
}

pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == POD_CONDITION_READY && c.status == "True")
        })
}
