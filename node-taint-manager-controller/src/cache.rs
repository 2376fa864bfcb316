use std::sync::Arc;

use k8s_openapi::api::core::v1::{Node, Pod};
use kube::runtime::reflector::{ObjectRef, Store};
use node_taint_manager_k8s_utils::Index;

/// Read side of the node and pod caches. Every read hands out immutable
/// snapshots that the watchers may replace at any time.
#[derive(Clone)]
pub struct Cache {
    nodes: Store<Node>,
    pods_by_node: Arc<Index<Pod>>,
}

impl Cache {
    pub fn new(nodes: Store<Node>, pods_by_node: Arc<Index<Pod>>) -> Self {
        Self {
            nodes,
            pods_by_node,
        }
    }

    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.state()
    }

    pub fn node(&self, name: &str) -> Option<Arc<Node>> {
        self.nodes.get(&ObjectRef::new(name))
    }

    pub fn pods_on_node(&self, node_name: &str) -> Vec<Arc<Pod>> {
        self.pods_by_node.get(node_name)
    }
}
