//! Field projections applied before nodes and pods enter the cache. Only what
//! the eligibility check, the patch builder and metrics read is kept.

use k8s_openapi::api::core::v1::{Node, NodeSpec, Pod, PodSpec, PodStatus};
use kube::api::ObjectMeta;

pub fn project_node(node: &mut Node) {
    let meta = std::mem::take(&mut node.metadata);
    node.metadata = ObjectMeta {
        name: meta.name,
        resource_version: meta.resource_version,
        creation_timestamp: meta.creation_timestamp,
        ..Default::default()
    };
    let taints = node.spec.take().and_then(|spec| spec.taints);
    node.spec = Some(NodeSpec {
        taints,
        ..Default::default()
    });
    node.status = None;
}

pub fn project_pod(pod: &mut Pod) {
    let meta = std::mem::take(&mut pod.metadata);
    pod.metadata = ObjectMeta {
        name: meta.name,
        namespace: meta.namespace,
        resource_version: meta.resource_version,
        owner_references: meta.owner_references,
        ..Default::default()
    };
    let (node_name, tolerations) = pod
        .spec
        .take()
        .map(|spec| (spec.node_name, spec.tolerations))
        .unwrap_or_default();
    pod.spec = Some(PodSpec {
        node_name,
        tolerations,
        ..Default::default()
    });
    let conditions = pod.status.take().and_then(|status| status.conditions);
    pod.status = Some(PodStatus {
        conditions,
        ..Default::default()
    });
}

/// Index function for the pod-by-node index.
pub fn pod_node_name(pod: &Pod) -> Option<String> {
    pod.spec
        .as_ref()
        .and_then(|spec| spec.node_name.as_ref())
        .filter(|name| !name.is_empty())
        .cloned()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::{
        Container, NodeStatus, PodCondition, Taint, Toleration,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

    use super::*;

    #[test]
    fn test_project_node_keeps_taints() {
        let mut labels = BTreeMap::new();
        labels.insert("kubernetes.io/os".to_string(), "linux".to_string());
        let mut node = Node {
            metadata: ObjectMeta {
                name: Some("n1".into()),
                resource_version: Some("42".into()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: Some(NodeSpec {
                pod_cidr: Some("10.0.0.0/24".into()),
                taints: Some(vec![Taint {
                    key: "gate".into(),
                    effect: "NoSchedule".into(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            status: Some(NodeStatus::default()),
        };

        project_node(&mut node);

        assert_eq!(node.metadata.name.as_deref(), Some("n1"));
        assert_eq!(node.metadata.resource_version.as_deref(), Some("42"));
        assert!(node.metadata.labels.is_none());
        let spec = node.spec.expect("spec");
        assert!(spec.pod_cidr.is_none());
        assert_eq!(spec.taints.map(|t| t.len()), Some(1));
        assert!(node.status.is_none());
    }

    #[test]
    fn test_project_pod_keeps_readiness_inputs() {
        let mut pod = Pod {
            metadata: ObjectMeta {
                name: Some("agent-x".into()),
                namespace: Some("kube-system".into()),
                owner_references: Some(vec![OwnerReference {
                    kind: "DaemonSet".into(),
                    name: "agent".into(),
                    controller: Some(true),
                    ..Default::default()
                }]),
                annotations: Some(BTreeMap::new()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some("n1".into()),
                containers: vec![Container {
                    name: "agent".into(),
                    ..Default::default()
                }],
                tolerations: Some(vec![Toleration {
                    key: Some("gate".into()),
                    operator: Some("Exists".into()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some("Running".into()),
                conditions: Some(vec![PodCondition {
                    type_: "Ready".into(),
                    status: "True".into(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
        };

        project_pod(&mut pod);

        assert!(pod.metadata.annotations.is_none());
        assert_eq!(pod.metadata.owner_references.as_ref().map(|o| o.len()), Some(1));
        let spec = pod.spec.as_ref().expect("spec");
        assert!(spec.containers.is_empty());
        assert_eq!(spec.tolerations.as_ref().map(|t| t.len()), Some(1));
        let status = pod.status.as_ref().expect("status");
        assert!(status.phase.is_none());
        assert_eq!(status.conditions.as_ref().map(|c| c.len()), Some(1));
        assert_eq!(pod_node_name(&pod).as_deref(), Some("n1"));
    }

    #[test]
    fn test_unscheduled_pod_has_no_node() {
        let pod = Pod {
            spec: Some(PodSpec {
                node_name: Some(String::new()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(pod_node_name(&pod), None);
        assert_eq!(pod_node_name(&Pod::default()), None);
    }
}
