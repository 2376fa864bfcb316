//! Builds the JSON patch that strips gating taints from a node.
//!
//! Removals address taints by position, so a patch is only valid against the
//! snapshot it was computed from. The leading `test` of the resource version
//! makes the API server reject it once the node has moved on.

use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use serde::Serialize;

use crate::eligibility::node_taints;
use crate::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum TaintOperation {
    Test { path: String, value: String },
    Remove { path: String },
}

fn taint_path(index: usize) -> String {
    format!("/spec/taints/{index}")
}

/// Operations removing `positions` from the node's taints. Removals are emitted
/// highest index first so every index still points at its original taint when
/// the operations are applied in sequence.
pub fn removal_operations(
    node: &Node,
    positions: &[usize],
    key: &str,
) -> Result<Vec<TaintOperation>> {
    let name = node.name_any();
    let Some(resource_version) = node.resource_version() else {
        return Err(Error::MissingResourceVersion(name));
    };

    let taints = node_taints(node);
    let mut positions = positions.to_vec();
    positions.sort_unstable_by(|a, b| b.cmp(a));
    positions.dedup();

    let mut ops = Vec::with_capacity(positions.len() * 2 + 1);
    ops.push(TaintOperation::Test {
        path: "/metadata/resourceVersion".into(),
        value: resource_version,
    });
    for index in positions {
        match taints.get(index) {
            Some(taint) if taint.key == key => {}
            Some(taint) => {
                return Err(Error::InvalidPatch {
                    node: name,
                    reason: format!("taint {index} has key {} not {key}", taint.key),
                });
            }
            None => {
                return Err(Error::InvalidPatch {
                    node: name,
                    reason: format!("taint {index} out of range"),
                });
            }
        }
        ops.push(TaintOperation::Test {
            path: format!("{}/key", taint_path(index)),
            value: key.into(),
        });
        ops.push(TaintOperation::Remove {
            path: taint_path(index),
        });
    }
    Ok(ops)
}

pub fn to_json_patch(ops: &[TaintOperation]) -> Result<json_patch::Patch> {
    let value = serde_json::to_value(ops)?;
    Ok(serde_json::from_value(value)?)
}
