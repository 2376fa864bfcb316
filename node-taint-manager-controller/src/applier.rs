use std::future::Future;
use std::time::Duration;

use k8s_openapi::api::core::v1::Node;
use kube::Api;
use kube::api::{Patch, PatchParams};

use crate::{Error, Result};

const FIELD_MANAGER: &str = "node-taint-manager";

/// Write access to the authoritative node objects.
pub trait NodeClient: Send + Sync {
    /// Reads the node straight from the API server, bypassing the cache.
    fn get_node(&self, name: &str) -> impl Future<Output = Result<Node>> + Send;

    /// Applies `patch` atomically. A patch computed from an outdated snapshot
    /// fails with [`Error::Conflict`].
    fn patch_node(
        &self,
        name: &str,
        patch: json_patch::Patch,
    ) -> impl Future<Output = Result<()>> + Send;
}

impl NodeClient for Api<Node> {
    async fn get_node(&self, name: &str) -> Result<Node> {
        self.get_opt(name)
            .await?
            .ok_or_else(|| Error::NodeNotFound(name.into()))
    }

    async fn patch_node(&self, name: &str, patch: json_patch::Patch) -> Result<()> {
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.into()),
            ..Default::default()
        };
        match self.patch(name, &params, &Patch::Json::<()>(patch)).await {
            Ok(_) => Ok(()),
            // 409 for a version conflict, 422 when a test operation fails
            Err(kube::Error::Api(e)) if e.code == 409 || e.code == 422 => {
                Err(Error::Conflict(name.into()))
            }
            Err(kube::Error::Api(e)) if e.code == 404 => Err(Error::NodeNotFound(name.into())),
            Err(e) => Err(e.into()),
        }
    }
}

/// Bounded retry for conflicting patches. Attempt `n` is preceded by a delay of
/// `backoff * (n - 1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Delay after the `attempt`th failed attempt.
    pub fn delay(&self, attempt: usize) -> Duration {
        self.backoff
            .saturating_mul(u32::try_from(attempt).unwrap_or(u32::MAX))
    }
}
