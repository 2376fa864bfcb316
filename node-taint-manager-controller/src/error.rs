use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("kube error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("kube utils error: {0}")]
    KubeUtils(#[from] node_taint_manager_k8s_utils::Error),

    #[error("node {0} was modified concurrently")]
    Conflict(String),

    #[error("node {0} not found")]
    NodeNotFound(String),

    #[error("node {0} has no resource version")]
    MissingResourceVersion(String),

    #[error("invalid patch for node {node}: {reason}")]
    InvalidPatch { node: String, reason: String },

    #[error(transparent)]
    JsonConversion(#[from] serde_json::Error),

    #[error("gave up patching node {node} after {attempts} attempts")]
    RetriesExhausted { node: String, attempts: usize },

    #[error("timed out waiting for caches to sync")]
    Timeout,

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub fn metric_label(&self) -> String {
        match self {
            Error::KubeError(_) => "kube",
            Error::KubeUtils(_) => "kube_utils",
            Error::Conflict(_) => "conflict",
            Error::NodeNotFound(_) => "node_not_found",
            Error::MissingResourceVersion(_) => "missing_resource_version",
            Error::InvalidPatch { .. } => "invalid_patch",
            Error::JsonConversion(_) => "json_conversion",
            Error::RetriesExhausted { .. } => "retries_exhausted",
            Error::Timeout => "timeout",
            Error::InvalidConfig(_) => "invalid_config",
        }
        .into()
    }

    /// Whether startup was interrupted by shutdown before the caches synced.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Error::KubeUtils(node_taint_manager_k8s_utils::Error::Cancelled)
        )
    }

    /// Whether the node changed between the read and the patch.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}
