pub mod config;
pub mod controller;
pub mod http;
pub mod kubernetes;
pub mod metrics;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("kube error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("failed to create config from kubeconfig: {0}")]
    KubeConfig(#[from] kube::config::KubeconfigError),

    #[error("failed to infer cluster config: {0}")]
    InferConfig(#[from] kube::config::InferConfigError),

    #[error("failed to parse config file: {0}")]
    YamlConversion(#[from] serde_yaml::Error),

    #[error("controller error: {0}")]
    Controller(#[from] node_taint_manager_controller::Error),

    #[error("task failed: {0}")]
    Task(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error only reports that shutdown was requested.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Controller(e) if e.is_cancelled())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
