mod applier;
mod cache;
mod config;
mod context;
mod controller;
pub mod eligibility;
mod error;
mod metrics;
pub mod patch;
pub mod projection;
mod queue;
mod runtime;

pub use applier::{NodeClient, RetryPolicy};
pub use cache::Cache;
pub use config::ControllerConfig;
pub use context::Context;
pub use controller::{NodeOutcome, PassSummary, reconcile_all, reconcile_node, run};
pub use error::Error;
pub use metrics::{ErrorLabels, TaintMetrics};
pub use queue::NodeQueue;
pub use runtime::start_taint_controller;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Taint placed on nodes until their daemonset pods report ready.
pub const DEFAULT_TAINT_KEY: &str = "node.vanstee.github.io/daemonset-not-ready";
