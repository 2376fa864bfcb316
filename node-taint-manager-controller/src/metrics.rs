use std::time::Duration;

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

use crate::Error;

const TIME_TO_READY_BUCKETS: [f64; 22] = [
    0.1, 1.0, 2.0, 3.0, 5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 35.0, 40.0, 45.0, 50.0, 55.0, 60.0,
    70.0, 80.0, 90.0, 100.0, 110.0, 120.0,
];

#[derive(Clone)]
pub struct TaintMetrics {
    pub nodes_monitored: Gauge,
    pub nodes_untainted: Counter,
    pub time_to_ready: Histogram,
    pub failures: Family<ErrorLabels, Counter>,
}

impl Default for TaintMetrics {
    fn default() -> Self {
        Self {
            nodes_monitored: Gauge::default(),
            nodes_untainted: Counter::default(),
            time_to_ready: Histogram::new(TIME_TO_READY_BUCKETS.into_iter()),
            failures: Family::default(),
        }
    }
}

impl TaintMetrics {
    /// Register the taint controller metrics to start tracking them.
    pub fn new(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "nodes_monitored",
            "The total number of nodes being tracked",
            metrics.nodes_monitored.clone(),
        );
        registry.register(
            "nodes_untainted",
            "The number of nodes determined ready and untainted",
            metrics.nodes_untainted.clone(),
        );
        registry.register(
            "time_to_ready",
            "Seconds from node creation until all its daemonset pods were ready and the taint was removed",
            metrics.time_to_ready.clone(),
        );
        registry.register(
            "reconcile_failures",
            "Number of node reconciliation errors",
            metrics.failures.clone(),
        );
        metrics
    }

    pub fn set_nodes_monitored(&self, nodes: usize) {
        self.nodes_monitored
            .set(i64::try_from(nodes).unwrap_or(i64::MAX));
    }

    /// Counts a successful untaint. `time_to_ready` is only given once no gate
    /// is left on the node.
    pub fn record_untaint(&self, time_to_ready: Option<Duration>) {
        self.nodes_untainted.inc();
        if let Some(elapsed) = time_to_ready {
            self.time_to_ready.observe(elapsed.as_secs_f64());
        }
    }

    pub fn count_failure(&self, e: &Error) {
        self.failures
            .get_or_create(&ErrorLabels {
                error: e.metric_label(),
            })
            .inc();
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub error: String,
}
