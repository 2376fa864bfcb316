use crate::{Cache, ControllerConfig, NodeClient, TaintMetrics};

pub struct Context<C: NodeClient> {
    pub client: C,
    pub cache: Cache,
    pub config: ControllerConfig,
    pub metrics: TaintMetrics,
}
