use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    extract::State as AxumState,
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};
use http::StatusCode;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{Result, http::shutdown};

const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

#[derive(Clone)]
pub(crate) struct State {
    ready: CancellationToken,
}

impl State {
    pub fn new(token: CancellationToken) -> Self {
        Self { ready: token }
    }

    pub fn ready(&self) -> Readiness {
        if self.ready.is_cancelled() {
            Readiness::Ready
        } else {
            Readiness::NotReady
        }
    }

    pub fn metrics(&self) -> String {
        let mut buffer = String::new();
        let Ok(registry) = crate::metrics::REGISTRY.read() else {
            warn!("metrics registry lock poisoned");
            return buffer;
        };
        if let Err(e) = prometheus_client::encoding::text::encode(&mut buffer, &registry) {
            warn!(error = %e, "failed to encode metrics");
            buffer.clear();
        }
        buffer
    }
}

pub(crate) async fn serve(
    addr: SocketAddr,
    state: Arc<State>,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("metrics listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown(cancel))
        .await?;
    Ok(())
}

fn router(state: Arc<State>) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/readyz", get(readyz))
        .with_state(state)
}

async fn metrics(AxumState(handler): AxumState<Arc<State>>) -> Response {
    (
        [(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)],
        handler.metrics(),
    )
        .into_response()
}

async fn readyz(AxumState(handler): AxumState<Arc<State>>) -> Readiness {
    handler.ready()
}

#[derive(Debug, PartialEq)]
pub(crate) enum Readiness {
    Ready,
    NotReady,
}

impl IntoResponse for Readiness {
    fn into_response(self) -> Response {
        match self {
            Readiness::Ready => (StatusCode::OK, "Ok").into_response(),
            Readiness::NotReady => {
                (StatusCode::INTERNAL_SERVER_ERROR, "NotReady").into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_follows_token() {
        let ready = CancellationToken::new();
        let state = State::new(ready.child_token());
        assert_eq!(state.ready(), Readiness::NotReady);
        assert_eq!(
            state.ready().into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        ready.cancel();
        assert_eq!(state.ready(), Readiness::Ready);
        assert_eq!(state.ready().into_response().status(), StatusCode::OK);
    }

    #[test]
    fn test_metrics_are_prefixed() {
        {
            let mut registry = crate::metrics::REGISTRY.write().expect("registry");
            node_taint_manager_controller::TaintMetrics::new(&mut registry);
        }
        let body = State::new(CancellationToken::new()).metrics();
        assert!(body.contains("node_taint_manager_nodes_monitored"));
        assert!(body.ends_with("# EOF\n"));
    }
}
