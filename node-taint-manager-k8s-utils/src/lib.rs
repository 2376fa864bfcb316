mod index;

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, TryStreamExt};
use k8s_openapi::serde::de::DeserializeOwned;
use kube::runtime::reflector::{ReflectHandle, Store};
use kube::runtime::{WatchStreamExt, reflector, watcher};
use kube::{Api, Resource};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

pub use index::{Index, IndexFn};

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to create store: {0}")]
    StoreCreation(String),

    #[error("timed out waiting for store to sync")]
    Timeout,

    #[error("cancelled before store synced")]
    Cancelled,

    #[error("kube error: {0}")]
    KubeError(#[from] kube::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// Buffer for shared subscribers. A slow subscriber holds back the reflector
// once this many events are queued.
const SUBSCRIBER_BUFFER: usize = 1000;

/// How a reflector store is fed and how long to wait for its first sync.
pub struct StoreConfig<K>
where
    K: Resource,
    K::DynamicType: Eq + Hash + Clone,
{
    pub watcher: watcher::Config,
    /// Applied to every object before it is written to the store.
    pub projection: fn(&mut K),
    /// Secondary index kept in step with the store.
    pub index: Option<Arc<Index<K>>>,
    pub timeout: Option<Duration>,
}

impl<K> Default for StoreConfig<K>
where
    K: Resource,
    K::DynamicType: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self {
            watcher: watcher::Config::default(),
            projection: |_| {},
            index: None,
            timeout: None,
        }
    }
}

/// Starts a watch backed reflector and waits until the store, and the index when
/// one is given, have completed their initial list. The watch runs until
/// `cancel` fires.
pub async fn create_store_and_subscriber<K>(
    api: Api<K>,
    config: StoreConfig<K>,
    cancel: CancellationToken,
) -> Result<(Store<K>, ReflectHandle<K>)>
where
    K: Resource + Send + Clone + Debug + DeserializeOwned + Sync + 'static,
    <K as Resource>::DynamicType: Default + Eq + Send + Sync + DeserializeOwned + Hash + Clone,
{
    let StoreConfig {
        watcher: watcher_config,
        projection,
        index,
        timeout,
    } = config;

    let (store, writer) = reflector::store_shared(SUBSCRIBER_BUFFER);
    let subscriber: ReflectHandle<K> = writer
        .subscribe()
        .ok_or_else(|| Error::StoreCreation("failed to create subscriber".into()))?;

    let stream_index = index.clone();
    // the index sees each event before the store, so a ready store implies a
    // swapped index even while the reflector waits on slow subscribers
    let stream = watcher(api, watcher_config)
        .default_backoff()
        .modify(projection)
        .inspect_ok(move |ev| {
            if let Some(index) = stream_index.as_ref() {
                index.apply_watcher_event(ev);
            }
        })
        .reflect_shared(writer)
        .for_each(move |res| {
            match res {
                Ok(ev) => {
                    trace!("received event: {:?}", ev);
                }
                Err(e) => {
                    error!(%e, "unexpected error with stream")
                }
            }
            futures::future::ready(())
        });

    let stream_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = stream => {},
            _ = stream_cancel.cancelled() => {},
        }
    });

    let synced = async {
        store
            .wait_until_ready()
            .await
            .map_err(|e| Error::StoreCreation(e.to_string()))?;
        if let Some(index) = index.as_ref() {
            index.wait_until_ready().await;
        }
        Ok::<_, Error>(())
    };
    let wait = async {
        tokio::select! {
            res = synced => res,
            _ = cancel.cancelled() => Err(Error::Cancelled),
        }
    };
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| Error::Timeout)??,
        None => wait.await?,
    }
    Ok((store, subscriber))
}

#[cfg(test)]
mod tests {
    use http::{Request, Response};
    use k8s_openapi::api::core::v1::Node;
    use kube::Client;
    use kube::client::Body;
    use tower_test::mock;

    use super::*;

    // an API server that accepts requests and never answers them
    fn silent_api() -> (Api<Node>, mock::Handle<Request<Body>, Response<Body>>) {
        let (service, handle) = mock::pair::<Request<Body>, Response<Body>>();
        (Api::all(Client::new(service, "default")), handle)
    }

    #[tokio::test]
    async fn test_unsynced_store_times_out() {
        let (api, _handle) = silent_api();
        let cancel = CancellationToken::new();
        let res = create_store_and_subscriber(
            api,
            StoreConfig {
                timeout: Some(Duration::from_millis(50)),
                ..Default::default()
            },
            cancel.clone(),
        )
        .await;
        cancel.cancel();
        assert!(matches!(res, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn test_cancel_before_sync() {
        let (api, _handle) = silent_api();
        let cancel = CancellationToken::new();
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel();
            }
        });
        let res = tokio::time::timeout(
            Duration::from_secs(5),
            create_store_and_subscriber(api, StoreConfig::default(), cancel),
        )
        .await
        .expect("returned after cancel");
        assert!(matches!(res, Err(Error::Cancelled)));
    }
}
