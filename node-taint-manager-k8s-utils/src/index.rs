use std::hash::Hash;
use std::sync::{Arc, PoisonError, RwLock};

use ahash::{HashMap, HashMapExt};
use kube::Resource;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use tokio::sync::watch;

/// Computes the bucket an object belongs to. `None` leaves it unindexed.
pub type IndexFn<K> = fn(&K) -> Option<String>;

/// Secondary index over a reflector store, updated incrementally from the same
/// watcher events that feed the store.
pub struct Index<K>
where
    K: Resource,
    K::DynamicType: Eq + Hash + Clone,
{
    index_fn: IndexFn<K>,
    inner: RwLock<Inner<K>>,
    // flips once the first relist has been swapped in
    ready: watch::Sender<bool>,
}

struct Inner<K>
where
    K: Resource,
    K::DynamicType: Eq + Hash + Clone,
{
    live: Buckets<K>,
    // filled during a relist and swapped in on InitDone
    buffer: Option<Buckets<K>>,
}

struct Buckets<K>
where
    K: Resource,
    K::DynamicType: Eq + Hash + Clone,
{
    buckets: HashMap<String, HashMap<ObjectRef<K>, Arc<K>>>,
    keys: HashMap<ObjectRef<K>, String>,
}

impl<K> Buckets<K>
where
    K: Resource,
    K::DynamicType: Eq + Hash + Clone,
{
    fn new() -> Self {
        Self {
            buckets: HashMap::new(),
            keys: HashMap::new(),
        }
    }

    fn insert(&mut self, obj_ref: ObjectRef<K>, obj: Arc<K>, key: Option<String>) {
        self.remove(&obj_ref);
        let Some(key) = key else {
            return;
        };
        self.buckets
            .entry(key.clone())
            .or_default()
            .insert(obj_ref.clone(), obj);
        self.keys.insert(obj_ref, key);
    }

    fn remove(&mut self, obj_ref: &ObjectRef<K>) {
        let Some(old) = self.keys.remove(obj_ref) else {
            return;
        };
        if let Some(bucket) = self.buckets.get_mut(&old) {
            bucket.remove(obj_ref);
            if bucket.is_empty() {
                self.buckets.remove(&old);
            }
        }
    }
}

impl<K> Index<K>
where
    K: Resource + Clone,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    pub fn new(index_fn: IndexFn<K>) -> Self {
        Self {
            index_fn,
            inner: RwLock::new(Inner {
                live: Buckets::new(),
                buffer: None,
            }),
            ready: watch::Sender::new(false),
        }
    }

    pub fn apply_watcher_event(&self, event: &watcher::Event<K>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match event {
            watcher::Event::Apply(obj) => {
                let key = (self.index_fn)(obj);
                inner
                    .live
                    .insert(ObjectRef::from_obj(obj), Arc::new(obj.clone()), key);
            }
            watcher::Event::Delete(obj) => {
                inner.live.remove(&ObjectRef::from_obj(obj));
            }
            watcher::Event::Init => {
                inner.buffer = Some(Buckets::new());
            }
            watcher::Event::InitApply(obj) => {
                let key = (self.index_fn)(obj);
                let buffer = inner.buffer.get_or_insert_with(Buckets::new);
                buffer.insert(ObjectRef::from_obj(obj), Arc::new(obj.clone()), key);
            }
            watcher::Event::InitDone => {
                if let Some(buffer) = inner.buffer.take() {
                    inner.live = buffer;
                }
                self.ready.send_replace(true);
            }
        }
    }

    /// Whether the first complete listing has been indexed.
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Resolves once the first complete listing has been indexed.
    pub async fn wait_until_ready(&self) {
        let mut ready = self.ready.subscribe();
        // the sender lives in self, so the channel cannot close while waiting
        let _ = ready.wait_for(|ready| *ready).await;
    }

    /// Objects currently indexed under `key`.
    pub fn get(&self, key: &str) -> Vec<Arc<K>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .live
            .buckets
            .get(key)
            .map(|bucket| bucket.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn keys(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.live.buckets.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.live.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
