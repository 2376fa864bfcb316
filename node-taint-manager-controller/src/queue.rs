use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use ahash::{HashSet, HashSetExt};
use tokio::sync::Notify;

/// FIFO of node names awaiting reconciliation. A name already waiting is not
/// queued twice.
pub struct NodeQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

struct QueueState {
    order: VecDeque<String>,
    pending: HashSet<String>,
}

impl Default for NodeQueue {
    fn default() -> Self {
        Self {
            state: Mutex::new(QueueState {
                order: VecDeque::new(),
                pending: HashSet::new(),
            }),
            notify: Notify::new(),
        }
    }
}

impl NodeQueue {
    /// Returns false when the node was already waiting.
    pub fn push(&self, name: String) -> bool {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if !state.pending.insert(name.clone()) {
                return false;
            }
            state.order.push_back(name);
        }
        self.notify.notify_one();
        true
    }

    pub fn try_pop(&self) -> Option<String> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let name = state.order.pop_front()?;
        state.pending.remove(&name);
        Some(name)
    }

    /// Waits for the next node name.
    pub async fn next(&self) -> String {
        loop {
            if let Some(name) = self.try_pop() {
                return name;
            }
            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_dedup_keeps_first_position() {
        let queue = NodeQueue::default();
        assert!(queue.push("n1".into()));
        assert!(queue.push("n2".into()));
        assert!(!queue.push("n1".into()));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.try_pop().as_deref(), Some("n1"));
        // popped names can be queued again
        assert!(queue.push("n1".into()));
        assert_eq!(queue.try_pop().as_deref(), Some("n2"));
        assert_eq!(queue.try_pop().as_deref(), Some("n1"));
        assert!(queue.is_empty());
        assert_eq!(queue.try_pop(), None);
    }

    #[tokio::test]
    async fn test_next_wakes_on_push() {
        let queue = Arc::new(NodeQueue::default());
        let waiter = tokio::spawn({
            let queue = queue.clone();
            async move { queue.next().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push("n1".into());

        let name = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("woken")
            .expect("join");
        assert_eq!(name, "n1");
    }
}
