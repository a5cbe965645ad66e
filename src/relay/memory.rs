//! In-process relay store

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

use super::{tree, RelayPath, RelayStore, Subscription};

struct Subscriber {
    path: RelayPath,
    tx: mpsc::UnboundedSender<Option<Value>>,
    /// Last value delivered, so unchanged paths are not re-notified
    last: Option<Value>,
}

#[derive(Default)]
struct Inner {
    tree: Mutex<Value>,
    subscribers: DashMap<u64, Subscriber>,
    next_subscriber: AtomicU64,
}

/// Relay store held entirely in memory. Clones share the same tree, which
/// lets several simulated clients talk to each other in one process.
#[derive(Clone, Default)]
pub struct MemoryRelay {
    inner: Arc<Inner>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value at `path`
    pub fn get(&self, path: &RelayPath) -> Option<Value> {
        tree::get(&self.inner.tree.lock(), path).cloned()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    fn write(&self, path: &RelayPath, op: impl FnOnce(&mut Value)) {
        // Snapshot every affected subscriber's value under the tree lock so
        // deliveries reflect one consistent state.
        let deliveries: Vec<(u64, Option<Value>)> = {
            let mut root = self.inner.tree.lock();
            op(&mut root);
            self.inner
                .subscribers
                .iter()
                .filter(|s| s.path.overlaps(path))
                .map(|s| (*s.key(), tree::get(&root, &s.path).cloned()))
                .collect()
        };

        let mut closed = Vec::new();
        for (id, value) in deliveries {
            let Some(mut subscriber) = self.inner.subscribers.get_mut(&id) else {
                continue;
            };
            if subscriber.last == value {
                continue;
            }
            subscriber.last = value.clone();
            if subscriber.tx.send(value).is_err() {
                closed.push(id);
            }
        }
        for id in closed {
            self.inner.subscribers.remove(&id);
        }
        trace!(path = %path, "relay write");
    }
}

impl RelayStore for MemoryRelay {
    fn set(&self, path: &RelayPath, value: Value) {
        self.write(path, |root| tree::set(root, path, value));
    }

    fn update(&self, path: &RelayPath, value: Value) {
        self.write(path, |root| tree::merge(root, path, value));
    }

    fn delete(&self, path: &RelayPath) {
        self.write(path, |root| tree::set(root, path, Value::Null));
    }

    fn subscribe(&self, path: &RelayPath) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let current = self.get(path);
        let _ = tx.send(current.clone());

        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.insert(
            id,
            Subscriber {
                path: path.clone(),
                tx,
                last: current,
            },
        );
        rx
    }
}
