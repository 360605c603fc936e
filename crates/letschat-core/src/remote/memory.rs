use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use super::{ApiError, RemoteStore, SnapshotCallback, SortDirection, SubscriptionHandle};
use crate::models::{Message, Snapshot};

#[derive(Default)]
struct Inner {
    messages: Vec<Message>,
    subscribers: HashMap<u64, (SortDirection, SnapshotCallback)>,
    next_id: u64,
}

/// In-process message collection with synchronous push delivery.
///
/// New subscribers receive the current snapshot immediately, and every
/// append pushes a fresh snapshot to all subscribers.
#[derive(Clone, Default)]
pub struct MemoryRemote {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the collection without notifying subscribers
    pub fn with_messages(messages: Vec<Message>) -> Self {
        let remote = Self::new();
        remote.lock().messages = messages;
        remote
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ordered(messages: &[Message], direction: SortDirection) -> Snapshot {
        let snapshot = Snapshot::newest_first(messages.to_vec());
        match direction {
            SortDirection::Descending => snapshot,
            SortDirection::Ascending => {
                Snapshot::new(snapshot.chronological().cloned().collect())
            }
        }
    }

    fn notify_all(&self) {
        // Collect first: callbacks may re-enter the store
        let deliveries: Vec<(Snapshot, SnapshotCallback)> = {
            let inner = self.lock();
            inner
                .subscribers
                .values()
                .map(|(direction, callback)| {
                    (Self::ordered(&inner.messages, *direction), Arc::clone(callback))
                })
                .collect()
        };

        for (snapshot, callback) in deliveries {
            callback(Ok(snapshot));
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    fn subscribe(
        &self,
        order_by: &str,
        direction: SortDirection,
        callback: SnapshotCallback,
    ) -> SubscriptionHandle {
        let (id, initial) = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.insert(id, (direction, Arc::clone(&callback)));
            (id, Self::ordered(&inner.messages, direction))
        };
        debug!(id, order_by, "Loopback subscription started");

        callback(Ok(initial));

        let inner = Arc::clone(&self.inner);
        SubscriptionHandle::new(move || {
            let mut inner = inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.subscribers.remove(&id);
            debug!(id, "Loopback subscription cancelled");
        })
    }

    async fn append(&self, message: &Message) -> Result<(), ApiError> {
        {
            let mut inner = self.lock();
            if inner.messages.iter().any(|m| m.id == message.id) {
                return Err(ApiError::InvalidResponse(format!(
                    "Document {} already exists",
                    message.id
                )));
            }
            inner.messages.push(message.clone());
        }
        self.notify_all();
        Ok(())
    }
}
