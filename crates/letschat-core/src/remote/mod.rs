//! Remote document store access.
//!
//! This module defines the `RemoteStore` seam used by the sync cache and
//! its two implementations:
//!
//! - `FirestoreClient`: Cloud Firestore over its REST API
//! - `MemoryRemote`: an in-process loopback store
//!
//! Subscriptions are push based. Each call to `subscribe` returns a
//! `SubscriptionHandle`; cancelling it (or dropping it) stops delivery.

pub mod document;
pub mod error;
pub mod firestore;
pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{Message, Snapshot};

pub use error::ApiError;
pub use firestore::{FirestoreClient, FirestoreSettings};
pub use memory::MemoryRemote;

/// Field the message collection is ordered by
pub const ORDER_BY_FIELD: &str = "createdAt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_firestore(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASCENDING",
            SortDirection::Descending => "DESCENDING",
        }
    }
}

/// Receives every new snapshot, or the error that ended the subscription.
pub type SnapshotCallback = Arc<dyn Fn(Result<Snapshot, ApiError>) + Send + Sync>;

/// Cancels a subscription exactly once, explicitly or on drop.
pub struct SubscriptionHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle for a subscription that holds no resources
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    /// Stop delivery. Later calls do nothing.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Start pushing snapshots of the message collection ordered by
    /// `order_by` to `callback` until the returned handle is cancelled.
    fn subscribe(
        &self,
        order_by: &str,
        direction: SortDirection,
        callback: SnapshotCallback,
    ) -> SubscriptionHandle;

    /// Durably append one message to the collection.
    async fn append(&self, message: &Message) -> Result<(), ApiError>;
}
