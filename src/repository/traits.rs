//! Repository Layer - Core Traits
//!
//! The hosted backend as seen from the client: four record operations and a
//! change feed. Implementations can talk to a hosted service or stay in memory.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::domain::{Entity, RecordId, StoreResult};

/// Receives raw change payloads for one subscription
pub type FeedSink = mpsc::UnboundedSender<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Core store trait for CRUD operations
///
/// Generic over any Entity type.
/// Every call may fail with a transport, permission or validation error.
#[async_trait]
pub trait Store<T: Entity>: Send + Sync {
    /// Persist a new record; the returned record carries the store id
    async fn create(&self, draft: &T::Draft) -> StoreResult<T>;

    async fn update(&self, id: &RecordId, patch: &T::Patch) -> StoreResult<()>;

    async fn delete(&self, id: &RecordId) -> StoreResult<()>;

    /// All records, newest first
    async fn list(&self) -> StoreResult<Vec<T>>;
}

/// Push notifications for inserts, updates and deletes
///
/// Delivery is at-least-once and unordered relative to `Store` calls.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, channel: &str, sink: FeedSink) -> StoreResult<SubscriptionId>;

    /// Stop delivery. Unknown ids are ignored.
    async fn unsubscribe(&self, id: SubscriptionId) -> StoreResult<()>;
}
