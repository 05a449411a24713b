//! In-Memory Store
//!
//! Process-local stand-in for the hosted backend. Every write is broadcast to
//! all subscribers, the writer's own echo included, just like the hosted
//! change feed. Failures and duplicate delivery can be injected.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use super::traits::{ChangeFeed, FeedSink, Store, SubscriptionId};
use crate::change::ChangeEvent;
use crate::domain::{Entity, RecordId, StoreError, StoreResult};

struct Subscriber {
    id: SubscriptionId,
    sink: FeedSink,
}

struct MemoryState<T> {
    /// Newest first
    rows: Vec<T>,
    next_id: u64,
    subscribers: Vec<Subscriber>,
    next_subscription: u64,
    failures: VecDeque<StoreError>,
    duplicate_delivery: bool,
}

impl<T> MemoryState<T> {
    fn broadcast(&mut self, payload: Value) {
        let copies = if self.duplicate_delivery { 2 } else { 1 };
        self.subscribers.retain(|subscriber| {
            (0..copies).all(|_| subscriber.sink.send(payload.clone()).is_ok())
        });
    }
}

pub struct MemoryStore<T> {
    table: String,
    state: Mutex<MemoryState<T>>,
}

impl<T: Entity + Serialize> MemoryStore<T> {
    pub fn new(table: impl Into<String>) -> Self {
        Self::with_rows(table, Vec::new())
    }

    /// Seed the store; `rows` must already be newest first. New ids continue
    /// after the highest numeric id among them.
    pub fn with_rows(table: impl Into<String>, rows: Vec<T>) -> Self {
        let next_id = rows
            .iter()
            .filter_map(|row| match row.id() {
                RecordId::Remote(id) => id.parse::<u64>().ok(),
                RecordId::Pending(_) => None,
            })
            .max()
            .unwrap_or(0)
            + 1;
        Self {
            table: table.into(),
            state: Mutex::new(MemoryState {
                rows,
                next_id,
                subscribers: Vec::new(),
                next_subscription: 1,
                failures: VecDeque::new(),
                duplicate_delivery: false,
            }),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Make the next record operation fail with `err`. Calls queue up.
    pub async fn fail_next(&self, err: StoreError) {
        self.state.lock().await.failures.push_back(err);
    }

    /// Deliver every change twice
    pub async fn set_duplicate_delivery(&self, enabled: bool) {
        self.state.lock().await.duplicate_delivery = enabled;
    }

    pub async fn rows(&self) -> Vec<T> {
        self.state.lock().await.rows.clone()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.state.lock().await.subscribers.len()
    }

    /// Push an arbitrary payload to every subscriber
    pub async fn emit_raw(&self, payload: Value) {
        self.state.lock().await.broadcast(payload);
    }

    fn emit(&self, state: &mut MemoryState<T>, event: ChangeEvent<T>) {
        state.broadcast(event.to_payload(&self.table));
    }
}

fn take_failure<T>(state: &mut MemoryState<T>) -> StoreResult<()> {
    match state.failures.pop_front() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[async_trait]
impl<T: Entity + Serialize> Store<T> for MemoryStore<T> {
    async fn create(&self, draft: &T::Draft) -> StoreResult<T> {
        let mut state = self.state.lock().await;
        take_failure(&mut state)?;
        T::validate_draft(draft).map_err(|e| StoreError::Rejected(e.to_string()))?;

        let id = RecordId::remote(state.next_id.to_string());
        state.next_id += 1;
        let mut record = T::provisional(id, draft);
        record.set_created_at(Utc::now());
        state.rows.insert(0, record.clone());
        self.emit(&mut state, ChangeEvent::Created(record.clone()));
        Ok(record)
    }

    async fn update(&self, id: &RecordId, patch: &T::Patch) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        take_failure(&mut state)?;
        T::validate_patch(patch).map_err(|e| StoreError::Rejected(e.to_string()))?;

        let row = state
            .rows
            .iter_mut()
            .find(|row| row.id() == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        row.apply_patch(patch);
        let updated = row.clone();
        self.emit(&mut state, ChangeEvent::Updated(updated));
        Ok(())
    }

    async fn delete(&self, id: &RecordId) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        take_failure(&mut state)?;

        // Deleting an absent row matches nothing and is not an error
        if let Some(pos) = state.rows.iter().position(|row| row.id() == id) {
            state.rows.remove(pos);
            self.emit(&mut state, ChangeEvent::Deleted(id.clone()));
        }
        Ok(())
    }

    async fn list(&self) -> StoreResult<Vec<T>> {
        let mut state = self.state.lock().await;
        take_failure(&mut state)?;
        Ok(state.rows.clone())
    }
}

#[async_trait]
impl<T: Entity + Serialize> ChangeFeed for MemoryStore<T> {
    async fn subscribe(&self, channel: &str, sink: FeedSink) -> StoreResult<SubscriptionId> {
        let mut state = self.state.lock().await;
        let id = SubscriptionId(state.next_subscription);
        state.next_subscription += 1;
        log::debug!("subscription {:?} joined channel {} on {}", id, channel, self.table);
        state.subscribers.push(Subscriber { id, sink });
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.subscribers.retain(|subscriber| subscriber.id != id);
        log::debug!("subscription {:?} left {}", id, self.table);
        Ok(())
    }
}
