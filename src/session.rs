//! Sync Session
//!
//! Drives a `Reconciler` against a store: every write is applied locally
//! first, then sent to the store, and compensated if the store call fails.
//! A background task pumps the change feed into the same reconciler.
//!
//! The reconciler lock is never held across a store call, so local writes and
//! feed events interleave but each runs to completion.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::change::payload_table;
use crate::config::SyncConfig;
use crate::domain::{DomainError, DomainResult, Entity, RecordId, StoreError};
use crate::reconciler::{Compensation, Confirmation, Reconciler};
use crate::repository::{ChangeFeed, Store, SubscriptionId};
use crate::view::{Counts, Filter};

type SharedState<T> = Arc<Mutex<Reconciler<T>>>;

pub struct SyncSession<T: Entity, S: Store<T> + ChangeFeed> {
    store: Arc<S>,
    state: SharedState<T>,
    changes: Arc<watch::Sender<u64>>,
    subscription: Option<SubscriptionId>,
    pump: Option<JoinHandle<()>>,
}

impl<T, S> SyncSession<T, S>
where
    T: Entity + DeserializeOwned,
    S: Store<T> + ChangeFeed + 'static,
{
    /// Subscribe to the feed, load the current records, then start applying
    /// feed events. Events that arrive during the load are buffered and
    /// replayed on top of it.
    pub async fn open(store: Arc<S>, config: &SyncConfig) -> DomainResult<Self> {
        let (sink, feed) = mpsc::unbounded_channel();
        let subscription = store.subscribe(&config.channel, sink).await?;

        let records = match store.list().await {
            Ok(records) => records,
            Err(err) => {
                if let Err(unsub_err) = store.unsubscribe(subscription).await {
                    log::warn!("failed to unsubscribe after load error: {}", unsub_err);
                }
                return Err(err.into());
            }
        };

        let reconciler = Reconciler::with_items(records);
        log::info!(
            "session opened on {} ({} records, channel {})",
            config.table,
            reconciler.len(),
            config.channel
        );
        let (changes, _) = watch::channel(reconciler.revision());
        let changes = Arc::new(changes);
        let state = Arc::new(Mutex::new(reconciler));
        let pump = tokio::spawn(pump_feed(feed, state.clone(), changes.clone(), config.table.clone()));

        Ok(Self {
            store,
            state,
            changes,
            subscription: Some(subscription),
            pump: Some(pump),
        })
    }

    async fn with_state<R>(&self, f: impl FnOnce(&mut Reconciler<T>) -> R) -> R {
        let mut state = self.state.lock().await;
        let out = f(&mut *state);
        self.changes.send_replace(state.revision());
        out
    }

    async fn compensate(&self, undo: Compensation<T>, err: &StoreError) {
        let reverted = self.with_state(|state| state.revert(undo)).await;
        log::warn!("store call failed ({}), local change reverted: {}", err, reverted);
    }

    fn require_persisted(id: &RecordId) -> DomainResult<()> {
        if id.is_pending() {
            return Err(DomainError::NotPersisted(id.clone()));
        }
        Ok(())
    }

    // ========================
    // Writes
    // ========================

    /// Show the record immediately, then persist it. Returns the store id.
    pub async fn create(&self, draft: T::Draft) -> DomainResult<RecordId> {
        let pending = self.with_state(|state| state.apply_local_create(&draft)).await?;

        let record = match self.store.create(&draft).await {
            Ok(record) => record,
            Err(err) => {
                log::warn!("create failed, dropping {}: {}", pending, err);
                self.with_state(|state| state.rollback(pending)).await;
                return Err(err.into());
            }
        };

        let id = record.id().clone();
        let outcome = self.with_state(|state| state.confirm_create(pending, record)).await;
        match outcome {
            Confirmation::Orphaned => {
                log::info!("{} was deleted before {} was saved, deleting it remotely", pending, id);
                self.store.delete(&id).await?;
            }
            Confirmation::Inserted => {
                log::debug!("{} was paired with another record, {} added separately", pending, id);
            }
            Confirmation::Replaced | Confirmation::Merged => {}
        }
        Ok(id)
    }

    pub async fn update(&self, id: &RecordId, patch: T::Patch) -> DomainResult<()> {
        Self::require_persisted(id)?;
        let undo = self.with_state(|state| state.apply_local_update(id, &patch)).await?;
        if let Err(err) = self.store.update(id, &patch).await {
            self.compensate(undo, &err).await;
            return Err(err.into());
        }
        Ok(())
    }

    /// Flip the completion flag; returns the new value
    pub async fn toggle(&self, id: &RecordId) -> DomainResult<bool> {
        Self::require_persisted(id)?;
        let applied = self.with_state(|state| state.apply_local_toggle(id)).await?;
        if let Err(err) = self.store.update(id, &T::completion_patch(applied)).await {
            let undo = Compensation::Untoggle { id: id.clone(), applied };
            self.compensate(undo, &err).await;
            return Err(err.into());
        }
        Ok(applied)
    }

    /// Remove the record. A provisional record is only removed locally; its
    /// create is cleaned up remotely once it completes.
    pub async fn delete(&self, id: &RecordId) -> DomainResult<()> {
        let removed = self.with_state(|state| state.apply_local_delete(id)).await?;
        if id.is_pending() {
            return Ok(());
        }
        if let Err(err) = self.store.delete(id).await {
            self.compensate(Compensation::Reinsert(removed), &err).await;
            return Err(err.into());
        }
        Ok(())
    }

    /// Reload the confirmed records from the store
    pub async fn refresh(&self) -> DomainResult<()> {
        let records = self.store.list().await?;
        self.with_state(|state| state.hydrate(records)).await;
        Ok(())
    }

    // ========================
    // Reads
    // ========================

    pub async fn view(&self, filter: Filter) -> Vec<T> {
        self.state.lock().await.view(filter).to_vec()
    }

    pub async fn counts(&self) -> Counts {
        self.state.lock().await.counts()
    }

    pub async fn get(&self, id: &RecordId) -> Option<T> {
        self.state.lock().await.get(id).cloned()
    }

    /// Receives the reconciler revision after every state change
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Release the change-feed subscription and stop the pump
    pub async fn close(mut self) -> DomainResult<()> {
        let result = match self.subscription.take() {
            Some(subscription) => self.store.unsubscribe(subscription).await,
            None => Ok(()),
        };
        if let Some(pump) = self.pump.take() {
            pump.abort();
            if let Err(err) = pump.await {
                if !err.is_cancelled() {
                    log::warn!("change feed pump ended abnormally: {}", err);
                }
            }
        }
        log::info!("session closed");
        result.map_err(DomainError::from)
    }
}

impl<T: Entity, S: Store<T> + ChangeFeed> Drop for SyncSession<T, S> {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            log::warn!("session dropped without close; feed subscription {:?} left open", self.subscription);
            pump.abort();
        }
    }
}

async fn pump_feed<T: Entity + DeserializeOwned>(
    mut feed: mpsc::UnboundedReceiver<Value>,
    state: SharedState<T>,
    changes: Arc<watch::Sender<u64>>,
    table: String,
) {
    while let Some(payload) = feed.recv().await {
        if let Some(other) = payload_table(&payload).filter(|name| *name != table) {
            log::debug!("ignoring change for table {}", other);
            continue;
        }
        let revision = {
            let mut state = state.lock().await;
            state.apply_remote_payload(&payload);
            state.revision()
        };
        changes.send_replace(revision);
    }
    log::debug!("change feed for {} closed", table);
}
