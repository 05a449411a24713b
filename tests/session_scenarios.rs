//! Session Scenarios
//!
//! End-to-end behaviour of `SyncSession` over `MemoryStore`: optimistic
//! writes, compensation on failure, and change-feed merging.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::{sleep, timeout};

use task_sync::repository::FeedSink;
use task_sync::{
    ChangeFeed, DomainError, Filter, MemoryStore, PendingId, RecordId, Store, StoreError, StoreResult, SubscriptionId,
    SyncConfig, SyncSession, Task, TaskDraft, TaskPatch,
};

type Session = SyncSession<Task, MemoryStore<Task>>;

/// Store whose `create` stays in flight for `delay`, optionally after another
/// client inserted `rival` into the same table
struct SlowCreateStore {
    inner: Arc<MemoryStore<Task>>,
    rival: Option<TaskDraft>,
    delay: Duration,
}

#[async_trait]
impl Store<Task> for SlowCreateStore {
    async fn create(&self, draft: &TaskDraft) -> StoreResult<Task> {
        if let Some(rival) = &self.rival {
            self.inner.create(rival).await?;
        }
        sleep(self.delay).await;
        self.inner.create(draft).await
    }

    async fn update(&self, id: &RecordId, patch: &TaskPatch) -> StoreResult<()> {
        self.inner.update(id, patch).await
    }

    async fn delete(&self, id: &RecordId) -> StoreResult<()> {
        self.inner.delete(id).await
    }

    async fn list(&self) -> StoreResult<Vec<Task>> {
        self.inner.list().await
    }
}

#[async_trait]
impl ChangeFeed for SlowCreateStore {
    async fn subscribe(&self, channel: &str, sink: FeedSink) -> StoreResult<SubscriptionId> {
        self.inner.subscribe(channel, sink).await
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> StoreResult<()> {
        self.inner.unsubscribe(id).await
    }
}

async fn setup_slow_session(rival: Option<TaskDraft>) -> (Arc<MemoryStore<Task>>, SyncSession<Task, SlowCreateStore>) {
    let inner = Arc::new(MemoryStore::new("tasks"));
    let store = Arc::new(SlowCreateStore {
        inner: inner.clone(),
        rival,
        delay: Duration::from_millis(50),
    });
    let session = SyncSession::open(store, &SyncConfig::default())
        .await
        .expect("Failed to open session");
    (inner, session)
}

async fn setup_session() -> (Arc<MemoryStore<Task>>, Session) {
    let store = Arc::new(MemoryStore::new("tasks"));
    let session = Session::open(store.clone(), &SyncConfig::default())
        .await
        .expect("Failed to open session");
    (store, session)
}

/// Poll the session until `check` holds for the full list
async fn wait_until<S>(session: &SyncSession<Task, S>, check: impl Fn(&[Task]) -> bool) -> Vec<Task>
where
    S: Store<Task> + ChangeFeed + 'static,
{
    let polled = timeout(Duration::from_secs(2), async {
        loop {
            let tasks = session.view(Filter::All).await;
            if check(&tasks) {
                return tasks;
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    polled.expect("condition not reached in time")
}

/// Give the feed pump a chance to drain what is already queued
async fn settle() {
    sleep(Duration::from_millis(50)).await;
}

fn titles(tasks: &[Task]) -> Vec<&str> {
    tasks.iter().map(|t| t.title.as_str()).collect()
}

#[tokio::test]
async fn test_create_echo_is_not_duplicated() {
    let (_store, session) = setup_session().await;

    let id = session.create(TaskDraft::new("Buy milk", "2 litres")).await.unwrap();
    assert_eq!(id, RecordId::remote("1"));

    settle().await;
    let tasks = wait_until(&session, |tasks| tasks.len() == 1).await;
    assert_eq!(tasks[0].id, id);
    assert!(tasks[0].created_at.is_some());
}

#[tokio::test]
async fn test_identical_creates_stay_distinct() {
    let (_store, session) = setup_session().await;

    let first = session.create(TaskDraft::new("Same", "same")).await.unwrap();
    let second = session.create(TaskDraft::new("Same", "same")).await.unwrap();
    assert_ne!(first, second);

    settle().await;
    let tasks = wait_until(&session, |tasks| tasks.len() == 2).await;
    assert!(tasks.iter().all(|t| t.id.is_remote()));
}

#[tokio::test]
async fn test_failed_create_rolls_back() {
    let (store, session) = setup_session().await;
    store.fail_next(StoreError::Transport("offline".to_string())).await;

    let err = session.create(TaskDraft::new("Lost", "x")).await.unwrap_err();
    assert_eq!(err, DomainError::Store(StoreError::Transport("offline".to_string())));
    assert!(session.view(Filter::All).await.is_empty());
    assert!(store.rows().await.is_empty());
}

#[tokio::test]
async fn test_invalid_draft_never_reaches_store() {
    let (store, session) = setup_session().await;

    let err = session.create(TaskDraft::new("  ", "x")).await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));
    assert!(session.view(Filter::All).await.is_empty());
    assert!(store.rows().await.is_empty());
}

#[tokio::test]
async fn test_failed_toggle_is_reverted() {
    let (store, session) = setup_session().await;
    let id = session.create(TaskDraft::new("Toggle me", "x")).await.unwrap();
    settle().await;

    store.fail_next(StoreError::Permission("row level security".to_string())).await;
    assert!(session.toggle(&id).await.is_err());

    let task = session.get(&id).await.expect("task still listed");
    assert!(!task.completed);
}

#[tokio::test]
async fn test_toggle_persists() {
    let (store, session) = setup_session().await;
    let id = session.create(TaskDraft::new("Toggle me", "x")).await.unwrap();

    assert!(session.toggle(&id).await.unwrap());
    settle().await;

    assert!(session.get(&id).await.unwrap().completed);
    assert!(store.rows().await[0].completed);
}

#[tokio::test]
async fn test_failed_update_is_reverted() {
    let (store, session) = setup_session().await;
    let id = session.create(TaskDraft::new("Edit me", "before")).await.unwrap();
    settle().await;

    store.fail_next(StoreError::Transport("timeout".to_string())).await;
    assert!(session.update(&id, TaskPatch::description("after")).await.is_err());

    assert_eq!(session.get(&id).await.unwrap().description, "before");
}

#[tokio::test]
async fn test_failed_delete_reinserts_in_place() {
    let (store, session) = setup_session().await;
    session.create(TaskDraft::new("Older", "x")).await.unwrap();
    let id = session.create(TaskDraft::new("Newer", "x")).await.unwrap();
    settle().await;

    store.fail_next(StoreError::Transport("offline".to_string())).await;
    assert!(session.delete(&id).await.is_err());

    let tasks = session.view(Filter::All).await;
    assert_eq!(titles(&tasks), vec!["Newer", "Older"]);
}

#[tokio::test]
async fn test_delete_then_echo_stays_deleted() {
    let (store, session) = setup_session().await;
    let id = session.create(TaskDraft::new("Gone", "x")).await.unwrap();
    settle().await;

    session.delete(&id).await.unwrap();
    settle().await;

    assert!(session.view(Filter::All).await.is_empty());
    assert!(store.rows().await.is_empty());
}

#[tokio::test]
async fn test_pending_ids_cannot_be_written_remotely() {
    let (_store, session) = setup_session().await;
    let pending = RecordId::Pending(PendingId(1));

    let err = session.update(&pending, TaskPatch::description("y")).await.unwrap_err();
    assert_eq!(err, DomainError::NotPersisted(pending.clone()));
    let err = session.toggle(&pending).await.unwrap_err();
    assert_eq!(err, DomainError::NotPersisted(pending));
}

#[tokio::test]
async fn test_update_missing_id_leaves_state_unchanged() {
    let (_store, session) = setup_session().await;
    session.create(TaskDraft::new("Keep", "x")).await.unwrap();
    settle().await;
    let before = session.view(Filter::All).await;

    let missing = RecordId::remote("99");
    let err = session.update(&missing, TaskPatch::description("y")).await.unwrap_err();
    assert_eq!(err, DomainError::NotFound(missing));
    assert_eq!(session.view(Filter::All).await, before);
}

#[tokio::test]
async fn test_remote_writes_are_merged() {
    let (store, session) = setup_session().await;

    let other = store.create(&TaskDraft::new("From elsewhere", "x")).await.unwrap();
    wait_until(&session, |tasks| tasks.iter().any(|t| t.id == other.id)).await;

    store.update(&other.id, &TaskPatch::completed(true)).await.unwrap();
    wait_until(&session, |tasks| tasks.iter().any(|t| t.id == other.id && t.completed)).await;

    store.delete(&other.id).await.unwrap();
    wait_until(&session, |tasks| tasks.is_empty()).await;
}

#[tokio::test]
async fn test_malformed_and_foreign_payloads_are_ignored() {
    let (store, session) = setup_session().await;

    store.emit_raw(json!("not an object")).await;
    store.emit_raw(json!({ "table": "tasks", "eventType": "UPSERT" })).await;
    store.emit_raw(json!({ "table": "tasks", "eventType": "INSERT", "new": {} })).await;
    store.emit_raw(json!({ "table": "tasks", "eventType": "DELETE", "old": {} })).await;
    store
        .emit_raw(json!({
            "table": "notes",
            "eventType": "INSERT",
            "new": { "id": "77", "title": "Not a task" },
        }))
        .await;
    settle().await;
    assert!(session.view(Filter::All).await.is_empty());

    // The pump keeps running afterwards
    let other = store.create(&TaskDraft::new("Still alive", "x")).await.unwrap();
    let tasks = wait_until(&session, |tasks| !tasks.is_empty()).await;
    assert_eq!(tasks[0].id, other.id);
}

#[tokio::test]
async fn test_duplicate_delivery_is_idempotent() {
    let (store, session) = setup_session().await;
    store.set_duplicate_delivery(true).await;

    session.create(TaskDraft::new("Mine", "x")).await.unwrap();
    store.create(&TaskDraft::new("Theirs", "x")).await.unwrap();
    settle().await;

    let tasks = wait_until(&session, |tasks| tasks.len() == 2).await;
    assert_eq!(titles(&tasks), vec!["Theirs", "Mine"]);
}

#[tokio::test]
async fn test_counts_partition_the_list() {
    let (_store, session) = setup_session().await;
    let mut ids = Vec::new();
    for title in ["a", "b", "c"] {
        ids.push(session.create(TaskDraft::new(title, "x")).await.unwrap());
    }
    session.toggle(&ids[1]).await.unwrap();
    settle().await;

    let counts = session.counts().await;
    assert_eq!(counts.total, 3);
    assert_eq!(counts.active, 2);
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.active + counts.completed, counts.total);
    assert_eq!(session.view(Filter::Completed).await[0].id, ids[1]);
}

#[tokio::test]
async fn test_open_loads_existing_rows() {
    let store = Arc::new(MemoryStore::new("tasks"));
    store.create(&TaskDraft::new("Existing", "x")).await.unwrap();

    let session = Session::open(store.clone(), &SyncConfig::default()).await.unwrap();
    assert_eq!(titles(&session.view(Filter::All).await), vec!["Existing"]);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_failed_open_releases_subscription() {
    let store = Arc::new(MemoryStore::<Task>::new("tasks"));
    store.fail_next(StoreError::Transport("offline".to_string())).await;

    assert!(Session::open(store.clone(), &SyncConfig::default()).await.is_err());
    assert_eq!(store.subscriber_count().await, 0);
}

#[tokio::test]
async fn test_refresh_keeps_state_consistent() {
    let (store, session) = setup_session().await;
    session.create(TaskDraft::new("Mine", "x")).await.unwrap();
    store.create(&TaskDraft::new("Theirs", "x")).await.unwrap();

    session.refresh().await.unwrap();
    settle().await;

    assert_eq!(session.view(Filter::All).await, store.rows().await);
}

#[tokio::test]
async fn test_change_notifications() {
    let (_store, session) = setup_session().await;
    let mut changes = session.subscribe_changes();
    let start = *changes.borrow_and_update();

    session.create(TaskDraft::new("Notify", "x")).await.unwrap();

    timeout(Duration::from_secs(1), changes.changed())
        .await
        .expect("no change notification")
        .unwrap();
    assert!(*changes.borrow() > start);
}

#[tokio::test]
async fn test_close_unsubscribes() {
    let (store, session) = setup_session().await;
    assert_eq!(store.subscriber_count().await, 1);

    session.close().await.unwrap();
    assert_eq!(store.subscriber_count().await, 0);
}

#[tokio::test]
async fn test_identical_insert_from_elsewhere_keeps_own_record() {
    let (inner, session) = setup_slow_session(Some(TaskDraft::new("Standup", "notes"))).await;

    // The other client's insert reaches the feed while ours is in flight
    let id = session.create(TaskDraft::new("Standup", "notes")).await.unwrap();
    assert_eq!(id, RecordId::remote("2"));

    let stored: Vec<_> = inner.rows().await.into_iter().map(|t| t.id).collect();
    assert_eq!(stored, vec![RecordId::remote("2"), RecordId::remote("1")]);

    settle().await;
    let tasks = wait_until(&session, |tasks| tasks.len() == 2).await;
    let local: Vec<_> = tasks.iter().map(|t| t.id.clone()).collect();
    assert_eq!(local, stored);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_delete_while_create_in_flight() {
    let (inner, session) = setup_slow_session(None).await;

    let (created, deleted) = tokio::join!(session.create(TaskDraft::new("Short lived", "x")), async {
        let tasks = wait_until(&session, |tasks| tasks.iter().any(|t| t.id.is_pending())).await;
        session.delete(&tasks[0].id).await
    });
    deleted.expect("local delete of provisional record");
    let id = created.expect("create still succeeds");

    settle().await;
    assert!(inner.rows().await.is_empty());
    assert!(session.get(&id).await.is_none());
    assert!(session.view(Filter::All).await.is_empty());
    session.close().await.unwrap();
}
