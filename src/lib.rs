//! Task Sync
//!
//! Client-side reconciliation of an optimistic local task list against the
//! change feed of a shared, remotely hosted table.

pub mod change;
pub mod config;
pub mod domain;
pub mod reconciler;
pub mod repository;
pub mod session;
pub mod view;

pub use change::{ChangeEvent, ChangeKind};
pub use config::{ConfigError, SyncConfig};
pub use domain::{
    DomainError, DomainResult, Entity, MalformedEvent, PendingId, RecordId, StoreError, StoreResult, Task, TaskDraft,
    TaskPatch, ValidationError,
};
pub use reconciler::{Compensation, Confirmation, Reconciler, Removed};
pub use repository::{ChangeFeed, MemoryStore, Store, SubscriptionId};
pub use session::SyncSession;
pub use view::{Counts, Filter, View};
