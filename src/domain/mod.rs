//! Domain Layer
//!
//! Record identity, the task entity and the error taxonomy.

mod entity;
mod error;
mod task;

pub use entity::{Entity, PendingId, RecordId};
pub use error::{DomainError, DomainResult, MalformedEvent, StoreError, StoreResult, ValidationError};
pub use task::{Task, TaskDraft, TaskPatch};
