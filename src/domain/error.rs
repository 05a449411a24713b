//! Domain Errors
//!
//! Validation and not-found errors are synchronous and leave state untouched.
//! Store errors surface after the optimistic change was applied and require a
//! compensating action from the caller.

use thiserror::Error;

use super::entity::RecordId;

/// Common result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

pub type StoreResult<T> = Result<T, StoreError>;

/// A required field was empty or otherwise unusable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn required(field: &'static str) -> Self {
        Self {
            field,
            reason: "must not be empty".to_string(),
        }
    }
}

/// Failure reported by the hosted store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("rejected by store: {0}")]
    Rejected(String),
    #[error("no such record in store: {0}")]
    NotFound(RecordId),
    #[error("store connection closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("record not found: {0}")]
    NotFound(RecordId),
    #[error("record {0} has not been saved yet")]
    NotPersisted(RecordId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A change-feed payload that cannot be applied. Logged and dropped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedEvent {
    #[error("payload is not an object")]
    NotAnObject,
    #[error("unknown event type {0:?}")]
    UnknownEventType(String),
    #[error("{0} event without a record")]
    MissingRecord(&'static str),
    #[error("event without a record id")]
    MissingId,
    #[error("record does not decode: {0}")]
    InvalidRecord(String),
    #[error("event carries client-side id {0}")]
    ProvisionalId(RecordId),
}
