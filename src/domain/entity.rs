//! Domain Layer - Core Entity Trait
//!
//! Record identity and the contract every reconciled record type fulfils.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use super::error::ValidationError;

/// Temporary id handed out for a record the store has not assigned an id to yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PendingId(pub u64);

impl fmt::Display for PendingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pending:{}", self.0)
    }
}

/// Identifier of a record in the list.
///
/// `Remote` ids are assigned by the store and are the only ids that may
/// arrive through the change feed. `Pending` ids exist only between an
/// optimistic create and its confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordId {
    Remote(String),
    Pending(PendingId),
}

impl RecordId {
    pub fn remote(id: impl Into<String>) -> Self {
        RecordId::Remote(id.into())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, RecordId::Pending(_))
    }

    /// A store-assigned, non-empty id
    pub fn is_remote(&self) -> bool {
        matches!(self, RecordId::Remote(id) if !id.is_empty())
    }
}

impl From<PendingId> for RecordId {
    fn from(id: PendingId) -> Self {
        RecordId::Pending(id)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Remote(id) => f.write_str(id),
            RecordId::Pending(id) => id.fmt(f),
        }
    }
}

impl FromStr for RecordId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix("pending:") {
            Some(n) => Ok(RecordId::Pending(PendingId(n.parse()?))),
            None => Ok(RecordId::Remote(s.to_string())),
        }
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Hosted tables hand out bigint or uuid keys, so accept numbers as well as strings
impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordIdVisitor;

        impl<'de> Visitor<'de> for RecordIdVisitor {
            type Value = RecordId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string or integer record id")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<RecordId, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<RecordId, E> {
                Ok(RecordId::Remote(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<RecordId, E> {
                Ok(RecordId::Remote(v.to_string()))
            }
        }

        deserializer.deserialize_any(RecordIdVisitor)
    }
}

/// Core trait for records kept in a reconciled list
pub trait Entity: Clone + PartialEq + Send + Sync + 'static {
    /// Fields supplied by the user when creating a record
    type Draft: Clone + Send + Sync;
    /// Partial update; absent fields are left untouched
    type Patch: Clone + Send + Sync;

    fn id(&self) -> &RecordId;

    fn completed(&self) -> bool;

    fn set_completed(&mut self, completed: bool);

    /// Reject drafts with empty required fields
    fn validate_draft(draft: &Self::Draft) -> Result<(), ValidationError>;

    fn validate_patch(patch: &Self::Patch) -> Result<(), ValidationError>;

    /// Build the optimistic record shown until the store answers
    fn provisional(id: RecordId, draft: &Self::Draft) -> Self;

    /// Patch that sets only the completion flag
    fn completion_patch(completed: bool) -> Self::Patch;

    /// Merge `patch` into `self`, preserving unmodified fields
    fn apply_patch(&mut self, patch: &Self::Patch);

    /// Field equality ignoring the id and server-populated metadata
    fn same_content(&self, other: &Self) -> bool;

    /// Record the server-side creation time, for entities that keep one
    fn set_created_at(&mut self, _at: DateTime<Utc>) {}
}
