//! Change Feed Events
//!
//! Typed change notifications and their wire form. Payloads follow the hosted
//! Postgres change shape:
//!
//! ```json
//! { "table": "tasks", "eventType": "UPDATE", "new": { "id": 1, ... }, "old": { "id": 1 } }
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::domain::{Entity, MalformedEvent, RecordId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    /// Event type name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "INSERT",
            ChangeKind::Updated => "UPDATE",
            ChangeKind::Deleted => "DELETE",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "INSERT" => Some(ChangeKind::Created),
            "UPDATE" => Some(ChangeKind::Updated),
            "DELETE" => Some(ChangeKind::Deleted),
            _ => None,
        }
    }
}

/// One remote notification about the authoritative record set
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<T> {
    Created(T),
    Updated(T),
    Deleted(RecordId),
}

impl<T: Entity> ChangeEvent<T> {
    pub fn id(&self) -> &RecordId {
        match self {
            ChangeEvent::Created(record) | ChangeEvent::Updated(record) => record.id(),
            ChangeEvent::Deleted(id) => id,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Created(_) => ChangeKind::Created,
            ChangeEvent::Updated(_) => ChangeKind::Updated,
            ChangeEvent::Deleted(_) => ChangeKind::Deleted,
        }
    }
}

impl<T: Entity + DeserializeOwned> ChangeEvent<T> {
    pub fn from_payload(payload: &Value) -> Result<Self, MalformedEvent> {
        let object = payload.as_object().ok_or(MalformedEvent::NotAnObject)?;
        let event_type = object
            .get("eventType")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let kind = ChangeKind::from_wire(event_type)
            .ok_or_else(|| MalformedEvent::UnknownEventType(event_type.to_string()))?;

        match kind {
            ChangeKind::Created | ChangeKind::Updated => {
                let record = object
                    .get("new")
                    .filter(|v| v.as_object().is_some_and(|o| !o.is_empty()))
                    .ok_or(MalformedEvent::MissingRecord(kind.as_str()))?;
                if record.get("id").map_or(true, Value::is_null) {
                    return Err(MalformedEvent::MissingId);
                }
                let record: T = serde_json::from_value(record.clone())
                    .map_err(|e| MalformedEvent::InvalidRecord(e.to_string()))?;
                check_id(record.id())?;
                Ok(match kind {
                    ChangeKind::Created => ChangeEvent::Created(record),
                    _ => ChangeEvent::Updated(record),
                })
            }
            ChangeKind::Deleted => {
                let id = object
                    .get("old")
                    .and_then(|old| old.get("id"))
                    .filter(|id| !id.is_null())
                    .ok_or(MalformedEvent::MissingId)?;
                let id: RecordId = serde_json::from_value(id.clone())
                    .map_err(|e| MalformedEvent::InvalidRecord(e.to_string()))?;
                check_id(&id)?;
                Ok(ChangeEvent::Deleted(id))
            }
        }
    }
}

impl<T: Entity + Serialize> ChangeEvent<T> {
    /// Wire form of the event for `table`
    pub fn to_payload(&self, table: &str) -> Value {
        let (new, old) = match self {
            ChangeEvent::Created(record) => (serde_json::to_value(record).unwrap_or(Value::Null), json!({})),
            ChangeEvent::Updated(record) => (
                serde_json::to_value(record).unwrap_or(Value::Null),
                json!({ "id": record.id() }),
            ),
            ChangeEvent::Deleted(id) => (json!({}), json!({ "id": id })),
        };
        json!({
            "schema": "public",
            "table": table,
            "eventType": self.kind().as_str(),
            "new": new,
            "old": old,
        })
    }
}

/// Feed events must carry a non-empty, store-assigned id
pub fn check_id(id: &RecordId) -> Result<(), MalformedEvent> {
    match id {
        RecordId::Pending(_) => Err(MalformedEvent::ProvisionalId(id.clone())),
        RecordId::Remote(raw) if raw.is_empty() => Err(MalformedEvent::MissingId),
        RecordId::Remote(_) => Ok(()),
    }
}

/// Table named by a raw payload, if any
pub fn payload_table(payload: &Value) -> Option<&str> {
    payload.get("table").and_then(Value::as_str)
}
