//! Reconciler
//!
//! Owns the ordered record list and is the only place it is mutated. Local
//! optimistic writes and remote change events both go through here, so the
//! list never holds two entries for one id.
//!
//! Consistency policy is last-applied-wins: a remote event overwrites a local
//! optimistic value for the same id and vice versa, with no version check.

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::change::{check_id, ChangeEvent};
use crate::domain::{DomainError, DomainResult, Entity, PendingId, RecordId};
use crate::view::{Counts, Filter, View};

/// A record taken out of the list together with where it was
#[derive(Debug, Clone, PartialEq)]
pub struct Removed<T> {
    pub record: T,
    pub index: usize,
}

/// Undo for an optimistic write whose store call failed
#[derive(Debug, Clone, PartialEq)]
pub enum Compensation<T> {
    /// Drop a provisional record
    Discard(PendingId),
    /// Put back `previous` if the entry still holds `applied`
    Restore { applied: T, previous: T },
    /// Flip the flag back if it still holds `applied`
    Untoggle { id: RecordId, applied: bool },
    /// Re-insert a deleted record near its old position
    Reinsert(Removed<T>),
}

/// Outcome of installing the store-assigned id of a created record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// The provisional entry now carries the store id
    Replaced,
    /// The change-feed echo got there first; the provisional entry is gone
    Merged,
    /// An identical record from elsewhere took the provisional entry's place;
    /// the confirmed record was added next to it
    Inserted,
    /// The provisional entry was deleted locally before the store answered
    Orphaned,
}

#[derive(Debug, Clone)]
pub struct Reconciler<T> {
    items: Vec<T>,
    next_pending: u64,
    /// Provisional records deleted locally while their create is in flight
    discarded: HashSet<PendingId>,
    revision: u64,
}

impl<T: Entity> Default for Reconciler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Reconciler<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            next_pending: 1,
            discarded: HashSet::new(),
            revision: 0,
        }
    }

    /// Start from a fetched record set
    pub fn with_items(records: Vec<T>) -> Self {
        let mut reconciler = Self::new();
        reconciler.hydrate(records);
        reconciler
    }

    // ========================
    // Read Surface
    // ========================

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &RecordId) -> Option<&T> {
        self.items.iter().find(|record| record.id() == id)
    }

    pub fn view(&self, filter: Filter) -> View<'_, T> {
        View::new(&self.items, filter)
    }

    pub fn counts(&self) -> Counts {
        Counts::of(&self.items)
    }

    /// Bumped on every state change; use as a re-render trigger
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Provisional records still waiting for a store id
    pub fn pending(&self) -> impl Iterator<Item = &T> {
        self.items.iter().filter(|record| record.id().is_pending())
    }

    fn position(&self, id: &RecordId) -> Option<usize> {
        self.items.iter().position(|record| record.id() == id)
    }

    /// Oldest provisional record with the same content as `record`
    fn correlate(&self, record: &T) -> Option<usize> {
        self.items
            .iter()
            .rposition(|candidate| candidate.id().is_pending() && candidate.same_content(record))
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    // ========================
    // Local Mutations
    // ========================

    /// Insert a provisional record at the front and return its temporary id
    pub fn apply_local_create(&mut self, draft: &T::Draft) -> DomainResult<PendingId> {
        T::validate_draft(draft)?;
        let pending = PendingId(self.next_pending);
        self.next_pending += 1;
        self.items.insert(0, T::provisional(pending.into(), draft));
        self.touch();
        Ok(pending)
    }

    /// Remove a provisional record after its store call failed
    pub fn rollback(&mut self, pending: PendingId) -> Option<T> {
        self.discarded.remove(&pending);
        let pos = self.position(&pending.into())?;
        self.touch();
        Some(self.items.remove(pos))
    }

    /// Install the record returned by the store's create call.
    ///
    /// Only a provisional record the user deleted yields `Orphaned`; the
    /// caller is expected to delete the confirmed record remotely.
    pub fn confirm_create(&mut self, pending: PendingId, record: T) -> Confirmation {
        let confirmed = record.id().clone();
        if self.discarded.remove(&pending) {
            // The echo may already have brought the record back
            if let Some(pos) = self.position(&confirmed) {
                self.items.remove(pos);
                self.touch();
            }
            return Confirmation::Orphaned;
        }
        let outcome = match (self.position(&pending.into()), self.position(&confirmed)) {
            (Some(p), None) => {
                self.items[p] = record;
                Confirmation::Replaced
            }
            (Some(p), Some(s)) => {
                self.items[s] = record;
                self.items.remove(p);
                Confirmation::Merged
            }
            (None, Some(s)) => {
                self.items[s] = record;
                Confirmation::Merged
            }
            // An echo of an identical record took the provisional entry. If
            // another identical provisional record is outstanding, take that
            // one over; its own confirmation then lands here as well.
            (None, None) => match self.correlate(&record) {
                Some(p) => {
                    self.items[p] = record;
                    Confirmation::Replaced
                }
                None => {
                    self.items.insert(0, record);
                    Confirmation::Inserted
                }
            },
        };
        self.touch();
        outcome
    }

    /// Merge `patch` in place. Returns the undo for a failed store call.
    pub fn apply_local_update(&mut self, id: &RecordId, patch: &T::Patch) -> DomainResult<Compensation<T>> {
        T::validate_patch(patch)?;
        let pos = self.position(id).ok_or_else(|| DomainError::NotFound(id.clone()))?;
        let previous = self.items[pos].clone();
        self.items[pos].apply_patch(patch);
        self.touch();
        Ok(Compensation::Restore {
            applied: self.items[pos].clone(),
            previous,
        })
    }

    /// Flip the completion flag and return its new value
    pub fn apply_local_toggle(&mut self, id: &RecordId) -> DomainResult<bool> {
        let record = self
            .items
            .iter_mut()
            .find(|record| record.id() == id)
            .ok_or_else(|| DomainError::NotFound(id.clone()))?;
        let completed = !record.completed();
        record.set_completed(completed);
        self.touch();
        Ok(completed)
    }

    pub fn apply_local_delete(&mut self, id: &RecordId) -> DomainResult<Removed<T>> {
        let index = self.position(id).ok_or_else(|| DomainError::NotFound(id.clone()))?;
        let record = self.items.remove(index);
        if let RecordId::Pending(pending) = id {
            self.discarded.insert(*pending);
        }
        self.touch();
        Ok(Removed { record, index })
    }

    /// Apply a compensating action. Returns whether the list changed.
    ///
    /// Restores are skipped when the entry no longer holds the value written
    /// optimistically, since something newer has already replaced it.
    pub fn revert(&mut self, compensation: Compensation<T>) -> bool {
        match compensation {
            Compensation::Discard(pending) => self.rollback(pending).is_some(),
            Compensation::Restore { applied, previous } => {
                match self.position(previous.id()) {
                    Some(pos) if self.items[pos] == applied => {
                        self.items[pos] = previous;
                        self.touch();
                        true
                    }
                    _ => false,
                }
            }
            Compensation::Untoggle { id, applied } => {
                match self.position(&id) {
                    Some(pos) if self.items[pos].completed() == applied => {
                        self.items[pos].set_completed(!applied);
                        self.touch();
                        true
                    }
                    _ => false,
                }
            }
            Compensation::Reinsert(Removed { record, index }) => {
                if self.position(record.id()).is_some() {
                    return false;
                }
                if let RecordId::Pending(pending) = record.id() {
                    self.discarded.remove(pending);
                }
                let index = index.min(self.items.len());
                self.items.insert(index, record);
                self.touch();
                true
            }
        }
    }

    // ========================
    // Remote Changes
    // ========================

    /// Merge one change-feed event. Never fails: malformed events are logged
    /// and dropped.
    pub fn apply_remote(&mut self, event: ChangeEvent<T>) {
        if let Err(err) = check_id(event.id()) {
            log::warn!("dropping {} event: {}", event.kind().as_str(), err);
            return;
        }

        match event {
            ChangeEvent::Created(record) | ChangeEvent::Updated(record) => self.upsert_remote(record),
            ChangeEvent::Deleted(id) => {
                if let Some(pos) = self.position(&id) {
                    self.items.remove(pos);
                    self.touch();
                } else {
                    log::debug!("delete for absent record {}", id);
                }
            }
        }
    }

    fn upsert_remote(&mut self, record: T) {
        if let Some(pos) = self.position(record.id()) {
            self.items[pos] = record;
        } else if let Some(pos) = self.correlate(&record) {
            log::debug!("record {} confirms {}", record.id(), self.items[pos].id());
            self.items[pos] = record;
        } else {
            self.items.insert(0, record);
        }
        self.touch();
    }

    /// Replace the confirmed records with a fresh listing, keeping
    /// outstanding provisional records in front
    pub fn hydrate(&mut self, records: Vec<T>) {
        let mut items: Vec<T> = self.items.drain(..).filter(|record| record.id().is_pending()).collect();
        for record in records {
            if !record.id().is_remote() {
                log::warn!("listing returned record without store id: {}", record.id());
                continue;
            }
            if items.iter().any(|existing| existing.id() == record.id()) {
                continue;
            }
            if let Some(pos) = items
                .iter()
                .rposition(|candidate| candidate.id().is_pending() && candidate.same_content(&record))
            {
                items[pos] = record;
                continue;
            }
            items.push(record);
        }
        self.items = items;
        self.touch();
    }
}

impl<T: Entity + DeserializeOwned> Reconciler<T> {
    /// Decode and merge a raw change-feed payload
    pub fn apply_remote_payload(&mut self, payload: &Value) {
        match ChangeEvent::from_payload(payload) {
            Ok(event) => self.apply_remote(event),
            Err(err) => log::warn!("dropping malformed change event: {}", err),
        }
    }
}
