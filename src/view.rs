//! Filtered Views
//!
//! Read-only projections over the reconciled list. Nothing here is cached:
//! every view and every count is derived from the items at call time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    #[default]
    All,
    /// Not completed
    Active,
    Completed,
}

impl Filter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Filter::All => "all",
            Filter::Active => "active",
            Filter::Completed => "completed",
        }
    }

    pub fn matches<T: Entity>(&self, record: &T) -> bool {
        match self {
            Filter::All => true,
            Filter::Active => !record.completed(),
            Filter::Completed => record.completed(),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown filter {0:?} (expected all, active or completed)")]
pub struct UnknownFilter(pub String);

impl FromStr for Filter {
    type Err = UnknownFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Filter::All),
            "active" => Ok(Filter::Active),
            "completed" => Ok(Filter::Completed),
            other => Err(UnknownFilter(other.to_string())),
        }
    }
}

/// Lazy projection of a record slice. Iterating twice yields the same records.
#[derive(Debug)]
pub struct View<'a, T> {
    items: &'a [T],
    filter: Filter,
}

impl<'a, T> Clone for View<'a, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, T> Copy for View<'a, T> {}

impl<'a, T: Entity> View<'a, T> {
    pub fn new(items: &'a [T], filter: Filter) -> Self {
        Self { items, filter }
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a T> + 'a {
        let filter = self.filter;
        self.items.iter().filter(move |record| filter.matches(*record))
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

impl<'a, T: Entity> IntoIterator for View<'a, T> {
    type Item = &'a T;
    type IntoIter = Box<dyn Iterator<Item = &'a T> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// Stats shown above the list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Counts {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
}

impl Counts {
    pub fn of<T: Entity>(items: &[T]) -> Self {
        let completed = items.iter().filter(|record| record.completed()).count();
        Self {
            total: items.len(),
            active: items.len() - completed,
            completed,
        }
    }
}
