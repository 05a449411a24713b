//! Task Entity
//!
//! One row of the hosted `tasks` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{Entity, RecordId};
use super::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: RecordId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    /// Owner of the row
    #[serde(default)]
    pub user_id: Option<String>,
    /// Optional image reference in object storage
    #[serde(default)]
    pub image_url: Option<String>,
    /// Assigned by the store
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Fields entered in the new-task form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn owned_by(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl TaskPatch {
    pub fn description(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Default::default()
        }
    }

    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Default::default()
        }
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::required(field));
    }
    Ok(())
}

impl Entity for Task {
    type Draft = TaskDraft;
    type Patch = TaskPatch;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn completed(&self) -> bool {
        self.completed
    }

    fn set_completed(&mut self, completed: bool) {
        self.completed = completed;
    }

    fn validate_draft(draft: &TaskDraft) -> Result<(), ValidationError> {
        require("title", &draft.title)?;
        require("description", &draft.description)
    }

    fn validate_patch(patch: &TaskPatch) -> Result<(), ValidationError> {
        if let Some(title) = &patch.title {
            require("title", title)?;
        }
        if let Some(description) = &patch.description {
            require("description", description)?;
        }
        Ok(())
    }

    fn provisional(id: RecordId, draft: &TaskDraft) -> Self {
        Self {
            id,
            title: draft.title.clone(),
            description: draft.description.clone(),
            completed: false,
            user_id: draft.user_id.clone(),
            image_url: draft.image_url.clone(),
            created_at: None,
        }
    }

    fn completion_patch(completed: bool) -> TaskPatch {
        TaskPatch::completed(completed)
    }

    fn apply_patch(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        if let Some(image_url) = &patch.image_url {
            self.image_url = Some(image_url.clone());
        }
    }

    fn same_content(&self, other: &Self) -> bool {
        self.title == other.title
            && self.description == other.description
            && self.user_id == other.user_id
            && self.image_url == other.image_url
    }

    fn set_created_at(&mut self, at: DateTime<Utc>) {
        self.created_at = Some(at);
    }
}
