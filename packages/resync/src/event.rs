//! Server push notifications.
//!
//! The push channel delivers `{resourceType, operation, ids?}` messages at any
//! time, in any order, possibly in bursts. They only say *that* something
//! changed; the data itself is re-fetched by the stores.
//!
//! ```json
//! {"resourceType": "movie", "operation": "update", "ids": [12, 15]}
//! {"resourceType": "badges", "operation": "any"}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::key::Key;

/// What happened to the resources named by a push event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Records were created or changed.
    Update,
    /// Records were deleted.
    Delete,
    /// Something about the resource changed; no specific ids.
    Any,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
            Operation::Any => write!(f, "any"),
        }
    }
}

/// A single push notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushEvent {
    pub resource_type: String,
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<Key>,
}

impl PushEvent {
    pub fn new(resource_type: impl Into<String>, operation: Operation, ids: Vec<Key>) -> Self {
        Self {
            resource_type: resource_type.into(),
            operation,
            ids,
        }
    }

    pub fn update(resource_type: impl Into<String>, ids: Vec<Key>) -> Self {
        Self::new(resource_type, Operation::Update, ids)
    }

    pub fn delete(resource_type: impl Into<String>, ids: Vec<Key>) -> Self {
        Self::new(resource_type, Operation::Delete, ids)
    }

    pub fn any(resource_type: impl Into<String>) -> Self {
        Self::new(resource_type, Operation::Any, Vec::new())
    }

    /// Decode the JSON wire form.
    pub fn from_json(payload: &str) -> Result<Self, SyncError> {
        serde_json::from_str(payload).map_err(|e| SyncError::MalformedEvent {
            message: e.to_string(),
        })
    }
}
