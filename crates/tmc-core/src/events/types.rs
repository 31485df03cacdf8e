//! Event types and the dedup key (spec.md §3 "Event", §4.B).

use chrono::{DateTime, Utc};

use crate::ids::WorkspaceName;

/// Severity/kind of a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum EventType {
    Normal,
    Warning,
    Error,
}

/// A single recorded event (spec.md §3).
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
    pub workspace: WorkspaceName,
    pub object: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub count: u32,
    pub source: String,
}

impl Event {
    #[must_use]
    pub fn new(
        event_type: EventType,
        reason: impl Into<String>,
        message: impl Into<String>,
        workspace: WorkspaceName,
        source: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            reason: reason.into(),
            message: message.into(),
            workspace,
            object: None,
            timestamp: Utc::now(),
            count: 1,
            source: source.into(),
        }
    }

    #[must_use]
    pub fn with_object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }

    /// Dedup key: `(workspace, type, reason, object, source)` (spec.md §3).
    #[must_use]
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            workspace: self.workspace.clone(),
            event_type: self.event_type,
            reason: self.reason.clone(),
            object: self.object.clone(),
            source: self.source.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    workspace: WorkspaceName,
    event_type: EventType,
    reason: String,
    object: Option<String>,
    source: String,
}
