//! Audit events and the log entries recorded against them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::object::ObjectKind;

/// One audit event per mutating call. Read-only calls carry an unsaved one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Assigned by the update service on save.
    pub id: Option<i64>,
    pub session_id: i64,
    pub event_type: String,
    pub experimenter_id: i64,
    pub group_id: i64,
    pub time: DateTime<Utc>,
}

impl Event {
    pub fn new(session_id: i64, event_type: impl Into<String>, experimenter_id: i64, group_id: i64) -> Self {
        Self {
            id: None,
            session_id,
            event_type: event_type.into(),
            experimenter_id,
            group_id,
            time: Utc::now(),
        }
    }

    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }
}

/// A pending audit record: `action` happened to `entity_type:entity_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    pub action: String,
    pub entity_type: ObjectKind,
    pub entity_id: i64,
    pub event_id: Option<i64>,
}

impl EventLog {
    pub fn new(action: impl Into<String>, entity_type: ObjectKind, entity_id: i64, event_id: Option<i64>) -> Self {
        Self {
            action: action.into(),
            entity_type,
            entity_id,
            event_id,
        }
    }
}
