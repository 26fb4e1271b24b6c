//! The identity triple a caller presents at login.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-supplied (name, active group, event type) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    /// Login name, or session key once a session exists.
    pub name: String,
    /// Name of the group the caller wants to act in.
    pub group: String,
    /// Audit event type for the calls made under this login.
    pub event_type: String,
}

impl Principal {
    pub fn new(
        name: impl Into<String>,
        group: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            event_type: event_type.into(),
        }
    }

    /// Whether the triple matches a context's resolved names exactly.
    pub fn matches(&self, user_name: &str, group_name: &str, event_type: &str) -> bool {
        self.name == user_name && self.group == group_name && self.event_type == event_type
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.name, self.group, self.event_type)
    }
}
