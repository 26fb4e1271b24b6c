//! Domain objects as seen by the security core.
//!
//! The core never interprets an object's business fields. It only needs the
//! object's kind, its persisted id (if any), its [`Details`] and the
//! per-instance [`GraphHolder`] that privileged tokens are keyed on.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::permissions::{Flag, Permissions};
use crate::error::{Result, VigilError};

// ═══════════════════════════════════════════════════════════════════════════════
// Object kinds
// ═══════════════════════════════════════════════════════════════════════════════

/// The closed set of domain variants known to the security core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    // System types
    Experimenter,
    ExperimenterGroup,
    GroupExperimenterMap,
    Session,
    Share,
    Event,
    EventLog,
    EventType,

    // User data
    OriginalFile,
    Project,
    Dataset,
    Image,
    Pixels,
    Annotation,
    Roi,
    ProjectDatasetLink,
    DatasetImageLink,
    ImageAnnotationLink,
}

impl ObjectKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Experimenter => "Experimenter",
            Self::ExperimenterGroup => "ExperimenterGroup",
            Self::GroupExperimenterMap => "GroupExperimenterMap",
            Self::Session => "Session",
            Self::Share => "Share",
            Self::Event => "Event",
            Self::EventLog => "EventLog",
            Self::EventType => "EventType",
            Self::OriginalFile => "OriginalFile",
            Self::Project => "Project",
            Self::Dataset => "Dataset",
            Self::Image => "Image",
            Self::Pixels => "Pixels",
            Self::Annotation => "Annotation",
            Self::Roi => "Roi",
            Self::ProjectDatasetLink => "ProjectDatasetLink",
            Self::DatasetImageLink => "DatasetImageLink",
            Self::ImageAnnotationLink => "ImageAnnotationLink",
        }
    }

    /// Types that regular users may never create.
    pub const fn is_system_type(&self) -> bool {
        matches!(
            self,
            Self::Experimenter
                | Self::ExperimenterGroup
                | Self::GroupExperimenterMap
                | Self::Session
                | Self::Share
                | Self::Event
                | Self::EventLog
                | Self::EventType
        )
    }

    pub const fn is_file(&self) -> bool {
        matches!(self, Self::OriginalFile)
    }

    pub const fn is_experimenter(&self) -> bool {
        matches!(self, Self::Experimenter)
    }

    pub const fn is_link(&self) -> bool {
        matches!(
            self,
            Self::ProjectDatasetLink | Self::DatasetImageLink | Self::ImageAnnotationLink
        )
    }

    /// Changes to these invalidate cached group memberships.
    pub const fn is_admin_type(&self) -> bool {
        matches!(
            self,
            Self::Experimenter | Self::ExperimenterGroup | Self::GroupExperimenterMap
        )
    }

    /// Audit records are never themselves audited.
    pub const fn is_audit_type(&self) -> bool {
        matches!(self, Self::Event | Self::EventLog)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// References
// ═══════════════════════════════════════════════════════════════════════════════

/// Reference to an experimenter. Unloaded stubs carry only the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: i64,
    pub name: Option<String>,
    pub loaded: bool,
}

impl UserRef {
    pub fn unloaded(id: i64) -> Self {
        Self {
            id,
            name: None,
            loaded: false,
        }
    }

    pub fn loaded(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
            loaded: true,
        }
    }
}

/// Reference to a group, optionally carrying the group's own permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRef {
    pub id: i64,
    pub name: Option<String>,
    pub permissions: Option<Permissions>,
    pub loaded: bool,
}

impl GroupRef {
    pub fn unloaded(id: i64) -> Self {
        Self {
            id,
            name: None,
            permissions: None,
            loaded: false,
        }
    }

    pub fn loaded(id: i64, name: impl Into<String>, permissions: Permissions) -> Self {
        Self {
            id,
            name: Some(name.into()),
            permissions: Some(permissions),
            loaded: true,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Proof that the zero-reference unlock check passed.
///
/// Only the orchestrator can mint one.
#[derive(Debug)]
pub struct UnlockProof {
    _private: (),
}

impl UnlockProof {
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }
}

/// Ownership and permission record attached to every persisted object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Details {
    pub owner: Option<UserRef>,
    pub group: Option<GroupRef>,
    permissions: Option<Permissions>,
    pub creation_event: Option<i64>,
    pub update_event: Option<i64>,
}

impl Details {
    pub fn new(owner: UserRef, group: GroupRef, permissions: Permissions) -> Self {
        Self {
            owner: Some(owner),
            group: Some(group),
            permissions: Some(permissions),
            creation_event: None,
            update_event: None,
        }
    }

    pub fn owner_id(&self) -> Option<i64> {
        self.owner.as_ref().map(|o| o.id)
    }

    pub fn group_id(&self) -> Option<i64> {
        self.group.as_ref().map(|g| g.id)
    }

    pub fn permissions(&self) -> Option<&Permissions> {
        self.permissions.as_ref()
    }

    /// Replace the permissions. A locked object accepts no change at all.
    pub fn set_permissions(&mut self, permissions: Permissions) -> Result<()> {
        if let Some(current) = &self.permissions {
            if current.is_locked() && !current.same_bits(&permissions) {
                return Err(VigilError::locked(format!(
                    "Cannot change permissions of a locked object ({} -> {})",
                    current, permissions
                )));
            }
        }
        self.permissions = Some(permissions);
        Ok(())
    }

    /// Overwrite the caller-relative view without touching the bits.
    pub(crate) fn replace_permissions_view(&mut self, permissions: Permissions) {
        self.permissions = Some(permissions);
    }

    /// Mark the object LOCKED. Always allowed.
    pub fn lock(&mut self) {
        let current = self.permissions.take().unwrap_or_default();
        self.permissions = Some(current.set(Flag::Locked));
    }

    pub fn is_locked(&self) -> bool {
        self.permissions.as_ref().map(|p| p.is_locked()).unwrap_or(false)
    }

    /// Clear LOCKED after the zero-reference check.
    pub fn clear_lock(&mut self, _proof: UnlockProof) {
        if let Some(current) = self.permissions.take() {
            self.permissions = Some(current.unset(Flag::Locked));
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Graph holder & object
// ═══════════════════════════════════════════════════════════════════════════════

/// Stable per-instance handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectHandle(Uuid);

impl ObjectHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObjectHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-object carrier of token and audit linkage. Clones share the handle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphHolder {
    handle: ObjectHandle,
}

impl GraphHolder {
    pub fn handle(&self) -> ObjectHandle {
        self.handle
    }
}

/// A domain object presented to the security core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IObject {
    pub kind: ObjectKind,
    pub id: Option<i64>,
    pub details: Option<Details>,
    graph: GraphHolder,
}

impl IObject {
    /// A transient (not yet persisted) object.
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            id: None,
            details: None,
            graph: GraphHolder::default(),
        }
    }

    /// A persisted object.
    pub fn with_id(kind: ObjectKind, id: i64) -> Self {
        Self {
            id: Some(id),
            ..Self::new(kind)
        }
    }

    pub fn with_details(mut self, details: Details) -> Self {
        self.details = Some(details);
        self
    }

    pub fn is_transient(&self) -> bool {
        self.id.is_none()
    }

    pub fn graph_holder(&self) -> &GraphHolder {
        &self.graph
    }

    pub fn handle(&self) -> ObjectHandle {
        self.graph.handle
    }
}

impl fmt::Display for IObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "{}:{}", self.kind, id),
            None => write!(f, "{}:transient", self.kind),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
