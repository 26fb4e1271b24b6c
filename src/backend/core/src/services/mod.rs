//! Collaborators the security core talks to.
//!
//! The core owns no storage. Session lookup, entity references, event
//! persistence, policy restrictions and the unit-of-work are all reached
//! through these traits. [`memory`] holds in-process implementations used
//! by the tests and benchmarks.

pub mod memory;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::Result;
use crate::model::{Event, EventLog, GroupRef, IObject, Permissions, UserRef};
use crate::security::filter::ReadFilter;
use crate::security::principal::Principal;
use crate::security::roles::AdminPrivilege;

// ═══════════════════════════════════════════════════════════════════════════════
// Session resolution
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything a session store knows about a logged-in principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSession {
    pub session_id: i64,
    pub session_uuid: String,
    pub user_id: i64,
    pub user_name: String,
    pub group_id: i64,
    pub group_name: String,
    pub group_permissions: Permissions,
    pub member_of_groups: Vec<i64>,
    pub leader_of_groups: Vec<i64>,
    /// Event type used when the principal does not name one.
    pub default_event_type: String,
    /// `None` means unrestricted when the caller turns out to be admin.
    pub admin_privileges: Option<BTreeSet<AdminPrivilege>>,
}

pub trait SessionResolver: Send + Sync {
    /// Resolve a principal into its session, or an authentication error.
    fn resolve_principal(&self, principal: &Principal) -> Result<ResolvedSession>;

    /// Called after a call that changed users, groups or memberships.
    fn invalidate_memberships(&self) {}
}

// ═══════════════════════════════════════════════════════════════════════════════
// Entity references & updates
// ═══════════════════════════════════════════════════════════════════════════════

pub trait LookupService: Send + Sync {
    fn user_proxy(&self, user_id: i64) -> Result<UserRef>;
    fn group_proxy(&self, group_id: i64) -> Result<GroupRef>;
}

pub trait UpdateService: Send + Sync {
    /// Persist the event and return it with its id assigned.
    fn save_and_return_event(&self, event: Event) -> Result<Event>;
    fn bulk_insert_logs(&self, logs: &[EventLog]) -> Result<()>;
}

pub trait PolicyService: Send + Sync {
    /// Extra restrictions (e.g. "RESTRICT-DOWNLOAD") active for the caller.
    fn list_active_restrictions(&self, object: &IObject) -> BTreeSet<String>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Unit of work
// ═══════════════════════════════════════════════════════════════════════════════

/// The per-call persistence connection.
pub trait PersistenceConnection {
    fn enable_filter(&mut self, filter: ReadFilter);
    fn disable_filter(&mut self);
    fn active_filter(&self) -> Option<&ReadFilter>;

    /// The object is managed by this unit of work.
    fn contains(&self, object: &IObject) -> bool;
    fn is_dirty(&self) -> bool;
    fn flush(&mut self) -> Result<()>;
    fn clear(&mut self);

    /// Persist the LOCKED flag on the object.
    fn lock(&mut self, object: &IObject) -> Result<()>;

    /// Persist the cleared LOCKED flag on the object.
    fn unlock(&mut self, object: &IObject) -> Result<()>;

    /// Rows outside the object's own graph that point at it.
    fn count_external_references(&self, object: &IObject) -> Result<u64>;
}
