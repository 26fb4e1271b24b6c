//! Per-call identity record.
//!
//! An [`EventContext`] is built once per call by the orchestrator. Its
//! identity fields never change afterwards, except the admin flag that
//! `run_as_admin` raises for the duration of an elevated action. The
//! per-call caches (group permissions seen while loading, lock candidates,
//! audit logs, disabled subsystems) live behind a mutex so the votes can
//! fill them through a shared reference.

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::model::{Event, EventLog, GroupRef, IObject, Permissions, UserRef};
use crate::security::roles::AdminPrivilege;

/// Active group id meaning "all groups I belong to".
pub const ALL_GROUPS: i64 = -1;

/// Stand-in for an empty group list so filter parameter lists are never empty.
pub const NO_GROUPS: i64 = i64::MIN;

// ═══════════════════════════════════════════════════════════════════════════════
// Call state
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct CallState {
    group_permissions: HashMap<i64, Permissions>,
    lock_candidates: Vec<IObject>,
    logs: Vec<EventLog>,
    disabled: HashSet<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Event context
// ═══════════════════════════════════════════════════════════════════════════════

/// Who is calling, in which group, under which audit event.
#[derive(Debug)]
pub struct EventContext {
    session_id: i64,
    session_uuid: Option<String>,
    user_id: i64,
    user_name: String,
    group_id: i64,
    group_name: String,
    group_permissions: Permissions,
    event: Event,
    owner: UserRef,
    group: GroupRef,
    is_admin: bool,
    is_read_only: bool,
    admin_privileges: BTreeSet<AdminPrivilege>,
    member_of: Vec<i64>,
    leader_of: Vec<i64>,
    state: Mutex<CallState>,
}

impl EventContext {
    pub fn builder(user_id: i64, group_id: i64) -> EventContextBuilder {
        EventContextBuilder::new(user_id, group_id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Identity
    // ─────────────────────────────────────────────────────────────────────────

    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    pub fn session_uuid(&self) -> Option<&str> {
        self.session_uuid.as_deref()
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Active group, or [`ALL_GROUPS`].
    pub fn group_id(&self) -> i64 {
        self.group_id
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    pub fn group_permissions(&self) -> &Permissions {
        &self.group_permissions
    }

    pub fn is_all_groups(&self) -> bool {
        self.group_id == ALL_GROUPS
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn event_id(&self) -> Option<i64> {
        self.event.id
    }

    pub fn event_type(&self) -> &str {
        &self.event.event_type
    }

    pub fn owner(&self) -> &UserRef {
        &self.owner
    }

    pub fn group(&self) -> &GroupRef {
        &self.group
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    pub fn is_read_only(&self) -> bool {
        self.is_read_only
    }

    pub fn admin_privileges(&self) -> &BTreeSet<AdminPrivilege> {
        &self.admin_privileges
    }

    /// Admin holding the named privilege.
    pub fn has_privilege(&self, privilege: AdminPrivilege) -> bool {
        self.is_admin && self.admin_privileges.contains(&privilege)
    }

    /// Member group ids. Never empty: holds [`NO_GROUPS`] when there are none.
    pub fn member_of_groups(&self) -> &[i64] {
        &self.member_of
    }

    /// Led group ids. Never empty: holds [`NO_GROUPS`] when there are none.
    pub fn leader_of_groups(&self) -> &[i64] {
        &self.leader_of
    }

    pub fn is_member_of(&self, group_id: i64) -> bool {
        group_id != NO_GROUPS && self.member_of.contains(&group_id)
    }

    pub fn is_leader_of(&self, group_id: i64) -> bool {
        group_id != NO_GROUPS && self.leader_of.contains(&group_id)
    }

    pub(crate) fn set_admin(&mut self, is_admin: bool) {
        self.is_admin = is_admin;
    }

    pub(crate) fn replace_privileges(&mut self, privileges: BTreeSet<AdminPrivilege>) -> BTreeSet<AdminPrivilege> {
        std::mem::replace(&mut self.admin_privileges, privileges)
    }

    /// Identity copy with fresh call state.
    pub fn snapshot(&self) -> EventContext {
        EventContext {
            session_id: self.session_id,
            session_uuid: self.session_uuid.clone(),
            user_id: self.user_id,
            user_name: self.user_name.clone(),
            group_id: self.group_id,
            group_name: self.group_name.clone(),
            group_permissions: self.group_permissions.clone(),
            event: self.event.clone(),
            owner: self.owner.clone(),
            group: self.group.clone(),
            is_admin: self.is_admin,
            is_read_only: self.is_read_only,
            admin_privileges: self.admin_privileges.clone(),
            member_of: self.member_of.clone(),
            leader_of: self.leader_of.clone(),
            state: Mutex::new(CallState::default()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Group permissions cache
    // ─────────────────────────────────────────────────────────────────────────

    pub fn cache_group_permissions(&self, group_id: i64, permissions: Permissions) {
        self.state.lock().group_permissions.insert(group_id, permissions);
    }

    pub fn cached_group_permissions(&self, group_id: i64) -> Option<Permissions> {
        self.state.lock().group_permissions.get(&group_id).cloned()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Subsystems
    // ─────────────────────────────────────────────────────────────────────────

    pub(crate) fn disable_subsystems(&self, ids: &[&str]) {
        let mut state = self.state.lock();
        for id in ids {
            state.disabled.insert((*id).to_string());
        }
    }

    pub(crate) fn enable_subsystems(&self, ids: &[&str]) {
        let mut state = self.state.lock();
        for id in ids {
            state.disabled.remove(*id);
        }
    }

    pub(crate) fn enable_all_subsystems(&self) {
        self.state.lock().disabled.clear();
    }

    pub fn is_disabled(&self, id: &str) -> bool {
        self.state.lock().disabled.contains(id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logs & lock candidates
    // ─────────────────────────────────────────────────────────────────────────

    pub(crate) fn push_log(&self, log: EventLog) {
        self.state.lock().logs.push(log);
    }

    pub fn logs(&self) -> Vec<EventLog> {
        self.state.lock().logs.clone()
    }

    pub(crate) fn take_logs(&self) -> Vec<EventLog> {
        std::mem::take(&mut self.state.lock().logs)
    }

    pub(crate) fn push_lock_candidate(&self, object: IObject) {
        let mut state = self.state.lock();
        if !state.lock_candidates.iter().any(|c| c.handle() == object.handle()) {
            state.lock_candidates.push(object);
        }
    }

    pub fn lock_candidates(&self) -> Vec<IObject> {
        self.state.lock().lock_candidates.clone()
    }

    pub(crate) fn take_lock_candidates(&self) -> Vec<IObject> {
        std::mem::take(&mut self.state.lock().lock_candidates)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Builder
// ═══════════════════════════════════════════════════════════════════════════════

/// Assembles an [`EventContext`]. Unset names and references get placeholders.
#[derive(Debug)]
pub struct EventContextBuilder {
    session_id: i64,
    session_uuid: Option<String>,
    user_id: i64,
    user_name: String,
    group_id: i64,
    group_name: String,
    group_permissions: Permissions,
    event: Option<Event>,
    event_type: String,
    owner: Option<UserRef>,
    group: Option<GroupRef>,
    is_admin: bool,
    is_read_only: bool,
    admin_privileges: Option<BTreeSet<AdminPrivilege>>,
    member_of: Vec<i64>,
    leader_of: Vec<i64>,
}

impl EventContextBuilder {
    fn new(user_id: i64, group_id: i64) -> Self {
        Self {
            session_id: 0,
            session_uuid: None,
            user_id,
            user_name: String::new(),
            group_id,
            group_name: String::new(),
            group_permissions: Permissions::private(),
            event: None,
            event_type: "User".to_string(),
            owner: None,
            group: None,
            is_admin: false,
            is_read_only: true,
            admin_privileges: None,
            member_of: Vec::new(),
            leader_of: Vec::new(),
        }
    }

    pub fn session(mut self, session_id: i64, uuid: impl Into<String>) -> Self {
        self.session_id = session_id;
        self.session_uuid = Some(uuid.into());
        self
    }

    pub fn user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = name.into();
        self
    }

    pub fn group_name(mut self, name: impl Into<String>) -> Self {
        self.group_name = name.into();
        self
    }

    pub fn group_permissions(mut self, permissions: Permissions) -> Self {
        self.group_permissions = permissions;
        self
    }

    pub fn event(mut self, event: Event) -> Self {
        self.event = Some(event);
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    pub fn owner(mut self, owner: UserRef) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn group(mut self, group: GroupRef) -> Self {
        self.group = Some(group);
        self
    }

    pub fn admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.is_read_only = read_only;
        self
    }

    /// Restrict the admin to these privileges. Unrestricted when never called.
    pub fn privileges(mut self, privileges: impl IntoIterator<Item = AdminPrivilege>) -> Self {
        self.admin_privileges = Some(privileges.into_iter().collect());
        self
    }

    pub fn member_of(mut self, groups: impl IntoIterator<Item = i64>) -> Self {
        self.member_of = groups.into_iter().collect();
        self
    }

    pub fn leader_of(mut self, groups: impl IntoIterator<Item = i64>) -> Self {
        self.leader_of = groups.into_iter().collect();
        self
    }

    pub fn build(self) -> EventContext {
        let admin_privileges = if self.is_admin {
            self.admin_privileges.unwrap_or_else(AdminPrivilege::all)
        } else {
            BTreeSet::new()
        };
        let event = self.event.unwrap_or_else(|| {
            Event::new(self.session_id, self.event_type, self.user_id, self.group_id)
        });

        EventContext {
            session_id: self.session_id,
            session_uuid: self.session_uuid,
            user_id: self.user_id,
            user_name: self.user_name,
            group_id: self.group_id,
            group_name: self.group_name,
            group_permissions: self.group_permissions,
            event,
            owner: self.owner.unwrap_or_else(|| UserRef::unloaded(self.user_id)),
            group: self.group.unwrap_or_else(|| GroupRef::unloaded(self.group_id)),
            is_admin: self.is_admin,
            is_read_only: self.is_read_only,
            admin_privileges,
            member_of: non_empty(self.member_of),
            leader_of: non_empty(self.leader_of),
            state: Mutex::new(CallState::default()),
        }
    }
}

fn non_empty(groups: Vec<i64>) -> Vec<i64> {
    if groups.is_empty() {
        vec![NO_GROUPS]
    } else {
        groups
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
