//! In-process collaborators.
//!
//! Thread-safe via `DashMap` and `parking_lot`. These back the integration
//! tests and the benchmarks; an embedding server supplies its own.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use tracing::debug;

use super::{
    LookupService, PersistenceConnection, PolicyService, ResolvedSession, SessionResolver,
    UpdateService,
};
use crate::error::{ErrorCode, Result, VigilError};
use crate::model::{Event, EventLog, GroupRef, IObject, ObjectHandle, ObjectKind, Permissions, UserRef};
use crate::security::filter::ReadFilter;
use crate::security::principal::Principal;

// ═══════════════════════════════════════════════════════════════════════════════
// Sessions
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct GroupEntry {
    id: i64,
    name: String,
    permissions: Permissions,
}

/// Sessions keyed by principal name, groups keyed by group name.
#[derive(Debug, Default)]
pub struct InMemorySessionResolver {
    sessions: DashMap<String, ResolvedSession>,
    groups: DashMap<String, GroupEntry>,
    invalidations: AtomicUsize,
}

impl InMemorySessionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_group(&self, id: i64, name: impl Into<String>, permissions: Permissions) {
        let name = name.into();
        self.groups.insert(
            name.clone(),
            GroupEntry {
                id,
                name,
                permissions,
            },
        );
    }

    /// Register a session for `session.user_name`; its group fields are
    /// overwritten on every resolve from the principal's group name.
    pub fn add_session(&self, session: ResolvedSession) {
        self.sessions.insert(session.user_name.clone(), session);
    }

    /// How often membership caches were invalidated.
    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }
}

impl SessionResolver for InMemorySessionResolver {
    fn resolve_principal(&self, principal: &Principal) -> Result<ResolvedSession> {
        let mut session = self
            .sessions
            .get(&principal.name)
            .map(|s| s.clone())
            .ok_or_else(|| VigilError::authentication(format!("No session for {}", principal.name)))?;

        let group = self.groups.get(&principal.group).map(|g| g.clone()).ok_or_else(|| {
            VigilError::new(
                ErrorCode::SessionResolutionFailed,
                format!("Unknown group {}", principal.group),
            )
        })?;

        session.group_id = group.id;
        session.group_name = group.name;
        session.group_permissions = group.permissions;
        debug!(principal = %principal, group_id = session.group_id, "Resolved principal");
        Ok(session)
    }

    fn invalidate_memberships(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Lookup
// ═══════════════════════════════════════════════════════════════════════════════

/// Returns loaded references when known, unloaded stubs otherwise.
#[derive(Debug, Default)]
pub struct InMemoryLookup {
    users: DashMap<i64, String>,
    groups: DashMap<i64, (String, Permissions)>,
}

impl InMemoryLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, id: i64, name: impl Into<String>) {
        self.users.insert(id, name.into());
    }

    pub fn add_group(&self, id: i64, name: impl Into<String>, permissions: Permissions) {
        self.groups.insert(id, (name.into(), permissions));
    }
}

impl LookupService for InMemoryLookup {
    fn user_proxy(&self, user_id: i64) -> Result<UserRef> {
        Ok(self
            .users
            .get(&user_id)
            .map(|name| UserRef::loaded(user_id, name.clone()))
            .unwrap_or_else(|| UserRef::unloaded(user_id)))
    }

    fn group_proxy(&self, group_id: i64) -> Result<GroupRef> {
        Ok(self
            .groups
            .get(&group_id)
            .map(|g| GroupRef::loaded(group_id, g.0.clone(), g.1.clone()))
            .unwrap_or_else(|| GroupRef::unloaded(group_id)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Updates
// ═══════════════════════════════════════════════════════════════════════════════

/// Assigns sequential event ids and keeps everything it was given.
#[derive(Debug)]
pub struct RecordingUpdateService {
    next_id: AtomicI64,
    events: Mutex<Vec<Event>>,
    logs: Mutex<Vec<EventLog>>,
    fail_logs: AtomicBool,
}

impl Default for RecordingUpdateService {
    fn default() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            events: Mutex::new(Vec::new()),
            logs: Mutex::new(Vec::new()),
            fail_logs: AtomicBool::new(false),
        }
    }
}

impl RecordingUpdateService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following bulk insert fail.
    pub fn fail_log_inserts(&self, fail: bool) {
        self.fail_logs.store(fail, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn logs(&self) -> Vec<EventLog> {
        self.logs.lock().clone()
    }
}

impl UpdateService for RecordingUpdateService {
    fn save_and_return_event(&self, mut event: Event) -> Result<Event> {
        event.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.events.lock().push(event.clone());
        Ok(event)
    }

    fn bulk_insert_logs(&self, logs: &[EventLog]) -> Result<()> {
        if self.fail_logs.load(Ordering::SeqCst) {
            return Err(VigilError::persistence("Bulk insert of event logs failed"));
        }
        self.logs.lock().extend_from_slice(logs);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Policy
// ═══════════════════════════════════════════════════════════════════════════════

/// Fixed restrictions per object kind.
#[derive(Debug, Default)]
pub struct StaticPolicyService {
    restrictions: DashMap<ObjectKind, BTreeSet<String>>,
}

impl StaticPolicyService {
    pub fn restrict(&self, kind: ObjectKind, restriction: impl Into<String>) {
        self.restrictions
            .entry(kind)
            .or_default()
            .insert(restriction.into());
    }
}

impl PolicyService for StaticPolicyService {
    fn list_active_restrictions(&self, object: &IObject) -> BTreeSet<String> {
        self.restrictions
            .get(&object.kind)
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Unit of work
// ═══════════════════════════════════════════════════════════════════════════════

/// Unit of work that records what the security layer did to it.
#[derive(Debug, Default)]
pub struct InMemoryConnection {
    filter: Option<ReadFilter>,
    filter_enables: usize,
    filter_disables: usize,
    managed: HashSet<ObjectHandle>,
    dirty: bool,
    stay_dirty: bool,
    fail_flush: bool,
    flushes: usize,
    clears: usize,
    locked: Vec<ObjectHandle>,
    references: HashMap<ObjectHandle, u64>,
}

impl InMemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an object, leaving the unit of work dirty.
    pub fn attach(&mut self, object: &IObject) {
        self.managed.insert(object.handle());
        self.dirty = true;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Keep reporting dirty after a flush.
    pub fn stay_dirty_after_flush(&mut self, stay: bool) {
        self.stay_dirty = stay;
    }

    pub fn fail_flush(&mut self, fail: bool) {
        self.fail_flush = fail;
    }

    pub fn set_external_references(&mut self, object: &IObject, count: u64) {
        self.references.insert(object.handle(), count);
    }

    pub fn filter_enables(&self) -> usize {
        self.filter_enables
    }

    pub fn filter_disables(&self) -> usize {
        self.filter_disables
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }

    pub fn clears(&self) -> usize {
        self.clears
    }

    pub fn is_locked(&self, object: &IObject) -> bool {
        self.locked.contains(&object.handle())
    }
}

impl PersistenceConnection for InMemoryConnection {
    fn enable_filter(&mut self, filter: ReadFilter) {
        self.filter = Some(filter);
        self.filter_enables += 1;
    }

    fn disable_filter(&mut self) {
        self.filter = None;
        self.filter_disables += 1;
    }

    fn active_filter(&self) -> Option<&ReadFilter> {
        self.filter.as_ref()
    }

    fn contains(&self, object: &IObject) -> bool {
        self.managed.contains(&object.handle())
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn flush(&mut self) -> Result<()> {
        if self.fail_flush {
            return Err(VigilError::persistence("Flush failed"));
        }
        self.flushes += 1;
        self.dirty = self.stay_dirty;
        Ok(())
    }

    fn clear(&mut self) {
        self.managed.clear();
        self.dirty = false;
        self.clears += 1;
    }

    fn lock(&mut self, object: &IObject) -> Result<()> {
        if !self.locked.contains(&object.handle()) {
            self.locked.push(object.handle());
        }
        self.dirty = true;
        Ok(())
    }

    fn unlock(&mut self, object: &IObject) -> Result<()> {
        let handle = object.handle();
        self.locked.retain(|h| *h != handle);
        self.dirty = true;
        Ok(())
    }

    fn count_external_references(&self, object: &IObject) -> Result<u64> {
        Ok(self.references.get(&object.handle()).copied().unwrap_or(0))
    }
}
