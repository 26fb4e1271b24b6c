//! Security facade.
//!
//! [`SecurityOrchestrator`] is shared by every call thread. All per-call
//! state lives in the caller's [`ContextStack`], which is passed in on each
//! operation; the orchestrator itself only holds the roles, the decision
//! engine and the collaborators.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Result, VigilError};
use crate::model::{Details, Event, EventLog, GroupRef, IObject, ObjectKind, UnlockProof, UserRef};
use crate::security::context::{EventContext, ALL_GROUPS};
use crate::security::details;
use crate::security::filter::ReadFilter;
use crate::security::principal::Principal;
use crate::security::roles::{AdminPrivilege, SecurityRoles};
use crate::security::stack::ContextStack;
use crate::security::token::PrivilegedToken;
use crate::security::voter::{AccessDecisionEngine, Caller};
use crate::services::{LookupService, PersistenceConnection, PolicyService, SessionResolver, UpdateService};
use crate::telemetry::logging::SensitiveFieldRedactor;
use crate::telemetry::metrics::{register_metric_descriptions, ContextCounter};

/// Subsystem id of the listener that merges detached graphs on update.
pub const MERGE_EVENT: &str = "merge-event";

pub struct SecurityOrchestrator {
    roles: SecurityRoles,
    engine: AccessDecisionEngine,
    sessions: Arc<dyn SessionResolver>,
    lookup: Arc<dyn LookupService>,
    updates: Arc<dyn UpdateService>,
}

impl fmt::Debug for SecurityOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityOrchestrator")
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

impl SecurityOrchestrator {
    pub fn new(
        roles: SecurityRoles,
        sessions: Arc<dyn SessionResolver>,
        lookup: Arc<dyn LookupService>,
        updates: Arc<dyn UpdateService>,
        policy: Arc<dyn PolicyService>,
    ) -> Self {
        register_metric_descriptions();
        Self {
            engine: AccessDecisionEngine::new(roles.clone(), policy),
            roles,
            sessions,
            lookup,
            updates,
        }
    }

    pub fn roles(&self) -> &SecurityRoles {
        &self.roles
    }

    pub fn engine(&self) -> &AccessDecisionEngine {
        &self.engine
    }

    pub fn updates(&self) -> &Arc<dyn UpdateService> {
        &self.updates
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Login state
    // ─────────────────────────────────────────────────────────────────────────

    pub fn login(&self, stack: &mut ContextStack, principal: Principal) -> Result<usize> {
        debug!(
            principal = %SensitiveFieldRedactor::global().redact_value(&principal.to_string()),
            "Login"
        );
        stack.login(principal)
    }

    /// Pop the top principal and drop its context.
    pub fn logout(&self, stack: &mut ContextStack) -> usize {
        stack.clear();
        let depth = stack.logout();
        debug!(depth, "Logout");
        depth
    }

    pub fn is_ready(&self, stack: &ContextStack) -> bool {
        stack.is_ready()
    }

    /// The established context, or `ApiUsage` when there is none.
    pub fn current<'s>(&self, stack: &'s ContextStack) -> Result<&'s EventContext> {
        stack
            .current()
            .ok_or_else(|| VigilError::api_usage("Security context not established"))
    }

    pub fn caller<'s>(&self, stack: &'s ContextStack) -> Result<Caller<'s>> {
        self.current(stack).map(Caller::new)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Context establishment
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolve the top principal into a fresh context for one call.
    ///
    /// Mutating calls save a new `Event` and load real owner/group
    /// references; read-only calls get unsaved placeholders.
    pub fn establish<'s>(&self, stack: &'s mut ContextStack, read_only: bool) -> Result<&'s EventContext> {
        let principal = self.clear_and_check_principal(stack)?;
        let session = self.sessions.resolve_principal(&principal)?;

        if session.group_id != ALL_GROUPS && !session.member_of_groups.contains(&session.group_id) {
            return Err(VigilError::authentication(format!(
                "User {} is not a member of group {}",
                session.user_id, session.group_id
            )));
        }

        let is_admin = self.roles.is_system_group(session.group_id);
        let event_type = if principal.event_type.is_empty() {
            session.default_event_type.clone()
        } else {
            principal.event_type.clone()
        };

        let (owner, group, event) = if read_only {
            (
                UserRef::unloaded(session.user_id),
                GroupRef::unloaded(session.group_id),
                Event::new(session.session_id, event_type, session.user_id, session.group_id),
            )
        } else {
            let owner = self.lookup.user_proxy(session.user_id)?;
            let group = self.lookup.group_proxy(session.group_id)?;
            let event = self.updates.save_and_return_event(Event::new(
                session.session_id,
                event_type,
                session.user_id,
                session.group_id,
            ))?;
            if !event.is_saved() {
                return Err(VigilError::internal("Update service returned an unsaved event"));
            }
            (owner, group, event)
        };

        let mut builder = EventContext::builder(session.user_id, session.group_id)
            .session(session.session_id, session.session_uuid)
            .user_name(session.user_name)
            .group_name(session.group_name)
            .group_permissions(session.group_permissions)
            .event(event)
            .owner(owner)
            .group(group)
            .admin(is_admin)
            .read_only(read_only)
            .member_of(session.member_of_groups)
            .leader_of(session.leader_of_groups);
        if let Some(privileges) = session.admin_privileges {
            builder = builder.privileges(privileges);
        }

        let ctx = stack.install(builder.build())?;
        info!(
            user_id = ctx.user_id(),
            group_id = ctx.group_id(),
            event_id = ?ctx.event_id(),
            is_admin = ctx.is_admin(),
            read_only,
            "Event context established"
        );
        ContextCounter::established(read_only);
        Ok(ctx)
    }

    /// Reinstall a context cached by a stateful target.
    ///
    /// The context must belong to the logged-in principal; anything else is
    /// a context mix-up between pooled instances and is fatal to the call.
    pub fn set_event_context(&self, stack: &mut ContextStack, context: EventContext) -> Result<()> {
        let principal = self.clear_and_check_principal(stack)?;

        let user_matches = principal.matches(context.user_name(), context.group_name(), context.event_type())
            || context
                .session_uuid()
                .map(|uuid| principal.matches(uuid, context.group_name(), context.event_type()))
                .unwrap_or(false);
        if !user_matches {
            return Err(VigilError::internal(format!(
                "Cached context {}/{}/{} does not belong to {}",
                context.user_name(),
                context.group_name(),
                context.event_type(),
                principal
            )));
        }

        stack.install(context)?;
        ContextCounter::reused();
        Ok(())
    }

    /// Drop the current context and its per-call caches.
    pub fn invalidate(&self, stack: &mut ContextStack) {
        if let Some(ctx) = stack.clear() {
            debug!(user_id = ctx.user_id(), "Event context invalidated");
        }
    }

    fn clear_and_check_principal(&self, stack: &mut ContextStack) -> Result<Principal> {
        stack.clear();
        stack
            .principal()
            .cloned()
            .ok_or_else(|| VigilError::api_usage("No principal logged in"))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Read filter
    // ─────────────────────────────────────────────────────────────────────────

    /// Install the current context's row filter, replacing any previous one.
    pub fn enable_read_filter<C>(&self, stack: &ContextStack, conn: &mut C) -> Result<()>
    where
        C: PersistenceConnection + ?Sized,
    {
        let filter = ReadFilter::from_context(self.current(stack)?);
        debug!(
            is_admin = filter.is_admin,
            user_id = filter.current_user,
            groups = ?filter.current_groups,
            "Read filter enabled"
        );
        conn.enable_filter(filter);
        Ok(())
    }

    pub fn disable_read_filter<C>(&self, conn: &mut C)
    where
        C: PersistenceConnection + ?Sized,
    {
        conn.disable_filter();
        debug!("Read filter disabled");
    }

    /// Run `f` with the read filter enabled, disabling it afterwards.
    pub fn with_read_filter<C, T, F>(&self, stack: &ContextStack, conn: &mut C, f: F) -> Result<T>
    where
        C: PersistenceConnection + ?Sized,
        F: FnOnce(&mut C) -> Result<T>,
    {
        self.enable_read_filter(stack, conn)?;
        let result = f(conn);
        self.disable_read_filter(conn);
        result
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Privileged actions
    // ─────────────────────────────────────────────────────────────────────────

    /// Run `action` with a one-shot token covering `objects`.
    ///
    /// The token is invalidated when the action returns, whatever the outcome.
    pub fn do_action<T, F>(&self, stack: &ContextStack, objects: &[&IObject], action: F) -> Result<T>
    where
        F: FnOnce(Caller<'_>) -> Result<T>,
    {
        let ctx = self.current(stack)?;
        let token = PrivilegedToken::issue(objects.iter().map(|o| o.handle()));
        debug!(token = %token.id(), objects = objects.len(), "Privileged action");

        let result = action(Caller::with_token(ctx, &token));
        token.invalidate();
        result
    }

    /// Run `action` as an unrestricted admin.
    ///
    /// The merge listener is disabled and the read filter re-enabled with
    /// admin rights for the duration. Admin flag, privileges and merge
    /// listener are restored on every exit path. The filter is re-enabled
    /// for the caller only if one was active on entry, otherwise it is
    /// disabled. Never pass detached objects into the action.
    pub fn run_as_admin<C, T, F>(&self, stack: &mut ContextStack, conn: &mut C, action: F) -> Result<T>
    where
        C: PersistenceConnection + ?Sized,
        F: FnOnce(&mut ContextStack, &mut C) -> Result<T>,
    {
        let ctx = stack
            .current_mut()
            .ok_or_else(|| VigilError::api_usage("Security context not established"))?;
        let had_filter = conn.active_filter().is_some();
        let was_admin = ctx.is_admin();
        let merge_was_disabled = ctx.is_disabled(MERGE_EVENT);
        let privileges = ctx.replace_privileges(AdminPrivilege::all());
        ctx.set_admin(true);
        ctx.disable_subsystems(&[MERGE_EVENT]);
        debug!(user_id = ctx.user_id(), "Running as admin");

        let result = self
            .enable_read_filter(stack, conn)
            .and_then(|()| action(stack, conn));

        let restored = match stack.current_mut() {
            Some(ctx) => {
                ctx.set_admin(was_admin);
                ctx.replace_privileges(privileges);
                if !merge_was_disabled {
                    ctx.enable_subsystems(&[MERGE_EVENT]);
                }
                if had_filter {
                    self.enable_read_filter(stack, conn)
                } else {
                    self.disable_read_filter(conn);
                    Ok(())
                }
            }
            None => {
                warn!("Context vanished during elevated action");
                self.disable_read_filter(conn);
                Ok(())
            }
        };

        let value = result?;
        restored?;
        Ok(value)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Subsystems
    // ─────────────────────────────────────────────────────────────────────────

    pub fn disable(&self, stack: &ContextStack, ids: &[&str]) -> Result<()> {
        if ids.is_empty() {
            return Err(VigilError::api_usage("No subsystem ids to disable"));
        }
        self.current(stack)?.disable_subsystems(ids);
        Ok(())
    }

    /// Re-enable the named subsystems; all of them when `ids` is empty.
    pub fn enable(&self, stack: &ContextStack, ids: &[&str]) -> Result<()> {
        let ctx = self.current(stack)?;
        if ids.is_empty() {
            ctx.enable_all_subsystems();
        } else {
            ctx.enable_subsystems(ids);
        }
        Ok(())
    }

    pub fn is_disabled(&self, stack: &ContextStack, id: &str) -> Result<bool> {
        Ok(self.current(stack)?.is_disabled(id))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Audit logs
    // ─────────────────────────────────────────────────────────────────────────

    /// Record `action` on `kind:id` against the current event.
    ///
    /// Audit records themselves are never logged.
    pub fn add_log(&self, stack: &ContextStack, action: &str, kind: ObjectKind, id: i64) -> Result<()> {
        let ctx = self.current(stack)?;
        if kind.is_audit_type() {
            return Ok(());
        }
        ctx.push_log(EventLog::new(action, kind, id, ctx.event_id()));
        Ok(())
    }

    pub fn logs(&self, stack: &ContextStack) -> Result<Vec<EventLog>> {
        Ok(self.current(stack)?.logs())
    }

    /// Take the pending logs. Membership caches are invalidated when any of
    /// them touched users, groups or memberships.
    pub fn clear_logs(&self, stack: &ContextStack) -> Result<Vec<EventLog>> {
        let logs = self.current(stack)?.take_logs();
        if logs.iter().any(|l| l.entity_type.is_admin_type()) {
            debug!("Admin types changed; invalidating memberships");
            self.sessions.invalidate_memberships();
        }
        Ok(logs)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Locking
    // ─────────────────────────────────────────────────────────────────────────

    pub fn add_lock_candidate(&self, stack: &ContextStack, object: &IObject) -> Result<()> {
        self.current(stack)?.push_lock_candidate(object.clone());
        Ok(())
    }

    /// A link ties parent and child together; both become LOCKED on flush.
    pub fn register_link(&self, stack: &ContextStack, parent: &IObject, child: &IObject) -> Result<()> {
        let ctx = self.current(stack)?;
        ctx.push_lock_candidate(parent.clone());
        ctx.push_lock_candidate(child.clone());
        Ok(())
    }

    /// Persist LOCKED on every pending candidate. Returns how many were locked.
    pub fn apply_lock_candidates<C>(&self, stack: &ContextStack, conn: &mut C) -> Result<usize>
    where
        C: PersistenceConnection + ?Sized,
    {
        let candidates = self.current(stack)?.take_lock_candidates();
        for candidate in &candidates {
            conn.lock(candidate)?;
        }
        if !candidates.is_empty() {
            debug!(count = candidates.len(), "Locked candidates");
        }
        Ok(candidates.len())
    }

    /// Clear LOCKED when nothing outside the object's graph refers to it.
    pub fn unlock<C>(&self, stack: &ContextStack, conn: &mut C, object: &mut IObject) -> Result<()>
    where
        C: PersistenceConnection + ?Sized,
    {
        let caller = self.caller(stack)?;
        if !self.engine.allow_chmod(&caller, object, None) {
            return Err(VigilError::security_violation(format!(
                "User {} may not unlock {}",
                caller.context().user_id(),
                object
            )));
        }

        let references = conn.count_external_references(object)?;
        if references > 0 {
            return Err(VigilError::locked(format!(
                "{} is still referenced by {} object(s)",
                object, references
            ))
            .with_context("references", references));
        }

        conn.unlock(object)?;
        if let Some(details) = object.details.as_mut() {
            details.clear_lock(UnlockProof::new());
        }
        info!(object = %object, "Unlocked");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Details
    // ─────────────────────────────────────────────────────────────────────────

    pub fn new_transient_details(&self, stack: &ContextStack, object: &IObject) -> Result<Details> {
        details::new_transient_details(&self.engine, &self.caller(stack)?, object)
    }

    pub fn check_managed_details(&self, stack: &ContextStack, object: &IObject, trusted: &Details) -> Result<Details> {
        details::check_managed_details(&self.engine, &self.caller(stack)?, object, trusted)
    }

    pub fn allow_chmod(&self, stack: &ContextStack, object: &IObject) -> Result<bool> {
        Ok(self.engine.allow_chmod(&self.caller(stack)?, object, None))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
