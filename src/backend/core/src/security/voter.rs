//! Access decision engine.
//!
//! The engine answers one question: "may the caller of this context do
//! operation X to object O?". It holds no per-call state; everything
//! caller-specific comes from the [`Caller`] passed to each vote.
//!
//! Scope computation for update/delete/annotate/link runs in a fixed order:
//!
//! 1. an open privileged-token grant for the object allows every scope
//! 2. graph-critical suppression cancels LINK and ANNOTATE on non-owned objects
//! 3. an admin holding the privilege for the object kind gets the rest
//! 4. system types are denied to everyone else
//! 5. a leader of the object's group gets the rest
//! 6. the remaining scopes are granted from the group's permission bits

use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Result, VigilError};
use crate::model::{Details, IObject, ObjectKind, Permissions, Right, Role, Scope, Scopes};
use crate::security::context::EventContext;
use crate::security::filter::ReadFilter;
use crate::security::roles::{AdminPrivilege, SecurityRoles};
use crate::security::token::PrivilegedToken;
use crate::services::PolicyService;
use crate::telemetry::metrics::VoteCounter;

// ═══════════════════════════════════════════════════════════════════════════════
// Caller
// ═══════════════════════════════════════════════════════════════════════════════

/// The current context plus the privileged token of an enclosing `do_action`.
#[derive(Debug, Clone, Copy)]
pub struct Caller<'a> {
    context: &'a EventContext,
    token: Option<&'a PrivilegedToken>,
}

impl<'a> Caller<'a> {
    pub fn new(context: &'a EventContext) -> Self {
        Self {
            context,
            token: None,
        }
    }

    pub fn with_token(context: &'a EventContext, token: &'a PrivilegedToken) -> Self {
        Self {
            context,
            token: Some(token),
        }
    }

    pub fn context(&self) -> &'a EventContext {
        self.context
    }

    pub fn token(&self) -> Option<&'a PrivilegedToken> {
        self.token
    }

    /// Token grant still open for this object. Does not consume it.
    pub fn token_covers(&self, object: &IObject) -> bool {
        self.token.map(|t| t.covers(object.handle())).unwrap_or(false)
    }

    /// Consume the token grant for this object.
    pub fn redeem_token(&self, object: &IObject) -> bool {
        self.token.map(|t| t.redeem(object.handle())).unwrap_or(false)
    }

    /// Admin with the named privilege, or a token grant for the object.
    pub fn is_privileged(&self, privilege: AdminPrivilege, object: &IObject) -> bool {
        self.context.has_privilege(privilege) || self.token_covers(object)
    }

    /// Transient objects count as owned by their presumptive creator.
    pub fn owns(&self, object: &IObject, details: Option<&Details>) -> bool {
        if object.is_transient() {
            return true;
        }
        details.and_then(|d| d.owner_id()) == Some(self.context.user_id())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Operations
// ═══════════════════════════════════════════════════════════════════════════════

/// Vote names, used for metrics and violation messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Load,
    Create,
    Update,
    Delete,
    Annotate,
    Link,
    Chmod,
}

impl Operation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Annotate => "annotate",
            Self::Link => "link",
            Self::Chmod => "chmod",
        }
    }

    fn scope(&self) -> Option<Scope> {
        match self {
            Self::Update => Some(Scope::Edit),
            Self::Delete => Some(Scope::Delete),
            Self::Annotate => Some(Scope::Annotate),
            Self::Link => Some(Scope::Link),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Engine
// ═══════════════════════════════════════════════════════════════════════════════

/// Pure decision layer. Mutates nothing except through [`Self::post_process`]
/// and the group-permission cache filled by [`Self::allow_load`].
#[derive(Clone)]
pub struct AccessDecisionEngine {
    roles: SecurityRoles,
    policy: Arc<dyn PolicyService>,
}

impl fmt::Debug for AccessDecisionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessDecisionEngine")
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

impl AccessDecisionEngine {
    pub fn new(roles: SecurityRoles, policy: Arc<dyn PolicyService>) -> Self {
        Self { roles, policy }
    }

    pub fn roles(&self) -> &SecurityRoles {
        &self.roles
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Load
    // ─────────────────────────────────────────────────────────────────────────

    /// Row-level read vote.
    pub fn allow_load(&self, caller: &Caller<'_>, kind: ObjectKind, details: Option<&Details>) -> bool {
        let ctx = caller.context();

        let allowed = match details {
            None => true,
            Some(_) if kind.is_system_type() => true,
            Some(d) => match d.group_id() {
                Some(group_id) if self.roles.is_globally_visible_group(group_id) => true,
                _ => ReadFilter::from_context(ctx).passes(d),
            },
        };

        // With no fixed group, remember what each group allowed; the filter
        // parameters are gone once the call ends.
        if ctx.is_all_groups() {
            if let Some(d) = details {
                if let Some(group) = &d.group {
                    if let Some(perms) = group.permissions.as_ref().or_else(|| d.permissions()) {
                        ctx.cache_group_permissions(group.id, Permissions::from_bits(perms.bits()));
                    }
                }
            }
        }

        VoteCounter::record(Operation::Load.as_str(), allowed);
        allowed
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Create
    // ─────────────────────────────────────────────────────────────────────────

    /// Creation vote. Only system types are restricted.
    pub fn allow_creation(&self, caller: &Caller<'_>, object: &IObject) -> bool {
        let ctx = caller.context();

        let allowed = if caller.redeem_token(object) || !object.kind.is_system_type() {
            true
        } else if !ctx.is_admin() {
            false
        } else {
            !object.kind.is_experimenter() || ctx.has_privilege(AdminPrivilege::ModifyUser)
        };

        VoteCounter::record(Operation::Create.as_str(), allowed);
        allowed
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scope-derived votes
    // ─────────────────────────────────────────────────────────────────────────

    /// Edit vote against the trusted (database) details.
    pub fn allow_update(&self, caller: &Caller<'_>, object: &IObject, trusted: Option<&Details>) -> Result<bool> {
        self.scope_vote(caller, Operation::Update, object, trusted)
    }

    pub fn allow_delete(&self, caller: &Caller<'_>, object: &IObject, trusted: Option<&Details>) -> Result<bool> {
        self.scope_vote(caller, Operation::Delete, object, trusted)
    }

    pub fn allow_annotate(&self, caller: &Caller<'_>, object: &IObject, trusted: Option<&Details>) -> Result<bool> {
        self.scope_vote(caller, Operation::Annotate, object, trusted)
    }

    pub fn allow_link(&self, caller: &Caller<'_>, object: &IObject, trusted: Option<&Details>) -> Result<bool> {
        self.scope_vote(caller, Operation::Link, object, trusted)
    }

    fn scope_vote(
        &self,
        caller: &Caller<'_>,
        operation: Operation,
        object: &IObject,
        trusted: Option<&Details>,
    ) -> Result<bool> {
        let scope = operation
            .scope()
            .ok_or_else(|| VigilError::internal(format!("{} is not a scope vote", operation)))?;

        let allowed = if caller.redeem_token(object) {
            true
        } else {
            self.compute_scopes(caller, object, trusted, &[scope])?.get(scope)
        };

        debug!(
            user_id = caller.context().user_id(),
            object = %object,
            operation = %operation,
            allowed,
            "Vote"
        );
        VoteCounter::record(operation.as_str(), allowed);
        Ok(allowed)
    }

    /// Vote and raise the matching violation on denial.
    pub fn enforce(
        &self,
        caller: &Caller<'_>,
        operation: Operation,
        object: &IObject,
        trusted: Option<&Details>,
    ) -> Result<()> {
        let allowed = match operation {
            Operation::Load => self.allow_load(caller, object.kind, trusted),
            Operation::Create => self.allow_creation(caller, object),
            Operation::Chmod => self.allow_chmod(caller, object, trusted),
            _ => self.scope_vote(caller, operation, object, trusted)?,
        };
        if allowed {
            Ok(())
        } else {
            Err(self.violation(caller, operation, object, trusted))
        }
    }

    /// Scopes the caller holds on the object, restricted to `requested`.
    pub fn compute_scopes(
        &self,
        caller: &Caller<'_>,
        object: &IObject,
        trusted: Option<&Details>,
        requested: &[Scope],
    ) -> Result<Scopes> {
        let mut scopes = Scopes::NONE;
        for scope in requested {
            scopes.set(*scope, true);
        }

        if caller.token_covers(object) {
            return Ok(scopes);
        }

        let ctx = caller.context();
        let kind = object.kind;
        let details = trusted.or(object.details.as_ref());
        let owned = caller.owns(object, details);

        let required = if kind.is_file() {
            AdminPrivilege::WriteFile
        } else if kind.is_experimenter() {
            AdminPrivilege::ModifyUser
        } else {
            AdminPrivilege::WriteOwned
        };
        let privileged_admin = ctx.is_admin() && ctx.has_privilege(required);

        if !kind.is_system_type() && !owned {
            if let Some(d) = details {
                // An unresolvable group is not graph-critical for a privileged admin.
                let critical = match self.graph_critical(caller, d) {
                    Some(critical) => critical,
                    None if privileged_admin => false,
                    None => return Err(self.unresolved_group(ctx, d)),
                };
                if critical {
                    scopes.set(Scope::Link, false);
                    scopes.set(Scope::Annotate, false);
                }
            }
        }

        if privileged_admin {
            return Ok(scopes);
        }

        if kind.is_system_type() {
            return Ok(Scopes::NONE);
        }

        let Some(d) = details else {
            return Ok(scopes);
        };

        let group_id = d.group_id();
        if group_id.map(|g| ctx.is_leader_of(g)).unwrap_or(false) {
            return Ok(scopes);
        }
        let member = group_id.map(|g| ctx.is_member_of(g)).unwrap_or(false);
        let perms = self.effective_group_permissions(ctx, d)?;

        for scope in Scope::all() {
            if !scopes.get(scope) {
                continue;
            }
            let right = match scope {
                Scope::Annotate => Right::Annotate,
                _ => Right::Write,
            };
            let granted = perms.is_granted(Role::World, right)
                || (owned && perms.is_granted(Role::Owner, right))
                || (member && perms.is_granted(Role::Group, right));
            scopes.set(scope, granted);
        }

        Ok(scopes)
    }

    /// Group permissions in force for the object's group.
    ///
    /// Resolution order: the active group's live permissions, the per-call
    /// cache, the permissions carried on the group reference, and finally the
    /// empty set for the "user" group.
    pub fn effective_group_permissions(&self, ctx: &EventContext, details: &Details) -> Result<Permissions> {
        self.resolve_group_permissions(ctx, details)
            .ok_or_else(|| self.unresolved_group(ctx, details))
    }

    fn resolve_group_permissions(&self, ctx: &EventContext, details: &Details) -> Option<Permissions> {
        let Some(group_id) = details.group_id() else {
            return details.permissions().map(|p| Permissions::from_bits(p.bits()));
        };

        if group_id == ctx.group_id() {
            return Some(ctx.group_permissions().clone());
        }
        if let Some(cached) = ctx.cached_group_permissions(group_id) {
            return Some(cached);
        }
        if let Some(perms) = details.group.as_ref().and_then(|g| g.permissions.as_ref()) {
            return Some(Permissions::from_bits(perms.bits()));
        }
        if self.roles.is_user_group(group_id) {
            return Some(Permissions::empty());
        }
        None
    }

    fn unresolved_group(&self, ctx: &EventContext, details: &Details) -> VigilError {
        match details.group_id() {
            Some(group_id) => {
                warn!(group_id, user_id = ctx.user_id(), "Group permissions unavailable");
                VigilError::internal(format!(
                    "Permissions for group {} are not known to the current context",
                    group_id
                ))
            }
            None => VigilError::internal(format!("No group and no permissions on {:?}", details)),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Graph-criticality & chmod
    // ─────────────────────────────────────────────────────────────────────────

    /// Non-owners in the caller's position may read the group but not write
    /// it, and the caller does not lead it.
    pub fn is_graph_critical(&self, caller: &Caller<'_>, details: &Details) -> Result<bool> {
        self.graph_critical(caller, details)
            .ok_or_else(|| self.unresolved_group(caller.context(), details))
    }

    /// `None` when the group's permissions cannot be resolved.
    fn graph_critical(&self, caller: &Caller<'_>, details: &Details) -> Option<bool> {
        let ctx = caller.context();
        let Some(group_id) = details.group_id() else {
            return Some(false);
        };
        if ctx.is_leader_of(group_id) {
            return Some(false);
        }

        let perms = self.resolve_group_permissions(ctx, details)?;
        let role = if ctx.is_member_of(group_id) {
            Role::Group
        } else {
            Role::World
        };
        Some(perms.is_granted(role, Right::Read) && !perms.is_granted(role, Right::Write))
    }

    /// Permission changes: owner, group leader or admin.
    pub fn allow_chmod(&self, caller: &Caller<'_>, object: &IObject, trusted: Option<&Details>) -> bool {
        let ctx = caller.context();
        let details = trusted.or(object.details.as_ref());

        let allowed = ctx.is_admin()
            || caller.token_covers(object)
            || details.and_then(|d| d.owner_id()) == Some(ctx.user_id())
            || details
                .and_then(|d| d.group_id())
                .map(|g| ctx.is_leader_of(g))
                .unwrap_or(false);

        VoteCounter::record(Operation::Chmod.as_str(), allowed);
        allowed
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Post-load view
    // ─────────────────────────────────────────────────────────────────────────

    /// Attach the caller-relative scopes and active restrictions to the
    /// object's permissions. Bits are left untouched, so repeating the call in
    /// the same context gives the same result.
    pub fn post_process(&self, caller: &Caller<'_>, object: &mut IObject) -> Result<()> {
        let Some(details) = object.details.as_ref() else {
            return Ok(());
        };
        let Some(perms) = details.permissions() else {
            return Ok(());
        };

        let allowed = self.compute_scopes(caller, object, Some(details), &Scope::all())?;
        let restrictions = self.policy.list_active_restrictions(object);
        let view = Permissions::from_bits(perms.bits()).with_allowed(allowed, restrictions);

        if let Some(details) = object.details.as_mut() {
            details.replace_permissions_view(view);
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Violations
    // ─────────────────────────────────────────────────────────────────────────

    /// Typed error for a negative vote.
    ///
    /// Denied LINK/ANNOTATE on a non-owned object in a graph-critical group
    /// becomes a [`GraphCriticalViolation`](crate::error::ErrorCode::GraphCriticalViolation).
    pub fn violation(
        &self,
        caller: &Caller<'_>,
        operation: Operation,
        object: &IObject,
        trusted: Option<&Details>,
    ) -> VigilError {
        let ctx = caller.context();
        let details = trusted.or(object.details.as_ref());

        let graph_critical = matches!(operation, Operation::Link | Operation::Annotate)
            && !caller.owns(object, details)
            && details
                .and_then(|d| self.graph_critical(caller, d))
                .unwrap_or(false);

        let message = format!(
            "{} of {} denied for user {} in group {}",
            operation,
            object,
            ctx.user_id(),
            ctx.group_id()
        );
        let err = if graph_critical {
            VigilError::graph_critical(message)
        } else {
            VigilError::security_violation(message)
        };

        err.with_context("operation", operation.as_str())
            .with_context("object", object.to_string())
            .with_context("user_id", ctx.user_id())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::model::{GroupRef, UserRef};
    use crate::services::memory::StaticPolicyService;

    const LAB: i64 = 5;

    fn engine() -> AccessDecisionEngine {
        AccessDecisionEngine::new(SecurityRoles::default(), Arc::new(StaticPolicyService::default()))
    }

    fn member(user: i64, perms: Permissions) -> EventContext {
        EventContext::builder(user, LAB)
            .group_permissions(perms)
            .member_of([LAB, 1])
            .build()
    }

    fn project(owner: i64, perms: Permissions) -> IObject {
        IObject::with_id(ObjectKind::Project, 100).with_details(Details::new(
            UserRef::unloaded(owner),
            GroupRef::unloaded(LAB),
            perms,
        ))
    }

    #[test]
    fn test_owner_edits_private() {
        let ctx = member(2, Permissions::private());
        let caller = Caller::new(&ctx);
        let o = project(2, Permissions::private());
        assert!(engine().allow_update(&caller, &o, o.details.as_ref()).unwrap());
        assert!(engine().allow_delete(&caller, &o, o.details.as_ref()).unwrap());
    }

    #[test]
    fn test_member_cannot_edit_read_only() {
        let ctx = member(3, Permissions::read_only());
        let caller = Caller::new(&ctx);
        let o = project(2, Permissions::read_only());
        assert!(!engine().allow_update(&caller, &o, o.details.as_ref()).unwrap());
        assert!(!engine().allow_annotate(&caller, &o, o.details.as_ref()).unwrap());
    }

    #[test]
    fn test_member_edits_read_write() {
        let ctx = member(3, Permissions::read_write());
        let caller = Caller::new(&ctx);
        let o = project(2, Permissions::read_write());
        assert!(engine().allow_update(&caller, &o, o.details.as_ref()).unwrap());
        assert!(engine().allow_link(&caller, &o, o.details.as_ref()).unwrap());
    }

    #[test]
    fn test_leader_overrides_bits() {
        let ctx = EventContext::builder(4, LAB)
            .group_permissions(Permissions::private())
            .member_of([LAB])
            .leader_of([LAB])
            .build();
        let caller = Caller::new(&ctx);
        let o = project(2, Permissions::private());
        let scopes = engine()
            .compute_scopes(&caller, &o, o.details.as_ref(), &Scope::all())
            .unwrap();
        assert_eq!(scopes, Scopes::ALL);
    }

    #[test]
    fn test_graph_critical_cancels_link_not_delete() {
        let ctx = EventContext::builder(0, LAB)
            .admin(true)
            .group_permissions(Permissions::read_only())
            .member_of([LAB])
            .build();
        let caller = Caller::new(&ctx);
        let o = project(2, Permissions::read_only());
        let e = engine();

        assert!(e.is_graph_critical(&caller, o.details.as_ref().unwrap()).unwrap());
        assert!(!e.allow_link(&caller, &o, o.details.as_ref()).unwrap());
        assert!(!e.allow_annotate(&caller, &o, o.details.as_ref()).unwrap());
        assert!(e.allow_delete(&caller, &o, o.details.as_ref()).unwrap());
        assert!(e.allow_update(&caller, &o, o.details.as_ref()).unwrap());

        let err = e.violation(&caller, Operation::Link, &o, o.details.as_ref());
        assert_eq!(err.code(), ErrorCode::GraphCriticalViolation);
        let err = e.violation(&caller, Operation::Update, &o, o.details.as_ref());
        assert_eq!(err.code(), ErrorCode::SecurityViolation);
    }

    #[test]
    fn test_transient_counts_as_owned() {
        let ctx = member(3, Permissions::read_only());
        let caller = Caller::new(&ctx);
        let o = IObject::new(ObjectKind::Project).with_details(Details::new(
            UserRef::unloaded(2),
            GroupRef::unloaded(LAB),
            Permissions::read_only(),
        ));
        assert!(engine().allow_link(&caller, &o, o.details.as_ref()).unwrap());
    }

    #[test]
    fn test_admin_without_write_owned_cannot_update() {
        let ctx = EventContext::builder(9, 0)
            .admin(true)
            .privileges([AdminPrivilege::Chown, AdminPrivilege::WriteFile])
            .member_of([0])
            .build();
        ctx.cache_group_permissions(LAB, Permissions::read_only());
        let caller = Caller::new(&ctx);
        let e = engine();

        assert!(ctx.is_admin());
        let o = project(2, Permissions::read_only());
        assert!(!e.allow_update(&caller, &o, o.details.as_ref()).unwrap());

        // WriteFile still covers files.
        let file = IObject::with_id(ObjectKind::OriginalFile, 7).with_details(Details::new(
            UserRef::unloaded(2),
            GroupRef::unloaded(LAB),
            Permissions::read_only(),
        ));
        assert!(e.allow_update(&caller, &file, file.details.as_ref()).unwrap());
    }

    #[test]
    fn test_light_admin_falls_through_to_bits() {
        let ctx = EventContext::builder(9, LAB)
            .admin(true)
            .privileges([AdminPrivilege::Chown])
            .group_permissions(Permissions::read_write())
            .member_of([LAB])
            .build();
        let caller = Caller::new(&ctx);
        let file = IObject::with_id(ObjectKind::OriginalFile, 7).with_details(Details::new(
            UserRef::unloaded(2),
            GroupRef::unloaded(LAB),
            Permissions::read_write(),
        ));
        // GROUP WRITE still grants it as a member.
        assert!(engine().allow_update(&caller, &file, file.details.as_ref()).unwrap());
    }

    #[test]
    fn test_system_types_need_admin() {
        let ctx = member(3, Permissions::read_write());
        let caller = Caller::new(&ctx);
        let user = IObject::with_id(ObjectKind::Experimenter, 3).with_details(Details::new(
            UserRef::unloaded(3),
            GroupRef::unloaded(LAB),
            Permissions::read_write(),
        ));
        assert!(!engine().allow_update(&caller, &user, user.details.as_ref()).unwrap());
        assert!(!engine().allow_creation(&caller, &IObject::new(ObjectKind::Experimenter)));
        assert!(engine().allow_creation(&caller, &IObject::new(ObjectKind::Project)));
    }

    #[test]
    fn test_admin_without_modify_user_cannot_create_experimenter() {
        let ctx = EventContext::builder(9, 0)
            .admin(true)
            .privileges([AdminPrivilege::WriteOwned])
            .build();
        let caller = Caller::new(&ctx);
        assert!(!engine().allow_creation(&caller, &IObject::new(ObjectKind::Experimenter)));
        assert!(engine().allow_creation(&caller, &IObject::new(ObjectKind::ExperimenterGroup)));
    }

    #[test]
    fn test_token_is_one_shot() {
        let ctx = member(3, Permissions::read_only());
        let o = project(2, Permissions::read_only());
        let token = PrivilegedToken::issue([o.handle()]);
        let caller = Caller::with_token(&ctx, &token);
        let e = engine();

        assert_eq!(e.compute_scopes(&caller, &o, o.details.as_ref(), &Scope::all()).unwrap(), Scopes::ALL);
        assert!(e.allow_update(&caller, &o, o.details.as_ref()).unwrap());
        assert!(!e.allow_update(&caller, &o, o.details.as_ref()).unwrap());
    }

    #[test]
    fn test_unknown_group_permissions_is_internal_error() {
        let ctx = member(3, Permissions::read_only());
        let caller = Caller::new(&ctx);
        let o = IObject::with_id(ObjectKind::Dataset, 1).with_details(Details::new(
            UserRef::unloaded(2),
            GroupRef::unloaded(42),
            Permissions::read_only(),
        ));
        let err = engine().allow_update(&caller, &o, o.details.as_ref()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InternalError);
    }

    #[test]
    fn test_user_group_falls_back_to_empty() {
        let ctx = member(3, Permissions::read_only());
        let caller = Caller::new(&ctx);
        let o = IObject::with_id(ObjectKind::Annotation, 1).with_details(Details::new(
            UserRef::unloaded(2),
            GroupRef::unloaded(1),
            Permissions::public(),
        ));
        assert!(!engine().allow_update(&caller, &o, o.details.as_ref()).unwrap());
    }

    #[test]
    fn test_all_groups_load_caches_permissions() {
        let ctx = EventContext::builder(3, -1).member_of([LAB]).build();
        let caller = Caller::new(&ctx);
        let d = Details::new(
            UserRef::unloaded(2),
            GroupRef::loaded(LAB, "lab", Permissions::read_annotate()),
            Permissions::read_annotate(),
        );
        assert!(engine().allow_load(&caller, ObjectKind::Image, Some(&d)));
        assert_eq!(
            ctx.cached_group_permissions(LAB).map(|p| p.bits()),
            Some(Permissions::read_annotate().bits())
        );
    }

    #[test]
    fn test_load_without_membership_denied() {
        let ctx = EventContext::builder(3, 9).build();
        let caller = Caller::new(&ctx);
        let d = Details::new(UserRef::unloaded(2), GroupRef::unloaded(LAB), Permissions::read_only());
        assert!(!engine().allow_load(&caller, ObjectKind::Image, Some(&d)));
        assert!(engine().allow_load(&caller, ObjectKind::Image, None));
        assert!(engine().allow_load(&caller, ObjectKind::Experimenter, Some(&d)));
    }

    #[test]
    fn test_post_process_is_idempotent() {
        let ctx = member(3, Permissions::read_write());
        let caller = Caller::new(&ctx);
        let mut o = project(2, Permissions::read_write());
        let e = engine();

        e.post_process(&caller, &mut o).unwrap();
        let first = o.details.as_ref().unwrap().permissions().cloned();
        e.post_process(&caller, &mut o).unwrap();
        let second = o.details.as_ref().unwrap().permissions().cloned();

        assert_eq!(first, second);
        let perms = first.unwrap();
        assert!(perms.can(Scope::Edit));
        assert!(perms.same_bits(&Permissions::read_write()));
    }

    #[test]
    fn test_chmod_vote() {
        let ctx = member(3, Permissions::read_write());
        let caller = Caller::new(&ctx);
        assert!(engine().allow_chmod(&caller, &project(3, Permissions::read_write()), None));
        assert!(!engine().allow_chmod(&caller, &project(2, Permissions::read_write()), None));
    }
}
