//! Ownership and permission rules applied when objects are saved.
//!
//! New objects get their [`Details`] filled from the current context. Saved
//! objects may only change owner, group or permissions when the caller is
//! entitled to, and a LOCKED object never changes group or permissions.

use crate::error::{Result, VigilError};
use crate::model::{Details, Flag, IObject, Permissions};
use crate::security::roles::AdminPrivilege;
use crate::security::voter::{AccessDecisionEngine, Caller};

/// Details for a transient object about to be inserted.
pub fn new_transient_details(
    engine: &AccessDecisionEngine,
    caller: &Caller<'_>,
    object: &IObject,
) -> Result<Details> {
    let ctx = caller.context();
    let requested = object.details.as_ref();

    let owner = match requested.and_then(|d| d.owner.clone()) {
        Some(owner) if owner.id != ctx.user_id() => {
            if !caller.is_privileged(AdminPrivilege::Chown, object) {
                return Err(VigilError::security_violation(format!(
                    "User {} cannot create {} owned by user {}",
                    ctx.user_id(),
                    object,
                    owner.id
                )));
            }
            owner
        }
        _ => ctx.owner().clone(),
    };

    let group = match requested.and_then(|d| d.group.clone()) {
        Some(group) if group.id != ctx.group_id() => {
            let allowed = if ctx.is_all_groups() {
                ctx.is_member_of(group.id) || caller.is_privileged(AdminPrivilege::Chgrp, object)
            } else {
                caller.is_privileged(AdminPrivilege::Chgrp, object)
            };
            if !allowed {
                return Err(VigilError::security_violation(format!(
                    "User {} cannot create {} in group {}",
                    ctx.user_id(),
                    object,
                    group.id
                )));
            }
            group
        }
        _ if ctx.is_all_groups() => {
            return Err(VigilError::api_usage(format!(
                "No active group: {} must name its group",
                object
            )));
        }
        _ => ctx.group().clone(),
    };

    let mut permissions = if group.id == ctx.group_id() {
        Permissions::from_bits(ctx.group_permissions().bits())
    } else {
        let mut group_only = Details::default();
        group_only.group = Some(group.clone());
        engine.effective_group_permissions(ctx, &group_only)?
    };
    if requested.map(|d| d.is_locked()).unwrap_or(false) {
        permissions = permissions.set(Flag::Locked);
    }

    let mut details = Details::new(owner, group, permissions);
    details.creation_event = ctx.event_id();
    details.update_event = ctx.event_id();
    Ok(details)
}

/// Merge the caller's requested details for a saved object into the trusted
/// (database) details, refusing changes the caller may not make.
pub fn check_managed_details(
    engine: &AccessDecisionEngine,
    caller: &Caller<'_>,
    object: &IObject,
    trusted: &Details,
) -> Result<Details> {
    let ctx = caller.context();
    let mut merged = trusted.clone();
    merged.update_event = ctx.event_id();

    let Some(requested) = object.details.as_ref() else {
        return Ok(merged);
    };

    if let Some(owner) = &requested.owner {
        if Some(owner.id) != trusted.owner_id() {
            if !caller.is_privileged(AdminPrivilege::Chown, object) {
                return Err(VigilError::security_violation(format!(
                    "User {} cannot change the owner of {}",
                    ctx.user_id(),
                    object
                )));
            }
            merged.owner = Some(owner.clone());
        }
    }

    if let Some(group) = &requested.group {
        if Some(group.id) != trusted.group_id() {
            if trusted.is_locked() {
                return Err(VigilError::locked(format!(
                    "Cannot move locked {} to group {}",
                    object, group.id
                )));
            }
            if !caller.is_privileged(AdminPrivilege::Chgrp, object) {
                return Err(VigilError::security_violation(format!(
                    "User {} cannot change the group of {}",
                    ctx.user_id(),
                    object
                )));
            }
            merged.group = Some(group.clone());
        }
    }

    if let Some(perms) = requested.permissions() {
        let changed = trusted
            .permissions()
            .map(|current| !current.same_bits(perms))
            .unwrap_or(true);
        if changed {
            let lock_only = trusted
                .permissions()
                .map(|current| {
                    !current.is_locked()
                        && perms.is_locked()
                        && current.clone().set(Flag::Locked).same_bits(perms)
                })
                .unwrap_or(false);
            if !lock_only && !trusted.is_locked() && !engine.allow_chmod(caller, object, Some(trusted)) {
                return Err(VigilError::security_violation(format!(
                    "User {} cannot change the permissions of {}",
                    ctx.user_id(),
                    object
                )));
            }
            merged.set_permissions(Permissions::from_bits(perms.bits()))?;
        }
    }

    Ok(merged)
}
