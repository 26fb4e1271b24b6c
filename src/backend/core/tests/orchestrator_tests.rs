//! Integration tests for the security orchestrator: login state, elevated
//! actions, details policy and locking.

mod common;

use common::{fixture, login, ALICE, BOB, LAB, OTHER};
use vigil_core::error::ErrorCode;
use vigil_core::model::{Details, GroupRef, IObject, ObjectKind, Permissions, UserRef};
use vigil_core::security::{ContextStack, Principal, ALL_GROUPS, MERGE_EVENT};
use vigil_core::services::memory::InMemoryConnection;
use vigil_core::services::PersistenceConnection;

fn group_ref(group: i64) -> GroupRef {
    match group {
        LAB => GroupRef::loaded(LAB, "lab", Permissions::read_annotate()),
        OTHER => GroupRef::loaded(OTHER, "other", Permissions::read_write()),
        _ => GroupRef::unloaded(group),
    }
}

fn image_of(owner: i64, group: i64, perms: Permissions) -> IObject {
    IObject::with_id(ObjectKind::Image, 7).with_details(Details::new(
        UserRef::unloaded(owner),
        group_ref(group),
        perms,
    ))
}

// ============================================================================
// Login state
// ============================================================================

#[test]
fn test_login_logout_round_trip() {
    let f = fixture();
    let mut stack = ContextStack::new();
    let o = &f.orchestrator;

    assert_eq!(o.login(&mut stack, Principal::new("alice", "lab", "User")).unwrap(), 1);
    o.establish(&mut stack, false).unwrap();
    assert!(o.is_ready(&stack));

    assert_eq!(o.logout(&mut stack), 0);
    assert!(!o.is_ready(&stack));
    assert_eq!(o.current(&stack).unwrap_err().code(), ErrorCode::ApiUsage);
}

#[test]
fn test_nested_login_restores_outer_identity() {
    let f = fixture();
    let o = &f.orchestrator;
    let mut stack = login(&f, "alice", "lab");
    o.establish(&mut stack, true).unwrap();

    o.login(&mut stack, Principal::new("root", "system", "Internal")).unwrap();
    let root = o.establish(&mut stack, false).unwrap();
    assert!(root.is_admin());
    assert_eq!(root.event_type(), "Internal");

    assert_eq!(o.logout(&mut stack), 1);
    let ctx = o.current(&stack).unwrap();
    assert_eq!(ctx.user_id(), ALICE);
    assert!(!ctx.is_admin());
}

#[test]
fn test_empty_principal_is_api_usage() {
    let f = fixture();
    let mut stack = ContextStack::new();
    let err = f
        .orchestrator
        .login(&mut stack, Principal::new("alice", "", "User"))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ApiUsage);
}

#[test]
fn test_unknown_principal_is_authentication_failure() {
    let f = fixture();
    let mut stack = login(&f, "mallory", "lab");
    let err = f.orchestrator.establish(&mut stack, true).unwrap_err();
    assert_eq!(err.code(), ErrorCode::AuthenticationFailure);
}

#[test]
fn test_principal_event_type_falls_back_to_session_default() {
    let f = fixture();
    let mut stack = ContextStack::new();
    f.orchestrator
        .login(&mut stack, Principal::new("alice", "lab", ""))
        .unwrap();
    let ctx = f.orchestrator.establish(&mut stack, false).unwrap();
    assert_eq!(ctx.event_type(), "User");
    assert_eq!(f.updates.events()[0].event_type, "User");
}

#[test]
fn test_mutating_context_loads_references() {
    let f = fixture();
    let mut stack = login(&f, "alice", "lab");
    let ctx = f.orchestrator.establish(&mut stack, false).unwrap();
    assert!(ctx.owner().loaded);
    assert_eq!(ctx.owner().name.as_deref(), Some("alice"));
    assert_eq!(ctx.group().permissions, Some(Permissions::read_annotate()));
}

// ============================================================================
// Elevated actions
// ============================================================================

#[test]
fn test_run_as_admin_elevates_and_restores() {
    let f = fixture();
    let o = &f.orchestrator;
    let mut stack = login(&f, "alice", "lab");
    o.establish(&mut stack, false).unwrap();
    let mut conn = InMemoryConnection::new();
    o.enable_read_filter(&stack, &mut conn).unwrap();

    let foreign = image_of(BOB, OTHER, Permissions::private());
    let updated = o
        .run_as_admin(&mut stack, &mut conn, |stack, conn| {
            assert!(conn.active_filter().unwrap().is_admin);
            assert!(o.is_disabled(stack, MERGE_EVENT)?);
            let caller = o.caller(stack)?;
            o.engine().allow_update(&caller, &foreign, None)
        })
        .unwrap();
    assert!(updated);

    let ctx = o.current(&stack).unwrap();
    assert!(!ctx.is_admin());
    assert!(!ctx.is_disabled(MERGE_EVENT));
    assert!(!conn.active_filter().unwrap().is_admin);
    assert!(!o
        .engine()
        .allow_chmod(&o.caller(&stack).unwrap(), &foreign, None));
}

#[test]
fn test_run_as_admin_keeps_merge_disabled_if_it_was() {
    let f = fixture();
    let o = &f.orchestrator;
    let mut stack = login(&f, "alice", "lab");
    o.establish(&mut stack, true).unwrap();
    o.disable(&stack, &[MERGE_EVENT]).unwrap();
    let mut conn = InMemoryConnection::new();

    o.run_as_admin(&mut stack, &mut conn, |_, _| Ok(())).unwrap();
    assert!(o.is_disabled(&stack, MERGE_EVENT).unwrap());
}

#[test]
fn test_do_action_grants_once() {
    let f = fixture();
    let o = &f.orchestrator;
    let mut stack = login(&f, "alice", "lab");
    o.establish(&mut stack, false).unwrap();

    let foreign = image_of(BOB, OTHER, Permissions::private());
    let (first, second) = o
        .do_action(&stack, &[&foreign], |caller| {
            let first = o.engine().allow_delete(&caller, &foreign, None)?;
            // The grant was consumed; the bits give alice nothing here.
            let second = o.engine().allow_delete(&caller, &foreign, None)?;
            Ok((first, second))
        })
        .unwrap();
    assert!(first);
    assert!(!second);
}

// ============================================================================
// Details policy
// ============================================================================

#[test]
fn test_transient_details_filled_from_context() {
    let f = fixture();
    let o = &f.orchestrator;
    let mut stack = login(&f, "alice", "lab");
    o.establish(&mut stack, false).unwrap();

    let details = o
        .new_transient_details(&stack, &IObject::new(ObjectKind::Dataset))
        .unwrap();
    assert_eq!(details.owner_id(), Some(ALICE));
    assert_eq!(details.group_id(), Some(LAB));
    assert_eq!(details.creation_event, Some(1));
    assert!(details
        .permissions()
        .unwrap()
        .same_bits(&Permissions::read_annotate()));
}

#[test]
fn test_transient_details_foreign_owner_needs_chown() {
    let f = fixture();
    let o = &f.orchestrator;
    let mut stack = login(&f, "alice", "lab");
    o.establish(&mut stack, false).unwrap();

    let requested = IObject::new(ObjectKind::Dataset).with_details(Details::new(
        UserRef::unloaded(BOB),
        group_ref(LAB),
        Permissions::private(),
    ));
    let err = o.new_transient_details(&stack, &requested).unwrap_err();
    assert_eq!(err.code(), ErrorCode::SecurityViolation);

    let mut root = login(&f, "root", "system");
    o.establish(&mut root, false).unwrap();
    let details = o.new_transient_details(&root, &requested).unwrap();
    assert_eq!(details.owner_id(), Some(BOB));
}

#[test]
fn test_all_groups_context_requires_group_on_new_objects() {
    let f = fixture();
    f.sessions.add_group(ALL_GROUPS, "-1", Permissions::empty());
    let o = &f.orchestrator;
    let mut stack = login(&f, "alice", "-1");
    let ctx = o.establish(&mut stack, true).unwrap();
    assert!(ctx.is_all_groups());

    let err = o
        .new_transient_details(&stack, &IObject::new(ObjectKind::Dataset))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ApiUsage);
}

#[test]
fn test_managed_details_locked_group_change_rejected() {
    let f = fixture();
    let o = &f.orchestrator;
    let mut stack = login(&f, "root", "system");
    o.establish(&mut stack, false).unwrap();

    let mut trusted = Details::new(UserRef::unloaded(ALICE), GroupRef::unloaded(LAB), Permissions::read_only());
    trusted.lock();

    let moved = IObject::with_id(ObjectKind::Project, 1).with_details(Details::new(
        UserRef::unloaded(ALICE),
        GroupRef::unloaded(OTHER),
        Permissions::read_only(),
    ));
    let err = o.check_managed_details(&stack, &moved, &trusted).unwrap_err();
    assert_eq!(err.code(), ErrorCode::LockViolation);
}

#[test]
fn test_managed_details_chmod_by_non_owner_rejected() {
    let f = fixture();
    let o = &f.orchestrator;
    let mut stack = login(&f, "alice", "lab");
    o.establish(&mut stack, false).unwrap();

    let trusted = Details::new(UserRef::unloaded(BOB), GroupRef::unloaded(LAB), Permissions::read_only());
    let widened = IObject::with_id(ObjectKind::Project, 1).with_details(Details::new(
        UserRef::unloaded(BOB),
        GroupRef::unloaded(LAB),
        Permissions::read_write(),
    ));
    let err = o.check_managed_details(&stack, &widened, &trusted).unwrap_err();
    assert_eq!(err.code(), ErrorCode::SecurityViolation);

    let mut bob = login(&f, "bob", "lab");
    o.establish(&mut bob, false).unwrap();
    let merged = o.check_managed_details(&bob, &widened, &trusted).unwrap();
    assert!(merged.permissions().unwrap().same_bits(&Permissions::read_write()));
}

// ============================================================================
// Locking
// ============================================================================

#[test]
fn test_linked_objects_locked_on_flush_then_unlocked() {
    let f = fixture();
    let o = &f.orchestrator;
    let mut stack = login(&f, "alice", "lab");
    o.establish(&mut stack, false).unwrap();

    let mut parent = image_of(ALICE, LAB, Permissions::read_annotate());
    let child = image_of(ALICE, LAB, Permissions::read_annotate());
    o.register_link(&stack, &parent, &child).unwrap();

    let mut conn = InMemoryConnection::new();
    assert_eq!(o.apply_lock_candidates(&stack, &mut conn).unwrap(), 2);
    assert!(conn.is_locked(&parent));
    assert!(conn.is_dirty());

    parent.details.as_mut().unwrap().lock();
    conn.set_external_references(&parent, 1);
    let err = o.unlock(&stack, &mut conn, &mut parent).unwrap_err();
    assert_eq!(err.code(), ErrorCode::LockViolation);

    conn.set_external_references(&parent, 0);
    o.unlock(&stack, &mut conn, &mut parent).unwrap();
    assert!(!parent.details.as_ref().unwrap().is_locked());
    assert!(!conn.is_locked(&parent));
    assert!(conn.is_locked(&child));

    // The persisted row is unlocked too, so a later save goes through.
    let trusted = parent.details.clone().unwrap();
    o.check_managed_details(&stack, &parent, &trusted).unwrap();
}

#[test]
fn test_unlock_by_stranger_rejected() {
    let f = fixture();
    let o = &f.orchestrator;
    let mut stack = login(&f, "alice", "lab");
    o.establish(&mut stack, false).unwrap();

    let mut foreign = image_of(BOB, OTHER, Permissions::private());
    foreign.details.as_mut().unwrap().lock();
    let mut conn = InMemoryConnection::new();
    conn.lock(&foreign).unwrap();

    let err = o.unlock(&stack, &mut conn, &mut foreign).unwrap_err();
    assert_eq!(err.code(), ErrorCode::SecurityViolation);
    assert!(foreign.details.as_ref().unwrap().is_locked());
    assert!(conn.is_locked(&foreign));
}
