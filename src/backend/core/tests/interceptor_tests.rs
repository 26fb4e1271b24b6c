//! Integration tests for the per-call request interceptor.

mod common;

use common::{fixture, fixture_with, login, ALICE, LAB};
use vigil_core::config::InterceptorConfig;
use vigil_core::error::{ErrorCode, VigilError};
use vigil_core::model::{IObject, ObjectKind};
use vigil_core::security::{CallMetadata, CallTarget, StatefulSession};
use vigil_core::services::memory::InMemoryConnection;
use vigil_core::services::PersistenceConnection;

fn save() -> CallMetadata {
    CallMetadata::new("IUpdate", "saveObject").mutating()
}

fn find() -> CallMetadata {
    CallMetadata::new("IQuery", "find").read_only()
}

// ============================================================================
// Stateless calls
// ============================================================================

#[test]
fn test_mutating_call_saves_logs_and_flushes() {
    let f = fixture();
    let mut stack = login(&f, "alice", "lab");
    let mut conn = InMemoryConnection::new();
    let orchestrator = f.orchestrator.clone();

    let project = IObject::with_id(ObjectKind::Project, 1);
    let dataset = IObject::with_id(ObjectKind::Dataset, 2);

    let user_id = f
        .interceptor
        .invoke(&mut stack, &mut conn, &save(), CallTarget::Stateless, |stack, conn| {
            let ctx = orchestrator.current(stack)?;
            assert!(!ctx.is_read_only());
            assert_eq!(conn.active_filter().map(|flt| flt.current_user), Some(ALICE));

            conn.attach(&project);
            orchestrator.add_log(stack, "INSERT", ObjectKind::Project, 1)?;
            orchestrator.register_link(stack, &project, &dataset)?;
            Ok(ctx.user_id())
        })
        .unwrap();
    assert_eq!(user_id, ALICE);

    assert_eq!(f.updates.events().len(), 1);
    let logs = f.updates.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].event_id, Some(1));

    assert!(conn.is_locked(&project));
    assert!(conn.is_locked(&dataset));
    assert_eq!(conn.flushes(), 1);
    assert_eq!(conn.clears(), 1);
    assert!(!conn.is_dirty());

    assert_eq!((conn.filter_enables(), conn.filter_disables()), (1, 1));
    assert!(conn.active_filter().is_none());
    assert!(!stack.is_ready());
    assert_eq!(stack.depth(), 1);
}

#[test]
fn test_unannotated_call_defaults_to_read_only() {
    let f = fixture();
    let mut stack = login(&f, "alice", "lab");
    let mut conn = InMemoryConnection::new();
    let orchestrator = f.orchestrator.clone();

    let call = CallMetadata::new("IQuery", "projection");
    f.interceptor
        .invoke(&mut stack, &mut conn, &call, CallTarget::Stateless, |stack, _| {
            assert!(orchestrator.current(stack)?.is_read_only());
            Ok(())
        })
        .unwrap();

    assert!(f.updates.events().is_empty());
    assert_eq!(conn.flushes(), 0);
}

#[test]
fn test_read_only_call_with_logs_fails() {
    let f = fixture();
    let mut stack = login(&f, "alice", "lab");
    let mut conn = InMemoryConnection::new();
    let orchestrator = f.orchestrator.clone();

    let err = f
        .interceptor
        .invoke(&mut stack, &mut conn, &find(), CallTarget::Stateless, |stack, _| {
            orchestrator.add_log(stack, "UPDATE", ObjectKind::Image, 9)
        })
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::InternalError);
    assert!(f.updates.logs().is_empty());
    assert!(!stack.is_ready());
    assert_eq!(conn.filter_disables(), 1);
}

#[test]
fn test_read_only_logs_tolerated_when_configured() {
    let f = fixture_with(InterceptorConfig {
        fail_on_read_only_logs: false,
        ..InterceptorConfig::default()
    });
    let mut stack = login(&f, "alice", "lab");
    let mut conn = InMemoryConnection::new();
    let orchestrator = f.orchestrator.clone();

    // Read-only contexts carry no saved event, so the log still cannot be stored.
    let err = f
        .interceptor
        .invoke(&mut stack, &mut conn, &find(), CallTarget::Stateless, |stack, _| {
            orchestrator.add_log(stack, "UPDATE", ObjectKind::Image, 9)
        })
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InternalError);
    assert!(err.to_string().contains("no saved event"));
}

#[test]
fn test_read_only_call_clears_dirty_unit_of_work() {
    let f = fixture();
    let mut stack = login(&f, "alice", "lab");
    let mut conn = InMemoryConnection::new();

    f.interceptor
        .invoke(&mut stack, &mut conn, &find(), CallTarget::Stateless, |_, conn| {
            conn.mark_dirty();
            Ok(())
        })
        .unwrap();

    assert!(!conn.is_dirty());
    assert_eq!(conn.clears(), 1);
    assert_eq!(conn.flushes(), 0);
}

#[test]
fn test_bulk_insert_failure_propagates() {
    let f = fixture();
    f.updates.fail_log_inserts(true);
    let mut stack = login(&f, "alice", "lab");
    let mut conn = InMemoryConnection::new();
    let orchestrator = f.orchestrator.clone();

    let err = f
        .interceptor
        .invoke(&mut stack, &mut conn, &save(), CallTarget::Stateless, |stack, _| {
            orchestrator.add_log(stack, "INSERT", ObjectKind::Project, 1)
        })
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::PersistenceFailed);
    assert_eq!(conn.flushes(), 0);
    assert!(!stack.is_ready());
    assert!(conn.active_filter().is_none());
}

#[test]
fn test_dirty_after_flush_is_internal_error() {
    let f = fixture();
    let mut stack = login(&f, "alice", "lab");
    let mut conn = InMemoryConnection::new();
    conn.stay_dirty_after_flush(true);

    let err = f
        .interceptor
        .invoke(&mut stack, &mut conn, &save(), CallTarget::Stateless, |_, conn| {
            conn.mark_dirty();
            Ok(())
        })
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::InternalError);
    assert_eq!(conn.flushes(), 1);
    assert!(!stack.is_ready());
}

#[test]
fn test_body_error_skips_flush_but_tears_down() {
    let f = fixture();
    let mut stack = login(&f, "alice", "lab");
    let mut conn = InMemoryConnection::new();
    let orchestrator = f.orchestrator.clone();

    let err = f
        .interceptor
        .invoke(&mut stack, &mut conn, &save(), CallTarget::Stateless, |stack, conn| {
            conn.mark_dirty();
            orchestrator.add_log(stack, "INSERT", ObjectKind::Project, 1)?;
            Err::<(), _>(VigilError::security_violation("Update of Project:1 denied"))
        })
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::SecurityViolation);
    assert!(f.updates.logs().is_empty());
    assert_eq!(conn.flushes(), 0);
    assert_eq!((conn.filter_enables(), conn.filter_disables()), (1, 1));
    assert!(!stack.is_ready());
}

#[test]
fn test_login_failure_never_enables_filter() {
    let f = fixture();
    let mut stack = login(&f, "alice", "other");
    let mut conn = InMemoryConnection::new();

    let mut ran = false;
    let err = f
        .interceptor
        .invoke(&mut stack, &mut conn, &find(), CallTarget::Stateless, |_, _| {
            ran = true;
            Ok(())
        })
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::AuthenticationFailure);
    assert!(!ran);
    assert_eq!(conn.filter_enables(), 0);
    assert!(!stack.is_ready());
}

// ============================================================================
// Stateful targets
// ============================================================================

#[test]
fn test_stateful_target_reuses_context() {
    let f = fixture();
    let mut stack = login(&f, "alice", "lab");
    let mut conn = InMemoryConnection::new();
    let session = StatefulSession::new();
    let orchestrator = f.orchestrator.clone();

    for _ in 0..3 {
        f.interceptor
            .invoke(&mut stack, &mut conn, &save(), CallTarget::Stateful(&session), |stack, _| {
                orchestrator.add_log(stack, "UPDATE", ObjectKind::Dataset, 2)
            })
            .unwrap();
    }

    assert!(session.has_context());
    assert_eq!(f.updates.events().len(), 1);
    let logs = f.updates.logs();
    assert_eq!(logs.len(), 3);
    assert!(logs.iter().all(|l| l.event_id == Some(1)));
    // Stateful targets keep their unit of work open across calls.
    assert_eq!(conn.flushes(), 0);
    assert!(!stack.is_ready());
}

#[test]
fn test_stateful_mutating_call_locks_linked_objects() {
    let f = fixture();
    let mut stack = login(&f, "alice", "lab");
    let mut conn = InMemoryConnection::new();
    let session = StatefulSession::new();
    let orchestrator = f.orchestrator.clone();

    let project = IObject::with_id(ObjectKind::Project, 1);
    let dataset = IObject::with_id(ObjectKind::Dataset, 2);

    f.interceptor
        .invoke(&mut stack, &mut conn, &save(), CallTarget::Stateful(&session), |stack, _| {
            orchestrator.register_link(stack, &project, &dataset)
        })
        .unwrap();

    assert!(conn.is_locked(&project));
    assert!(conn.is_locked(&dataset));
    assert_eq!(conn.flushes(), 0);

    // The next call on the session starts with no queued candidates.
    f.interceptor
        .invoke(&mut stack, &mut conn, &save(), CallTarget::Stateful(&session), |stack, _| {
            assert!(orchestrator.current(stack)?.lock_candidates().is_empty());
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_stateful_read_only_context_replaced_by_mutating_call() {
    let f = fixture();
    let mut stack = login(&f, "alice", "lab");
    let mut conn = InMemoryConnection::new();
    let session = StatefulSession::new();

    f.interceptor
        .invoke(&mut stack, &mut conn, &find(), CallTarget::Stateful(&session), |_, _| Ok(()))
        .unwrap();
    assert!(session.cached().unwrap().is_read_only());
    assert!(f.updates.events().is_empty());

    f.interceptor
        .invoke(&mut stack, &mut conn, &save(), CallTarget::Stateful(&session), |_, _| Ok(()))
        .unwrap();
    assert!(!session.cached().unwrap().is_read_only());
    assert_eq!(f.updates.events().len(), 1);
}

#[test]
fn test_stateful_context_not_adopted_by_other_principal() {
    let f = fixture();
    let mut conn = InMemoryConnection::new();
    let session = StatefulSession::new();

    let mut alice = login(&f, "alice", "lab");
    f.interceptor
        .invoke(&mut alice, &mut conn, &save(), CallTarget::Stateful(&session), |_, _| Ok(()))
        .unwrap();

    let mut bob = login(&f, "bob", "lab");
    let err = f
        .interceptor
        .invoke(&mut bob, &mut conn, &save(), CallTarget::Stateful(&session), |_, _| Ok(()))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InternalError);
    assert!(!bob.is_ready());

    let cached = session.cached().unwrap();
    assert_eq!(cached.user_id(), ALICE);
    assert_eq!(cached.group_id(), LAB);
}
