//! Shared fixture for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use vigil_core::config::InterceptorConfig;
use vigil_core::model::Permissions;
use vigil_core::security::{
    ContextStack, Principal, RequestInterceptor, SecurityOrchestrator, SecurityRoles,
};
use vigil_core::services::memory::{
    InMemoryLookup, InMemorySessionResolver, RecordingUpdateService, StaticPolicyService,
};
use vigil_core::services::ResolvedSession;

pub const ALICE: i64 = 3;
pub const BOB: i64 = 4;
pub const LAB: i64 = 5;
pub const OTHER: i64 = 6;

pub struct Fixture {
    pub orchestrator: Arc<SecurityOrchestrator>,
    pub interceptor: RequestInterceptor,
    pub sessions: Arc<InMemorySessionResolver>,
    pub updates: Arc<RecordingUpdateService>,
}

fn session(id: i64, user_id: i64, name: &str, member_of: Vec<i64>, leader_of: Vec<i64>) -> ResolvedSession {
    ResolvedSession {
        session_id: id,
        session_uuid: format!("uuid-{}", name),
        user_id,
        user_name: name.to_string(),
        group_id: 0,
        group_name: String::new(),
        group_permissions: Permissions::empty(),
        member_of_groups: member_of,
        leader_of_groups: leader_of,
        default_event_type: "User".to_string(),
        admin_privileges: None,
    }
}

pub fn fixture() -> Fixture {
    fixture_with(InterceptorConfig::default())
}

pub fn fixture_with(config: InterceptorConfig) -> Fixture {
    let sessions = Arc::new(InMemorySessionResolver::new());
    sessions.add_group(0, "system", Permissions::private());
    sessions.add_group(1, "user", Permissions::private());
    sessions.add_group(LAB, "lab", Permissions::read_annotate());
    sessions.add_group(OTHER, "other", Permissions::read_write());
    sessions.add_session(session(11, ALICE, "alice", vec![LAB, 1], vec![]));
    sessions.add_session(session(12, BOB, "bob", vec![LAB, OTHER, 1], vec![LAB]));
    sessions.add_session(session(13, 0, "root", vec![0, 1], vec![0]));

    let lookup = Arc::new(InMemoryLookup::new());
    lookup.add_user(ALICE, "alice");
    lookup.add_user(BOB, "bob");
    lookup.add_group(LAB, "lab", Permissions::read_annotate());
    lookup.add_group(OTHER, "other", Permissions::read_write());

    let updates = Arc::new(RecordingUpdateService::new());
    let orchestrator = Arc::new(SecurityOrchestrator::new(
        SecurityRoles::default(),
        sessions.clone(),
        lookup,
        updates.clone(),
        Arc::new(StaticPolicyService::default()),
    ));
    let interceptor = RequestInterceptor::new(orchestrator.clone(), config);

    Fixture {
        orchestrator,
        interceptor,
        sessions,
        updates,
    }
}

pub fn login(f: &Fixture, name: &str, group: &str) -> ContextStack {
    let mut stack = ContextStack::new();
    f.orchestrator
        .login(&mut stack, Principal::new(name, group, "User"))
        .expect("login");
    stack
}
