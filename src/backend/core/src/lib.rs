#![allow(clippy::result_large_err)]
//! # Vigil Core
//!
//! Row-level, group-based authorization engine and security context for a
//! multi-tenant scientific-data server.
//!
//! ## Architecture
//!
//! - **Model**: domain object kinds, ownership details and permission bits
//! - **Security**: event contexts, the access decision engine, the security
//!   orchestrator and the per-call request interceptor
//! - **Services**: collaborator traits (sessions, lookups, updates, policies,
//!   unit of work) plus in-memory implementations
//! - **Telemetry**: structured logging with redaction and vote/context metrics
//! - **Config**: layered file and environment configuration

pub mod config;
pub mod error;
pub mod model;
pub mod security;
pub mod services;
pub mod telemetry;

pub use error::{ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result, VigilError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{InterceptorConfig, SecurityConfig};
    pub use crate::error::{ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result, VigilError};
    pub use crate::model::{
        Details, Event, EventLog, Flag, GroupRef, IObject, ObjectHandle, ObjectKind, Permissions,
        Right, Role, Scope, Scopes, UserRef,
    };
    pub use crate::security::{
        AccessDecisionEngine, AdminPrivilege, CallMetadata, CallTarget, Caller, ContextStack,
        EventContext, Operation, Principal, PrivilegedToken, ReadFilter, RequestInterceptor,
        SecurityOrchestrator, SecurityRoles, StatefulSession, ALL_GROUPS,
    };
    pub use crate::services::{
        LookupService, PersistenceConnection, PolicyService, ResolvedSession, SessionResolver,
        UpdateService,
    };
}
