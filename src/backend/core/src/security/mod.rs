//! Row-level, group-based authorization.
//!
//! This module provides:
//! - **Context**: the per-call identity snapshot and the per-thread login stack
//! - **Votes**: the access decision engine and its privileged tokens
//! - **Orchestrator**: the facade that establishes contexts and runs elevated actions
//! - **Interceptor**: the per-call wrapper that ties login, logging and flushing together
//!
//! # Usage
//!
//! ```rust,ignore
//! use vigil_core::security::{CallMetadata, CallTarget, ContextStack, Principal};
//!
//! let mut stack = ContextStack::new();
//! orchestrator.login(&mut stack, Principal::new("alice", "lab", "User"))?;
//!
//! let call = CallMetadata::new("IUpdate", "saveObject").mutating();
//! interceptor.invoke(&mut stack, &mut conn, &call, CallTarget::Stateless, |stack, _conn| {
//!     let caller = orchestrator.caller(stack)?;
//!     orchestrator.engine().enforce(&caller, Operation::Update, &image, None)
//! })?;
//! ```

pub mod context;
pub mod details;
pub mod filter;
pub mod interceptor;
pub mod orchestrator;
pub mod principal;
pub mod roles;
pub mod stack;
pub mod token;
pub mod voter;

pub use context::{EventContext, EventContextBuilder, ALL_GROUPS, NO_GROUPS};
pub use filter::{ReadFilter, FILTER_NAME};
pub use interceptor::{CallMetadata, CallTarget, RequestInterceptor, StatefulSession};
pub use orchestrator::{SecurityOrchestrator, MERGE_EVENT};
pub use principal::Principal;
pub use roles::{AdminPrivilege, SecurityRoles};
pub use stack::ContextStack;
pub use token::PrivilegedToken;
pub use voter::{AccessDecisionEngine, Caller, Operation};
