//! Per-call security wrapper.
//!
//! Every inbound call passes through [`RequestInterceptor::invoke`]:
//!
//! 1. establish a context (or reinstall a stateful target's cached one)
//! 2. enable the read filter and run the call
//! 3. on success, persist the audit logs and settle the unit of work
//! 4. always disable the read filter and drop the context

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info_span};
use uuid::Uuid;

use crate::config::InterceptorConfig;
use crate::error::{Result, VigilError};
use crate::security::context::EventContext;
use crate::security::orchestrator::SecurityOrchestrator;
use crate::security::stack::ContextStack;
use crate::services::PersistenceConnection;
use crate::telemetry::metrics::{AuditLogCounter, CallTimer};

// ═══════════════════════════════════════════════════════════════════════════════
// Call metadata
// ═══════════════════════════════════════════════════════════════════════════════

/// What the interceptor knows about the method being called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallMetadata {
    pub service: String,
    pub method: String,
    /// `None` when the method carries no annotation.
    pub read_only: Option<bool>,
}

impl CallMetadata {
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            read_only: None,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = Some(true);
        self
    }

    pub fn mutating(mut self) -> Self {
        self.read_only = Some(false);
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Stateful sessions
// ═══════════════════════════════════════════════════════════════════════════════

/// Handle owned by a long-lived call target.
///
/// The first call through it establishes a context; later calls reinstall a
/// copy of that context instead of resolving the principal again. Two calls
/// on the same handle must not run concurrently.
#[derive(Debug)]
pub struct StatefulSession {
    id: Uuid,
    context: Mutex<Option<EventContext>>,
}

impl StatefulSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            context: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn has_context(&self) -> bool {
        self.context.lock().is_some()
    }

    /// Fresh copy of the cached context.
    pub fn cached(&self) -> Option<EventContext> {
        self.context.lock().as_ref().map(EventContext::snapshot)
    }

    fn store(&self, context: EventContext) {
        *self.context.lock() = Some(context);
    }

    /// Forget the cached context; the next call establishes a new one.
    pub fn reset(&self) {
        self.context.lock().take();
    }
}

impl Default for StatefulSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Which kind of target a call goes to.
#[derive(Debug, Clone, Copy)]
pub enum CallTarget<'a> {
    Stateless,
    Stateful(&'a StatefulSession),
}

impl CallTarget<'_> {
    pub fn is_stateful(&self) -> bool {
        matches!(self, Self::Stateful(_))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Interceptor
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct RequestInterceptor {
    orchestrator: Arc<SecurityOrchestrator>,
    config: InterceptorConfig,
}

impl RequestInterceptor {
    pub fn new(orchestrator: Arc<SecurityOrchestrator>, config: InterceptorConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    pub fn orchestrator(&self) -> &Arc<SecurityOrchestrator> {
        &self.orchestrator
    }

    /// Run `body` under a security context for the logged-in principal.
    ///
    /// Errors from `body` skip log persistence and flushing, but the read
    /// filter is still disabled and the context dropped before they
    /// propagate.
    pub fn invoke<C, T, F>(
        &self,
        stack: &mut ContextStack,
        conn: &mut C,
        call: &CallMetadata,
        target: CallTarget<'_>,
        body: F,
    ) -> Result<T>
    where
        C: PersistenceConnection + ?Sized,
        F: FnOnce(&mut ContextStack, &mut C) -> Result<T>,
    {
        let read_only = call.read_only.unwrap_or(self.config.default_read_only);
        let span = info_span!("secured_call", service = %call.service, method = %call.method, read_only);
        let _entered = span.enter();
        let timer = CallTimer::start(&call.service, &call.method);

        if let Err(e) = self.login(stack, read_only, target) {
            self.orchestrator.invalidate(stack);
            timer.finish("denied");
            return Err(e);
        }

        if let Err(e) = self.orchestrator.enable_read_filter(stack, conn) {
            self.orchestrator.invalidate(stack);
            timer.finish("error");
            return Err(e);
        }

        let outcome = body(stack, conn).and_then(|value| {
            self.save_logs(stack, read_only)?;
            self.settle(stack, conn, read_only, target.is_stateful())?;
            Ok(value)
        });

        if conn.active_filter().is_some() {
            self.orchestrator.disable_read_filter(conn);
        }
        self.orchestrator.invalidate(stack);

        match &outcome {
            Ok(_) => timer.finish("ok"),
            Err(e) => {
                debug!(code = ?e.code(), "Call failed");
                timer.finish("error");
            }
        }
        outcome
    }

    fn login(&self, stack: &mut ContextStack, read_only: bool, target: CallTarget<'_>) -> Result<()> {
        match target {
            CallTarget::Stateless => self.orchestrator.establish(stack, read_only).map(|_| ()),
            CallTarget::Stateful(session) => match session.cached() {
                // A read-only context carries no saved event to log against.
                Some(context) if read_only || !context.is_read_only() => {
                    self.orchestrator.set_event_context(stack, context)
                }
                _ => {
                    let ctx = self.orchestrator.establish(stack, read_only)?;
                    session.store(ctx.snapshot());
                    Ok(())
                }
            },
        }
    }

    /// Bulk-insert the pending audit logs.
    fn save_logs(&self, stack: &ContextStack, read_only: bool) -> Result<()> {
        let logs = self.orchestrator.clear_logs(stack)?;
        if logs.is_empty() {
            return Ok(());
        }

        if read_only && self.config.fail_on_read_only_logs {
            error!(count = logs.len(), "Read-only call produced audit logs");
            return Err(VigilError::internal(format!(
                "Read-only call produced {} audit log(s)",
                logs.len()
            )));
        }
        if let Some(log) = logs.iter().find(|l| l.event_id.is_none()) {
            return Err(VigilError::internal(format!(
                "Audit log for {}:{} has no saved event",
                log.entity_type, log.entity_id
            )));
        }

        self.orchestrator.updates().bulk_insert_logs(&logs)?;
        AuditLogCounter::flushed(logs.len());
        debug!(count = logs.len(), "Audit logs saved");
        Ok(())
    }

    /// Leave the unit of work clean for the next call on this connection.
    ///
    /// Stateful targets keep their unit of work open across calls, but lock
    /// candidates live on the per-call context and are applied before it is
    /// dropped.
    fn settle<C>(&self, stack: &ContextStack, conn: &mut C, read_only: bool, stateful: bool) -> Result<()>
    where
        C: PersistenceConnection + ?Sized,
    {
        if read_only {
            if !stateful && conn.is_dirty() {
                debug!("Clearing dirty unit of work after read-only call");
                conn.clear();
            }
            return Ok(());
        }

        self.orchestrator.apply_lock_candidates(stack, conn)?;
        if stateful {
            return Ok(());
        }

        conn.flush()?;
        if conn.is_dirty() {
            return Err(VigilError::internal("Unit of work still dirty after flush"));
        }
        conn.clear();
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
