//! Per-thread login stack.
//!
//! Each call thread owns one [`ContextStack`] and passes it by `&mut` to
//! the orchestrator. The stack is deliberately not `Sync`, so a context
//! established on one thread can never be observed from another.

use std::cell::Cell;
use std::marker::PhantomData;

use crate::error::{Result, VigilError};
use crate::security::context::EventContext;
use crate::security::principal::Principal;

#[derive(Debug)]
struct Frame {
    principal: Principal,
    context: Option<EventContext>,
}

/// LIFO of logged-in principals, each with at most one established context.
#[derive(Debug, Default)]
pub struct ContextStack {
    frames: Vec<Frame>,
    _not_sync: PhantomData<Cell<()>>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a principal. Returns the new depth.
    pub fn login(&mut self, principal: Principal) -> Result<usize> {
        if principal.name.trim().is_empty() {
            return Err(VigilError::api_usage("Principal name must not be empty"));
        }
        if principal.group.trim().is_empty() {
            return Err(VigilError::api_usage("Principal group must not be empty"));
        }
        self.frames.push(Frame {
            principal,
            context: None,
        });
        Ok(self.frames.len())
    }

    /// Pop the top principal. Returns the remaining depth; 0 when already empty.
    pub fn logout(&mut self) -> usize {
        self.frames.pop();
        self.frames.len()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.frames.last().map(|f| &f.principal)
    }

    pub fn current(&self) -> Option<&EventContext> {
        self.frames.last().and_then(|f| f.context.as_ref())
    }

    pub fn current_mut(&mut self) -> Option<&mut EventContext> {
        self.frames.last_mut().and_then(|f| f.context.as_mut())
    }

    /// Top frame has an established context.
    pub fn is_ready(&self) -> bool {
        self.current().is_some()
    }

    pub(crate) fn install(&mut self, context: EventContext) -> Result<&EventContext> {
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| VigilError::api_usage("No principal logged in"))?;
        Ok(&*frame.context.insert(context))
    }

    /// Drop the top frame's context. The principal stays logged in.
    pub(crate) fn clear(&mut self) -> Option<EventContext> {
        self.frames.last_mut().and_then(|f| f.context.take())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
