//! Unforgeable capability granting a one-shot bypass of the mutation votes.
//!
//! Tokens are only minted by [`SecurityOrchestrator::do_action`] and are
//! scoped to the handles of the objects passed to it. `covers` observes a
//! grant without consuming it; `redeem` consumes it. A token is dead once
//! the action returns.
//!
//! [`SecurityOrchestrator::do_action`]: crate::security::SecurityOrchestrator::do_action

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::model::ObjectHandle;

#[derive(Debug)]
pub struct PrivilegedToken {
    id: Uuid,
    handles: Mutex<HashSet<ObjectHandle>>,
    valid: AtomicBool,
}

impl PrivilegedToken {
    pub(crate) fn issue(handles: impl IntoIterator<Item = ObjectHandle>) -> Self {
        Self {
            id: Uuid::new_v4(),
            handles: Mutex::new(handles.into_iter().collect()),
            valid: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Grant still open for this handle.
    pub fn covers(&self, handle: ObjectHandle) -> bool {
        self.is_valid() && self.handles.lock().contains(&handle)
    }

    /// Consume the grant for this handle. True at most once per handle.
    pub fn redeem(&self, handle: ObjectHandle) -> bool {
        self.is_valid() && self.handles.lock().remove(&handle)
    }

    pub(crate) fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
        self.handles.lock().clear();
    }
}

impl Drop for PrivilegedToken {
    fn drop(&mut self) {
        self.invalidate();
    }
}
