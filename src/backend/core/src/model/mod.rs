//! Data model shared by the votes, the context and the collaborators.

pub mod event;
pub mod object;
pub mod permissions;

pub use event::{Event, EventLog};
pub use object::{
    Details, GraphHolder, GroupRef, IObject, ObjectHandle, ObjectKind, UnlockProof, UserRef,
};
pub use permissions::{Flag, Permissions, Right, Role, Scope, Scopes};
