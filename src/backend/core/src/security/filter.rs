//! Row-level read filter.
//!
//! The persistence layer installs a [`ReadFilter`] at the start of each call
//! and evaluates it against every loaded row. A row passes when any of:
//!
//! - the caller is an administrator
//! - the caller leads the row's group
//! - the caller owns the row and OWNER READ is granted
//! - the caller is a member of the row's group and GROUP READ is granted
//! - WORLD READ is granted

use serde::{Deserialize, Serialize};

use crate::model::{Details, Permissions, Right, Role};
use crate::security::context::{EventContext, NO_GROUPS};

/// Name the persistence layer registers the filter under.
pub const FILTER_NAME: &str = "securityFilter";

/// Filter parameters, frozen from the context at enable time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadFilter {
    pub is_admin: bool,
    pub current_user: i64,
    pub current_groups: Vec<i64>,
    pub leader_of_groups: Vec<i64>,
}

impl ReadFilter {
    pub fn from_context(ctx: &EventContext) -> Self {
        Self {
            is_admin: ctx.is_admin(),
            current_user: ctx.user_id(),
            current_groups: ctx.member_of_groups().to_vec(),
            leader_of_groups: ctx.leader_of_groups().to_vec(),
        }
    }

    /// Row predicate. Rows without a group are judged on owner and world bits.
    pub fn passes(&self, details: &Details) -> bool {
        if self.is_admin {
            return true;
        }

        let empty = Permissions::empty();
        let perms = details
            .permissions()
            .or_else(|| details.group.as_ref().and_then(|g| g.permissions.as_ref()))
            .unwrap_or(&empty);

        if let Some(group_id) = details.group_id() {
            if contains(&self.leader_of_groups, group_id) {
                return true;
            }
            if contains(&self.current_groups, group_id) && perms.is_granted(Role::Group, Right::Read) {
                return true;
            }
        }

        if details.owner_id() == Some(self.current_user) && perms.is_granted(Role::Owner, Right::Read) {
            return true;
        }

        perms.is_granted(Role::World, Right::Read)
    }
}

fn contains(groups: &[i64], group_id: i64) -> bool {
    group_id != NO_GROUPS && groups.contains(&group_id)
}
