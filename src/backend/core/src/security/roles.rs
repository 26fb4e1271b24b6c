//! Distinguished users and groups, and the named admin privileges.
//!
//! | Role         | Default id | Meaning                                        |
//! |--------------|------------|------------------------------------------------|
//! | root         | 0          | Bootstrap administrator                        |
//! | system group | 0          | Acting in it makes a caller administrator      |
//! | user group   | 1          | "Everyone" group; its objects are always loadable |
//! | guest        | 1          | Anonymous user                                 |
//! | guest group  | 2          | Group of the anonymous user                    |

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::VigilError;

// ═══════════════════════════════════════════════════════════════════════════════
// Roles
// ═══════════════════════════════════════════════════════════════════════════════

/// Ids and names of the distinguished accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRoles {
    #[serde(default = "default_root_id")]
    pub root_id: i64,
    #[serde(default = "default_root_name")]
    pub root_name: String,
    #[serde(default = "default_system_group_id")]
    pub system_group_id: i64,
    #[serde(default = "default_system_group_name")]
    pub system_group_name: String,
    #[serde(default = "default_user_group_id")]
    pub user_group_id: i64,
    #[serde(default = "default_user_group_name")]
    pub user_group_name: String,
    #[serde(default = "default_guest_id")]
    pub guest_id: i64,
    #[serde(default = "default_guest_name")]
    pub guest_name: String,
    #[serde(default = "default_guest_group_id")]
    pub guest_group_id: i64,
    #[serde(default = "default_guest_group_name")]
    pub guest_group_name: String,
}

impl Default for SecurityRoles {
    fn default() -> Self {
        Self {
            root_id: default_root_id(),
            root_name: default_root_name(),
            system_group_id: default_system_group_id(),
            system_group_name: default_system_group_name(),
            user_group_id: default_user_group_id(),
            user_group_name: default_user_group_name(),
            guest_id: default_guest_id(),
            guest_name: default_guest_name(),
            guest_group_id: default_guest_group_id(),
            guest_group_name: default_guest_group_name(),
        }
    }
}

impl SecurityRoles {
    pub fn is_root(&self, user_id: i64) -> bool {
        user_id == self.root_id
    }

    pub fn is_system_group(&self, group_id: i64) -> bool {
        group_id == self.system_group_id
    }

    pub fn is_user_group(&self, group_id: i64) -> bool {
        group_id == self.user_group_id
    }

    /// Objects in these groups pass the load vote without the row filter.
    pub fn is_globally_visible_group(&self, group_id: i64) -> bool {
        self.is_system_group(group_id) || self.is_user_group(group_id)
    }
}

fn default_root_id() -> i64 { 0 }
fn default_root_name() -> String { "root".to_string() }
fn default_system_group_id() -> i64 { 0 }
fn default_system_group_name() -> String { "system".to_string() }
fn default_user_group_id() -> i64 { 1 }
fn default_user_group_name() -> String { "user".to_string() }
fn default_guest_id() -> i64 { 1 }
fn default_guest_name() -> String { "guest".to_string() }
fn default_guest_group_id() -> i64 { 2 }
fn default_guest_group_name() -> String { "guest".to_string() }

// ═══════════════════════════════════════════════════════════════════════════════
// Admin privileges
// ═══════════════════════════════════════════════════════════════════════════════

/// Named capabilities restricting what an administrator may actually do.
///
/// A "light admin" holds a subset of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AdminPrivilege {
    Chgrp,
    Chown,
    DeleteFile,
    DeleteOwned,
    ModifyGroup,
    ModifyGroupMembership,
    ModifyUser,
    ReadSession,
    Sudo,
    WriteFile,
    WriteOwned,
}

impl AdminPrivilege {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Chgrp => "Chgrp",
            Self::Chown => "Chown",
            Self::DeleteFile => "DeleteFile",
            Self::DeleteOwned => "DeleteOwned",
            Self::ModifyGroup => "ModifyGroup",
            Self::ModifyGroupMembership => "ModifyGroupMembership",
            Self::ModifyUser => "ModifyUser",
            Self::ReadSession => "ReadSession",
            Self::Sudo => "Sudo",
            Self::WriteFile => "WriteFile",
            Self::WriteOwned => "WriteOwned",
        }
    }

    pub fn all() -> BTreeSet<AdminPrivilege> {
        [
            Self::Chgrp,
            Self::Chown,
            Self::DeleteFile,
            Self::DeleteOwned,
            Self::ModifyGroup,
            Self::ModifyGroupMembership,
            Self::ModifyUser,
            Self::ReadSession,
            Self::Sudo,
            Self::WriteFile,
            Self::WriteOwned,
        ]
        .into_iter()
        .collect()
    }
}

impl fmt::Display for AdminPrivilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdminPrivilege {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| VigilError::api_usage(format!("Unknown admin privilege: {}", s)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
