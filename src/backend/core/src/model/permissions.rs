//! Permission bit-vector over {Role × Right} plus the LOCKED flag.
//!
//! Permissions render as six characters, one `[r-]` and one `[wa-]` pair per
//! role in the order OWNER, GROUP, WORLD:
//!
//! | String   | Meaning                                   |
//! |----------|-------------------------------------------|
//! | `rw----` | private                                   |
//! | `rwr---` | group members may read                    |
//! | `rwra--` | group members may read and annotate       |
//! | `rwrw--` | group members may read and write          |
//! | `rwrwr-` | world readable                            |
//!
//! A `w` implies annotate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Result, VigilError};

// ═══════════════════════════════════════════════════════════════════════════════
// Roles, Rights, Flags
// ═══════════════════════════════════════════════════════════════════════════════

/// Scope over which a right is granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Owner,
    Group,
    World,
}

impl Role {
    const fn shift(self) -> u32 {
        match self {
            Self::Owner => 8,
            Self::Group => 4,
            Self::World => 0,
        }
    }

    pub const fn all() -> [Role; 3] {
        [Self::Owner, Self::Group, Self::World]
    }
}

/// A grantable right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Right {
    Read,
    Write,
    Annotate,
}

impl Right {
    const fn mask(self) -> u32 {
        match self {
            Self::Annotate => 1,
            Self::Write => 2,
            Self::Read => 4,
        }
    }
}

/// Flags stored alongside the rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flag {
    /// Object is referenced by a dependent graph and may not change.
    Locked,
}

impl Flag {
    const fn bit(self) -> u32 {
        match self {
            Self::Locked => 1 << 18,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Scopes
// ═══════════════════════════════════════════════════════════════════════════════

/// A scope a caller may request on an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Annotate,
    Delete,
    Edit,
    Link,
}

impl Scope {
    pub const fn all() -> [Scope; 4] {
        [Self::Annotate, Self::Delete, Self::Edit, Self::Link]
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Annotate => "annotate",
            Self::Delete => "delete",
            Self::Edit => "edit",
            Self::Link => "link",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a caller may do with an object, one flag per scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scopes {
    pub can_link: bool,
    pub can_edit: bool,
    pub can_delete: bool,
    pub can_annotate: bool,
}

impl Scopes {
    pub const NONE: Scopes = Scopes {
        can_link: false,
        can_edit: false,
        can_delete: false,
        can_annotate: false,
    };

    pub const ALL: Scopes = Scopes {
        can_link: true,
        can_edit: true,
        can_delete: true,
        can_annotate: true,
    };

    pub fn get(&self, scope: Scope) -> bool {
        match scope {
            Scope::Annotate => self.can_annotate,
            Scope::Delete => self.can_delete,
            Scope::Edit => self.can_edit,
            Scope::Link => self.can_link,
        }
    }

    pub fn set(&mut self, scope: Scope, value: bool) {
        match scope {
            Scope::Annotate => self.can_annotate = value,
            Scope::Delete => self.can_delete = value,
            Scope::Edit => self.can_edit = value,
            Scope::Link => self.can_link = value,
        }
    }

    /// Keep only the scopes also present in `other`.
    pub fn intersect(self, other: Scopes) -> Scopes {
        Scopes {
            can_link: self.can_link && other.can_link,
            can_edit: self.can_edit && other.can_edit,
            can_delete: self.can_delete && other.can_delete,
            can_annotate: self.can_annotate && other.can_annotate,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Permissions
// ═══════════════════════════════════════════════════════════════════════════════

/// Permission bits plus the caller-relative view attached after load.
///
/// `allowed` and `extended` are written by the post-load hook and describe
/// what the current caller may do. Votes only ever read the bits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    bits: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    allowed: Option<Scopes>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    extended: BTreeSet<String>,
}

impl Permissions {
    /// No rights, no flags.
    pub const fn empty() -> Self {
        Self {
            bits: 0,
            allowed: None,
            extended: BTreeSet::new(),
        }
    }

    pub fn private() -> Self {
        Self::empty()
            .grant(Role::Owner, Right::Read)
            .grant(Role::Owner, Right::Write)
    }

    pub fn read_only() -> Self {
        Self::private().grant(Role::Group, Right::Read)
    }

    pub fn read_annotate() -> Self {
        Self::read_only().grant(Role::Group, Right::Annotate)
    }

    pub fn read_write() -> Self {
        Self::read_only().grant(Role::Group, Right::Write)
    }

    pub fn public() -> Self {
        Self::read_write().grant(Role::World, Right::Read)
    }

    /// Parse the six-character form, e.g. `rwra--`.
    pub fn parse(s: &str) -> Result<Self> {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() != 6 {
            return Err(VigilError::api_usage(format!(
                "Permissions string must have 6 characters: {}",
                s
            )));
        }

        let mut perms = Self::empty();
        for (i, role) in Role::all().into_iter().enumerate() {
            match chars[i * 2] {
                'r' => perms = perms.grant(role, Right::Read),
                '-' => {}
                other => {
                    return Err(VigilError::api_usage(format!(
                        "Unexpected read character '{}' in {}",
                        other, s
                    )))
                }
            }
            match chars[i * 2 + 1] {
                'w' => perms = perms.grant(role, Right::Write),
                'a' => perms = perms.grant(role, Right::Annotate),
                '-' => {}
                other => {
                    return Err(VigilError::api_usage(format!(
                        "Unexpected write character '{}' in {}",
                        other, s
                    )))
                }
            }
        }
        Ok(perms)
    }

    /// Construct from the raw bit pattern.
    pub fn from_bits(bits: u32) -> Self {
        Self {
            bits,
            ..Self::empty()
        }
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rights
    // ─────────────────────────────────────────────────────────────────────────

    pub fn is_granted(&self, role: Role, right: Right) -> bool {
        let bit = right.mask() << role.shift();
        self.bits & bit == bit
    }

    /// Grant a right. Granting WRITE also grants ANNOTATE.
    pub fn grant(mut self, role: Role, right: Right) -> Self {
        self.bits |= right.mask() << role.shift();
        if right == Right::Write {
            self.bits |= Right::Annotate.mask() << role.shift();
        }
        self
    }

    pub fn revoke(mut self, role: Role, right: Right) -> Self {
        self.bits &= !(right.mask() << role.shift());
        self
    }

    /// Compare only rights and flags, ignoring the caller-relative view.
    pub fn same_bits(&self, other: &Permissions) -> bool {
        self.bits == other.bits
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Flags
    // ─────────────────────────────────────────────────────────────────────────

    pub fn is_set(&self, flag: Flag) -> bool {
        self.bits & flag.bit() != 0
    }

    /// Set a flag. Setting is always allowed.
    pub fn set(mut self, flag: Flag) -> Self {
        self.bits |= flag.bit();
        self
    }

    pub fn is_locked(&self) -> bool {
        self.is_set(Flag::Locked)
    }

    /// Clearing is crate-private: only the zero-reference unlock path may do it.
    pub(crate) fn unset(mut self, flag: Flag) -> Self {
        self.bits &= !flag.bit();
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Caller-relative view
    // ─────────────────────────────────────────────────────────────────────────

    /// Attach the derived scopes and policy restrictions.
    pub fn with_allowed(mut self, allowed: Scopes, extended: BTreeSet<String>) -> Self {
        self.allowed = Some(allowed);
        self.extended = extended;
        self
    }

    /// Scopes the current caller may use, once post-processed.
    pub fn allowed(&self) -> Option<Scopes> {
        self.allowed
    }

    pub fn can(&self, scope: Scope) -> bool {
        self.allowed.map(|s| s.get(scope)).unwrap_or(false)
    }

    pub fn extended_restrictions(&self) -> &BTreeSet<String> {
        &self.extended
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for role in Role::all() {
            let r = if self.is_granted(role, Right::Read) { 'r' } else { '-' };
            let w = if self.is_granted(role, Right::Write) {
                'w'
            } else if self.is_granted(role, Right::Annotate) {
                'a'
            } else {
                '-'
            };
            write!(f, "{}{}", r, w)?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
