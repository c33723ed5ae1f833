//! Role and data-classification hierarchies.
//!
//! Both hierarchies are fixed lookup tables. A level always grants access to
//! itself and to every level strictly below it:
//! - Roles: Admin ⊇ Manager ⊇ User ⊇ Guest
//! - Classifications: Restricted ⊇ Confidential ⊇ Internal ⊇ Public

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned by the strict level parsers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LevelParseError {
    #[error("unknown role level: {0:?}")]
    UnknownRole(String),

    #[error("unknown data classification: {0:?}")]
    UnknownClassification(String),
}

// ============================================================================
// Role Level
// ============================================================================

/// Caller privilege level.
///
/// Ordered from least to most privileged: Guest < User < Manager < Admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleLevel {
    /// Unauthenticated or anonymous access. Sees public material only.
    Guest,
    /// Standard employee.
    User,
    /// Line manager; may work outside business hours in most profiles.
    Manager,
    /// Administrator; eligible for admin bypass when it is enabled.
    Admin,
}

impl RoleLevel {
    /// Every role, least privileged first.
    pub const ALL: [RoleLevel; 4] = [
        RoleLevel::Guest,
        RoleLevel::User,
        RoleLevel::Manager,
        RoleLevel::Admin,
    ];

    /// Returns the roles this role may act as.
    ///
    /// # Examples
    ///
    /// ```
    /// use warden_types::RoleLevel;
    ///
    /// assert_eq!(
    ///     RoleLevel::User.accessible_levels(),
    ///     &[RoleLevel::User, RoleLevel::Guest]
    /// );
    /// ```
    pub fn accessible_levels(self) -> &'static [RoleLevel] {
        match self {
            RoleLevel::Admin => &[
                RoleLevel::Admin,
                RoleLevel::Manager,
                RoleLevel::User,
                RoleLevel::Guest,
            ],
            RoleLevel::Manager => &[RoleLevel::Manager, RoleLevel::User, RoleLevel::Guest],
            RoleLevel::User => &[RoleLevel::User, RoleLevel::Guest],
            RoleLevel::Guest => &[RoleLevel::Guest],
        }
    }

    /// Returns the accessible roles as a set.
    pub fn allowed_set(self) -> BTreeSet<RoleLevel> {
        self.accessible_levels().iter().copied().collect()
    }

    /// Returns whether this role satisfies a record's required role.
    pub fn satisfies(self, required: RoleLevel) -> bool {
        self.accessible_levels().contains(&required)
    }

    /// Parses a role name, falling back to `Guest` for unknown names.
    pub fn parse_or_guest(name: &str) -> Self {
        name.parse().unwrap_or(RoleLevel::Guest)
    }

    /// Returns the lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            RoleLevel::Guest => "guest",
            RoleLevel::User => "user",
            RoleLevel::Manager => "manager",
            RoleLevel::Admin => "admin",
        }
    }
}

impl FromStr for RoleLevel {
    type Err = LevelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "guest" => Ok(RoleLevel::Guest),
            "user" => Ok(RoleLevel::User),
            "manager" => Ok(RoleLevel::Manager),
            "admin" => Ok(RoleLevel::Admin),
            _ => Err(LevelParseError::UnknownRole(s.to_string())),
        }
    }
}

impl fmt::Display for RoleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Data Classification
// ============================================================================

/// Data sensitivity level of a record, and clearance level of a caller.
///
/// Ordered from least to most sensitive: Public < Internal < Confidential < Restricted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Freely shareable.
    Public,
    /// Internal to the organization.
    Internal,
    /// Limited to named groups or projects.
    Confidential,
    /// Highest sensitivity; need-to-know only.
    Restricted,
}

impl Classification {
    /// Every classification, least sensitive first.
    pub const ALL: [Classification; 4] = [
        Classification::Public,
        Classification::Internal,
        Classification::Confidential,
        Classification::Restricted,
    ];

    /// Returns the classifications readable with this clearance.
    pub fn accessible_levels(self) -> &'static [Classification] {
        match self {
            Classification::Restricted => &[
                Classification::Restricted,
                Classification::Confidential,
                Classification::Internal,
                Classification::Public,
            ],
            Classification::Confidential => &[
                Classification::Confidential,
                Classification::Internal,
                Classification::Public,
            ],
            Classification::Internal => &[Classification::Internal, Classification::Public],
            Classification::Public => &[Classification::Public],
        }
    }

    /// Returns the readable classifications as a set.
    pub fn allowed_set(self) -> BTreeSet<Classification> {
        self.accessible_levels().iter().copied().collect()
    }

    /// Returns whether this clearance may read data of the given class.
    pub fn permits(self, data: Classification) -> bool {
        self.accessible_levels().contains(&data)
    }

    /// Parses a classification name, falling back to `Public` for unknown names.
    pub fn parse_or_public(name: &str) -> Self {
        name.parse().unwrap_or(Classification::Public)
    }

    /// Returns the lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Public => "public",
            Classification::Internal => "internal",
            Classification::Confidential => "confidential",
            Classification::Restricted => "restricted",
        }
    }
}

impl FromStr for Classification {
    type Err = LevelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Classification::Public),
            "internal" => Ok(Classification::Internal),
            "confidential" => Ok(Classification::Confidential),
            "restricted" => Ok(Classification::Restricted),
            _ => Err(LevelParseError::UnknownClassification(s.to_string())),
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
