//! Role vocabulary and ordered role sets
//!
//! Roles are named capability strings. "Public" is the implicit default
//! for any identity with no explicit ACL entry. Role lists cross the wire
//! as space-separated names, e.g. `"Public Basic"`.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A recognized capability role
///
/// Ordering matches the rendered list order: `Public Basic Admin`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Role {
    /// Unauthenticated baseline access
    Public,

    /// Standard access for introduced peers
    Basic,

    /// Full administrative control
    Admin,
}

impl Role {
    /// Parse a single role name
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRoleList`] if the name is not in the
    /// recognized vocabulary.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "Public" => Ok(Self::Public),
            "Basic" => Ok(Self::Basic),
            "Admin" => Ok(Self::Admin),
            other => Err(Error::InvalidRoleList(other.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => write!(f, "Public"),
            Self::Basic => write!(f, "Basic"),
            Self::Admin => write!(f, "Admin"),
        }
    }
}

/// An ordered set of roles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    /// Create an empty role set
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Parse a space-separated role list
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRoleList`] if the list is empty or contains
    /// an unrecognized name.
    pub fn parse(list: &str) -> Result<Self> {
        let mut roles = BTreeSet::new();
        for name in list.split_whitespace() {
            roles.insert(Role::parse(name)?);
        }
        if roles.is_empty() {
            return Err(Error::InvalidRoleList("empty role list".to_string()));
        }
        Ok(Self(roles))
    }

    /// Check membership
    #[must_use]
    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    /// True if no roles are present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Add a role
    pub fn insert(&mut self, role: Role) {
        self.0.insert(role);
    }

    /// Union with another set
    pub fn extend(&mut self, other: &Self) {
        self.0.extend(other.0.iter().copied());
    }

    /// Remove every role present in `other`
    pub fn remove_all(&mut self, other: &Self) {
        for role in &other.0 {
            self.0.remove(role);
        }
    }

    /// Iterate roles in order
    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for role in &self.0 {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{role}")?;
            first = false;
        }
        Ok(())
    }
}

impl From<Role> for RoleSet {
    fn from(role: Role) -> Self {
        let mut set = Self::new();
        set.insert(role);
        set
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!(Role::parse("Public").unwrap(), Role::Public);
        assert_eq!(Role::parse("Basic").unwrap(), Role::Basic);
        assert_eq!(Role::parse("Admin").unwrap(), Role::Admin);
        assert!(Role::parse("Root").is_err());
        assert!(Role::parse("public").is_err()); // names are case-sensitive
    }

    #[test]
    fn test_role_set_parse_and_render() {
        let set = RoleSet::parse("Basic Public").unwrap();
        assert!(set.contains(Role::Public));
        assert!(set.contains(Role::Basic));
        assert!(!set.contains(Role::Admin));
        // Rendering is ordered regardless of input order
        assert_eq!(set.to_string(), "Public Basic");
    }

    #[test]
    fn test_role_set_rejects_bad_lists() {
        assert!(RoleSet::parse("").is_err());
        assert!(RoleSet::parse("   ").is_err());
        assert!(RoleSet::parse("Public Wizard").is_err());
    }

    #[test]
    fn test_role_set_mutation() {
        let mut set = RoleSet::from(Role::Public);
        set.extend(&RoleSet::parse("Basic Admin").unwrap());
        assert_eq!(set.to_string(), "Public Basic Admin");

        set.remove_all(&RoleSet::parse("Admin").unwrap());
        assert_eq!(set.to_string(), "Public Basic");
    }
}
