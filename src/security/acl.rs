//! Access Control List: persisted identity → role-set mapping
//!
//! Identities are either case-normalized usernames or certificate-hash
//! strings (see [`super::identity`]). Every successful mutation is flushed
//! to the backing document before the call returns; the document is
//! rewritten through a temp file and an atomic rename so a crash can never
//! leave a partial file behind.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::is_certificate_hash;
use super::roles::{Role, RoleSet};
use crate::{Error, Result};

/// One ACL entry: an identity and the roles granted to it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclEntry {
    /// Username (uppercase) or certificate hash
    pub identity: String,

    /// Optional human-readable alias (e.g. certificate CN)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub alias: Option<String>,

    /// Granted roles
    pub roles: RoleSet,

    /// Whether the identity completed a pairwise introduction
    pub introduced: bool,

    /// When the entry was created
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AclDocument {
    entries: Vec<AclEntry>,
}

/// File-backed authorization store
#[derive(Debug)]
pub struct AclStore {
    path: PathBuf,
    entries: BTreeMap<String, AclEntry>,
}

impl AclStore {
    /// Open the store, loading the document from `path` if present
    ///
    /// A brand-new store is seeded with an `ADMIN` entry holding the full
    /// role set, so the bootstrap administrator has privileges to grant
    /// roles after the first login.
    ///
    /// # Errors
    ///
    /// Returns error if the document exists but cannot be read or parsed
    pub fn open(path: &Path) -> Result<Self> {
        let mut store = Self {
            path: path.to_path_buf(),
            entries: BTreeMap::new(),
        };

        if path.exists() {
            store.reload()?;
        } else {
            store.entries.insert(
                "ADMIN".to_string(),
                AclEntry {
                    identity: "ADMIN".to_string(),
                    alias: None,
                    roles: [Role::Public, Role::Basic, Role::Admin]
                        .into_iter()
                        .collect(),
                    introduced: false,
                    created_at: Utc::now(),
                },
            );
            store.save()?;
            tracing::info!(path = %path.display(), "created ACL document with ADMIN entry");
        }

        Ok(store)
    }

    /// Re-read the document from disk
    ///
    /// # Errors
    ///
    /// Returns error on IO failure or an invalid document
    pub fn reload(&mut self) -> Result<()> {
        let content = fs::read_to_string(&self.path)?;
        let document: AclDocument = serde_json::from_str(&content)?;

        self.entries.clear();
        for entry in document.entries {
            self.entries.insert(entry.identity.clone(), entry);
        }

        tracing::debug!(count = self.entries.len(), "loaded ACL entries");
        Ok(())
    }

    /// Roles granted to an identity
    ///
    /// An absent identity yields an empty set; callers treat that as
    /// "Public only".
    #[must_use]
    pub fn roles_of(&self, identity: &str) -> RoleSet {
        self.resolve(identity)
            .and_then(|key| self.entries.get(&key))
            .map(|entry| entry.roles.clone())
            .unwrap_or_default()
    }

    /// Look up an entry by identity
    #[must_use]
    pub fn entry(&self, identity: &str) -> Option<&AclEntry> {
        let key = self.resolve(identity)?;
        self.entries.get(&key)
    }

    /// Grant roles to an existing identity and flush
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownRoleRecipient`] if the identity has no
    /// entry, or an IO error on flush failure
    pub fn add_roles(&mut self, identity: &str, roles: &RoleSet) -> Result<()> {
        let key = self
            .resolve(identity)
            .filter(|key| self.entries.contains_key(key))
            .ok_or_else(|| Error::UnknownRoleRecipient(identity.to_string()))?;

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.roles.extend(roles);
        }
        self.save()?;

        tracing::info!(identity = %key, roles = %roles, "granted roles");
        Ok(())
    }

    /// Revoke roles from an existing identity and flush
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownRoleRecipient`] if the identity has no
    /// entry, or an IO error on flush failure
    pub fn remove_roles(&mut self, identity: &str, roles: &RoleSet) -> Result<()> {
        let key = self
            .resolve(identity)
            .filter(|key| self.entries.contains_key(key))
            .ok_or_else(|| Error::UnknownRoleRecipient(identity.to_string()))?;

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.roles.remove_all(roles);
        }
        self.save()?;

        tracing::info!(identity = %key, roles = %roles, "revoked roles");
        Ok(())
    }

    /// Enroll an introduced control point and flush
    ///
    /// Idempotent: enrolling the same certificate hash again updates the
    /// existing entry in place instead of duplicating it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownIdentity`] if `hash` is not a well-formed
    /// certificate hash, or an IO error on flush failure
    pub fn add_cp(
        &mut self,
        hash: &str,
        alias: Option<&str>,
        roles: &RoleSet,
        introduced: bool,
    ) -> Result<()> {
        if !is_certificate_hash(hash) {
            return Err(Error::UnknownIdentity(hash.to_string()));
        }

        if let Some(entry) = self.entries.get_mut(hash) {
            entry.roles.extend(roles);
            entry.introduced = entry.introduced || introduced;
            if alias.is_some() {
                entry.alias = alias.map(ToString::to_string);
            }
        } else {
            self.entries.insert(
                hash.to_string(),
                AclEntry {
                    identity: hash.to_string(),
                    alias: alias.map(ToString::to_string),
                    roles: roles.clone(),
                    introduced,
                    created_at: Utc::now(),
                },
            );
        }

        self.save()?;
        tracing::info!(identity = %hash, roles = %roles, "enrolled control point");
        Ok(())
    }

    /// Add an explicit username entry and flush
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgs`] if the name collides with the
    /// certificate-hash format, or an IO error on flush failure
    pub fn add_user(&mut self, name: &str, roles: &RoleSet) -> Result<()> {
        let upper = super::identity::normalize_username(name)?;

        let entry = self.entries.entry(upper.clone()).or_insert_with(|| AclEntry {
            identity: upper,
            alias: None,
            roles: RoleSet::new(),
            introduced: false,
            created_at: Utc::now(),
        });
        entry.roles.extend(roles);

        self.save()
    }

    /// Serialize the whole ACL document
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_document(&self) -> Result<String> {
        let document = AclDocument {
            entries: self.entries.values().cloned().collect(),
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    /// Resolve an identity string to its stored key form
    fn resolve(&self, identity: &str) -> Option<String> {
        if is_certificate_hash(identity) {
            Some(identity.to_string())
        } else {
            super::identity::normalize_username(identity).ok()
        }
    }

    /// Rewrite the document through a temp file and atomic rename
    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp = self.path.with_extension("temp");
        fs::write(&temp, self.to_document()?)?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::identity::derive_identity;

    fn setup() -> (tempfile::TempDir, AclStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = AclStore::open(&dir.path().join("acl.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_new_store_seeds_admin() {
        let (_dir, store) = setup();
        let roles = store.roles_of("admin");
        assert!(roles.contains(Role::Admin));
        assert!(roles.contains(Role::Public));
    }

    #[test]
    fn test_absent_identity_has_no_roles() {
        let (_dir, store) = setup();
        assert!(store.roles_of("nobody").is_empty());
        assert!(store.roles_of(&derive_identity(b"unseen cert")).is_empty());
    }

    #[test]
    fn test_add_and_remove_roles() {
        let (_dir, mut store) = setup();
        store.add_user("alice", &RoleSet::from(Role::Public)).unwrap();

        store
            .add_roles("Alice", &RoleSet::parse("Basic").unwrap())
            .unwrap();
        assert_eq!(store.roles_of("ALICE").to_string(), "Public Basic");

        store
            .remove_roles("alice", &RoleSet::parse("Basic").unwrap())
            .unwrap();
        assert_eq!(store.roles_of("alice").to_string(), "Public");
    }

    #[test]
    fn test_unknown_recipient_rejected() {
        let (_dir, mut store) = setup();
        let roles = RoleSet::from(Role::Basic);
        assert!(matches!(
            store.add_roles("ghost", &roles),
            Err(Error::UnknownRoleRecipient(_))
        ));
        assert!(matches!(
            store.remove_roles(&derive_identity(b"ghost cert"), &roles),
            Err(Error::UnknownRoleRecipient(_))
        ));
    }

    #[test]
    fn test_add_cp_idempotent() {
        let (_dir, mut store) = setup();
        let hash = derive_identity(b"peer certificate");
        let roles = RoleSet::parse("Public Basic").unwrap();

        store.add_cp(&hash, Some("peer-one"), &roles, true).unwrap();
        store.add_cp(&hash, None, &roles, true).unwrap();

        let document = store.to_document().unwrap();
        assert_eq!(document.matches(&hash).count(), 1);

        let entry = store.entry(&hash).unwrap();
        assert!(entry.introduced);
        assert_eq!(entry.alias.as_deref(), Some("peer-one"));
    }

    #[test]
    fn test_add_cp_rejects_non_hash() {
        let (_dir, mut store) = setup();
        let roles = RoleSet::from(Role::Basic);
        assert!(matches!(
            store.add_cp("ALICE", None, &roles, true),
            Err(Error::UnknownIdentity(_))
        ));
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acl.json");
        let hash = derive_identity(b"persisted peer");

        {
            let mut store = AclStore::open(&path).unwrap();
            store
                .add_cp(&hash, Some("lab device"), &RoleSet::parse("Public Basic").unwrap(), true)
                .unwrap();
        }

        let store = AclStore::open(&path).unwrap();
        assert_eq!(store.roles_of(&hash).to_string(), "Public Basic");
        assert!(store.entry(&hash).unwrap().introduced);
    }
}
