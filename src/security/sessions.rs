//! Session directory (SIR): per-connection identity and login state
//!
//! Each certificate-authenticated connection is tracked by its derived
//! identity. The entry caches the resolved identity once a login succeeds
//! and carries any in-flight login challenge, including the failed-attempt
//! counter that eventually tears the session down.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use super::acl::AclStore;
use super::credentials::CredentialStore;
use super::identity::{base64_decode, base64_encode};
use super::roles::Role;
use crate::Result;

/// In-flight login challenge state for one session
#[derive(Debug, Clone)]
pub struct PendingLogin {
    /// Failed attempts so far
    pub attempts: u32,

    /// Username the peer wishes to log in as (uppercase)
    pub username: String,

    /// Challenge issued to the peer, base64-encoded
    pub challenge: String,
}

/// One session directory entry
#[derive(Debug, Clone)]
pub struct SessionEntry {
    /// Derived identity of the transport-layer connection
    pub session_id: String,

    /// Identity established by a successful login, if any
    pub identity: Option<String>,

    /// Role assumed while the identity has no ACL entry
    pub role: Role,

    /// Pending login state, cleared on success or logout
    pub login: Option<PendingLogin>,
}

/// Outcome of a login verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginResult {
    /// Authenticator matched; the session is now bound to the username
    Success {
        /// Username the session resolved to
        username: String,
    },

    /// No pending challenge, or the provided challenge does not match
    InvalidContext,

    /// Authenticator mismatch; the attempt was counted
    Mismatch,

    /// Attempt limit exceeded; the entry has been removed
    LockedOut,
}

/// Directory of session → identity relationships
#[derive(Debug, Default)]
pub struct SessionDirectory {
    entries: HashMap<String, SessionEntry>,
}

impl SessionDirectory {
    /// Create an empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the entry for a session, creating it on first sight
    ///
    /// A new entry carries no identity and assumes the `Public` role.
    pub fn resolve(&mut self, session_id: &str) -> &mut SessionEntry {
        self.entries
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                session_id: session_id.to_string(),
                identity: None,
                role: Role::Public,
                login: None,
            })
    }

    /// Look up an entry without creating it
    #[must_use]
    pub fn entry(&self, session_id: &str) -> Option<&SessionEntry> {
        self.entries.get(session_id)
    }

    /// Check whether the session holds `role`
    ///
    /// A session with a resolved identity is judged by that identity's ACL
    /// roles; an identity absent from the ACL is judged by the entry's
    /// assumed role (`Public` unless the dispatcher raised it).
    pub fn authorize(&mut self, session_id: &str, role: Role, acl: &AclStore) -> bool {
        let entry = self.resolve(session_id);
        let assumed = entry.role;

        let identity = entry.identity.clone().unwrap_or_else(|| entry.session_id.clone());
        let roles = acl.roles_of(&identity);
        if roles.is_empty() {
            return role <= assumed;
        }
        roles.contains(role)
    }

    /// Record a freshly issued login challenge for a session
    ///
    /// Overwrites any prior pending challenge. The failed-attempt counter
    /// survives reissue so a guessing peer cannot reset it.
    pub fn begin_login(&mut self, session_id: &str, username: &str, challenge: &str) {
        let attempts = self
            .entries
            .get(session_id)
            .and_then(|entry| entry.login.as_ref())
            .map_or(0, |login| login.attempts);

        self.resolve(session_id);
        if let Some(entry) = self.entries.get_mut(session_id) {
            entry.login = Some(PendingLogin {
                attempts,
                username: username.to_string(),
                challenge: challenge.to_string(),
            });
        }
    }

    /// True if the session has already burned more than `max` attempts
    #[must_use]
    pub fn attempts_exhausted(&self, session_id: &str, max: u32) -> bool {
        self.entries
            .get(session_id)
            .and_then(|entry| entry.login.as_ref())
            .is_some_and(|login| login.attempts > max)
    }

    /// Verify a login attempt against the pending challenge
    ///
    /// The provided challenge must match the stored one byte for byte; a
    /// mismatch is a context error and does not consume an attempt. On a
    /// challenge match the expected authenticator is recomputed from the
    /// pending username's verifier and compared in constant time. An
    /// authenticator mismatch consumes an attempt, and crossing `max`
    /// removes the entry entirely.
    pub fn check_login(
        &mut self,
        session_id: &str,
        challenge: &str,
        authenticator: &str,
        credentials: &CredentialStore,
        max: u32,
    ) -> LoginResult {
        let Some(entry) = self.entries.get_mut(session_id) else {
            return LoginResult::InvalidContext;
        };
        let Some(login) = entry.login.as_mut() else {
            return LoginResult::InvalidContext;
        };

        if login.challenge != challenge {
            tracing::debug!(session = %session_id, "challenge does not match pending value");
            return LoginResult::InvalidContext;
        }

        let expected = credentials
            .find(&login.username)
            .map(|record| compute_authenticator(&record.verifier, &login.challenge));

        let Some(Ok(expected)) = expected else {
            return LoginResult::InvalidContext;
        };

        if !constant_time_eq(expected.as_bytes(), authenticator.as_bytes()) {
            login.attempts += 1;
            tracing::info!(
                session = %session_id,
                attempts = login.attempts,
                "authenticator mismatch"
            );

            if login.attempts > max {
                self.entries.remove(session_id);
                return LoginResult::LockedOut;
            }
            return LoginResult::Mismatch;
        }

        let username = login.username.clone();
        entry.identity = Some(username.clone());
        entry.login = None;
        tracing::info!(session = %session_id, username = %username, "login succeeded");

        LoginResult::Success { username }
    }

    /// Drop any pending login state for a session
    pub fn clear_login(&mut self, session_id: &str) {
        if let Some(entry) = self.entries.get_mut(session_id) {
            entry.login = None;
        }
    }

    /// Remove a session entry entirely (transport session closed)
    pub fn remove(&mut self, session_id: &str) {
        self.entries.remove(session_id);
    }
}

/// Compute a login challenge: `SHA-256(verifier ‖ nonce)`
#[must_use]
pub fn compute_challenge(verifier: &[u8], nonce: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(verifier);
    hasher.update(nonce);
    hasher.finalize().to_vec()
}

/// Compute the expected authenticator for a verifier and base64 challenge
///
/// `base64(SHA-256(verifier ‖ challenge)[..20])`, with the challenge in
/// binary form.
///
/// # Errors
///
/// Returns error if the challenge is not valid base64
pub fn compute_authenticator(verifier: &[u8], challenge_b64: &str) -> Result<String> {
    let challenge = base64_decode(challenge_b64)?;

    let mut hasher = Sha256::new();
    hasher.update(verifier);
    hasher.update(&challenge);
    let hash = hasher.finalize();

    Ok(base64_encode(&hash[..20]))
}

/// Constant-time byte comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
