//! DeviceProtection action surface
//!
//! The transport/RPC dispatch layer routes named actions here. Every
//! privileged action first derives the caller's identity from its peer
//! certificate, consults the session directory and ACL, and only then
//! mutates state. The dispatcher is expected to serialize invocations,
//! but each store sits behind its own lock so nothing here depends on
//! that.

use std::sync::{Mutex, MutexGuard, PoisonError};

use rand::RngCore;
use rand::rngs::OsRng;

use crate::config::ProtectionConfig;
use crate::security::acl::AclStore;
use crate::security::credentials::CredentialStore;
use crate::security::identity::{base64_decode, base64_encode, derive_identity};
use crate::security::introduction::{IntroductionController, SetupEngine, SetupStatus};
use crate::security::roles::{Role, RoleSet};
use crate::security::sessions::{LoginResult, SessionDirectory, compute_challenge};
use crate::{Error, Result};

/// Static capability list returned by `GetSupportedProtocols`
pub const SUPPORTED_PROTOCOLS: &str =
    "<SupportedProtocols><Introduction><Name>WPS</Name></Introduction></SupportedProtocols>";

/// The one supported introduction protocol
pub const PROTOCOL_WPS: &str = "WPS";

/// The one supported login algorithm literal
pub const LOGIN_ALGORITHM: &str = "DeviceProtection:1";

/// Nonce length for login challenges, in bytes
const NONCE_BYTES: usize = 16;

/// Handle to the transport session that carried an action
///
/// The transport layer owns connection lifecycle; this subsystem only
/// needs the power to tear a session down when a peer exhausts its login
/// attempts.
pub trait TransportSession: Send + Sync {
    /// Forcibly close the underlying transport session
    fn terminate(&self);
}

/// Per-action caller context supplied by the dispatch layer
pub struct RequestContext<'a> {
    certificate: Option<&'a [u8]>,
    common_name: Option<&'a str>,
    session: &'a dyn TransportSession,
}

impl<'a> RequestContext<'a> {
    /// Create a context for a certificate-authenticated connection
    #[must_use]
    pub const fn new(certificate: Option<&'a [u8]>, session: &'a dyn TransportSession) -> Self {
        Self {
            certificate,
            common_name: None,
            session,
        }
    }

    /// Attach the peer certificate's common name
    ///
    /// Recorded as the ACL alias when the peer is enrolled through a
    /// successful introduction.
    #[must_use]
    pub const fn with_common_name(mut self, common_name: &'a str) -> Self {
        self.common_name = Some(common_name);
        self
    }

    /// Derive the caller's identity from its peer certificate
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCertificate`] for connections without one;
    /// such callers are anonymous and eligible only for `Public`.
    pub fn identity(&self) -> Result<String> {
        self.certificate
            .map(derive_identity)
            .ok_or(Error::NoCertificate)
    }
}

/// Outcome of a `UserLogin` action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Authentication succeeded; the session is bound to the username
    LoggedIn,

    /// Attempt limit exceeded; the transport session has been terminated
    /// and the caller's directory entry removed
    LockedOut,
}

/// Factory producing a fresh handshake engine per introduction
pub type EngineFactory = Box<dyn Fn() -> Box<dyn SetupEngine> + Send + Sync>;

/// The DeviceProtection service
///
/// Owns the credential store, ACL, session directory, and the single
/// introduction slot. All state is injectable: tests build isolated
/// instances from temp-dir configs and mock engines.
pub struct DeviceProtection {
    config: ProtectionConfig,
    credentials: Mutex<CredentialStore>,
    acl: Mutex<AclStore>,
    sessions: Mutex<SessionDirectory>,
    introduction: Mutex<IntroductionController>,
    engine_factory: EngineFactory,
}

impl DeviceProtection {
    /// Open the service, loading persisted stores per the configuration
    ///
    /// # Errors
    ///
    /// Returns error if either backing store fails to load
    pub fn new(config: ProtectionConfig, engine_factory: EngineFactory) -> Result<Self> {
        let credentials = CredentialStore::open(&config.passwd_file, &config.admin_password)?;
        let acl = AclStore::open(&config.acl_file)?;

        Ok(Self {
            config,
            credentials: Mutex::new(credentials),
            acl: Mutex::new(acl),
            sessions: Mutex::new(SessionDirectory::new()),
            introduction: Mutex::new(IntroductionController::new()),
            engine_factory,
        })
    }

    /// `GetSupportedProtocols` — static capability list
    #[must_use]
    pub const fn get_supported_protocols(&self) -> &'static str {
        SUPPORTED_PROTOCOLS
    }

    /// Check whether the calling session holds `role`
    ///
    /// The dispatcher gates every privileged action through this.
    /// Anonymous callers (no certificate) hold only `Public`.
    #[must_use]
    pub fn check_privileges(&self, ctx: &RequestContext<'_>, role: Role) -> bool {
        match ctx.identity() {
            Ok(session_id) => {
                let acl = lock(&self.acl);
                lock(&self.sessions).authorize(&session_id, role, &acl)
            }
            Err(_) => role == Role::Public,
        }
    }

    /// `SendSetupMessage` — drive the pairwise introduction
    ///
    /// Starts a new flow when the slot is idle, otherwise feeds the
    /// in-flight one. On full handshake success the peer is enrolled into
    /// the ACL with the default introduced role set, under the
    /// certificate's common name as alias when the context carries one.
    /// Returns the outbound handshake message, base64-encoded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgs`] for an unknown protocol or
    /// malformed message, [`Error::Busy`] while another peer's
    /// introduction is running, [`Error::NoCertificate`] for anonymous
    /// callers, or [`Error::ActionFailed`] on engine failure.
    pub fn send_setup_message(
        &self,
        ctx: &RequestContext<'_>,
        protocol_type: &str,
        in_message: &str,
    ) -> Result<String> {
        if protocol_type != PROTOCOL_WPS {
            return Err(Error::InvalidArgs(format!(
                "unknown protocol type: {protocol_type}"
            )));
        }

        let peer = ctx.identity()?;
        let mut introduction = lock(&self.introduction);

        if introduction.is_busy() && introduction.running_peer() != Some(peer.as_str()) {
            return Err(Error::Busy);
        }

        if introduction.is_busy() {
            let message = base64_decode(in_message)?;
            let step = introduction.feed(&peer, &message)?;

            if step.status == SetupStatus::Success {
                let roles: RoleSet = [Role::Public, Role::Basic].into_iter().collect();
                lock(&self.acl)
                    .add_cp(&peer, ctx.common_name, &roles, true)
                    .map_err(storage_failure)?;
            }

            Ok(base64_encode(&step.reply))
        } else {
            let engine = (self.engine_factory)();
            let first = introduction.start(&peer, engine)?;
            Ok(base64_encode(&first))
        }
    }

    /// `GetUserLoginChallenge` — issue a one-time, session-bound challenge
    ///
    /// Returns `(salt, challenge)`, both base64-encoded. The challenge is
    /// recorded against the caller's session so it cannot be replayed by
    /// a different peer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAlgorithm`] for any algorithm other than
    /// the supported literal, [`Error::UnknownUser`] for an unknown
    /// non-admin name, or [`Error::NoCertificate`] for anonymous callers.
    pub fn get_user_login_challenge(
        &self,
        ctx: &RequestContext<'_>,
        algorithm: &str,
        name: &str,
    ) -> Result<(String, String)> {
        if algorithm != LOGIN_ALGORITHM {
            return Err(Error::InvalidAlgorithm(algorithm.to_string()));
        }

        let session_id = ctx.identity()?;
        let record = lock(&self.credentials)
            .get_or_create(name)
            .map_err(storage_failure)?;

        let mut nonce = [0u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut nonce);

        let challenge = base64_encode(&compute_challenge(&record.verifier, &nonce));
        lock(&self.sessions).begin_login(&session_id, &record.username, &challenge);

        tracing::debug!(username = %record.username, "issued login challenge");
        Ok((base64_encode(&record.salt), challenge))
    }

    /// `UserLogin` — verify a challenge/authenticator pair
    ///
    /// Fails closed: a session that has already exhausted its attempts is
    /// terminated before any comparison. Exceeding the limit during this
    /// call also terminates the transport session and removes the
    /// caller's directory entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContext`] for an absent or mismatched
    /// challenge, [`Error::AuthenticationFailure`] for an authenticator
    /// mismatch, [`Error::InvalidArgs`] for empty parameters, or
    /// [`Error::NoCertificate`] for anonymous callers.
    pub fn user_login(
        &self,
        ctx: &RequestContext<'_>,
        challenge: &str,
        authenticator: &str,
    ) -> Result<LoginOutcome> {
        if challenge.is_empty() || authenticator.is_empty() {
            return Err(Error::InvalidArgs(
                "challenge and authenticator are required".to_string(),
            ));
        }

        let session_id = ctx.identity()?;
        let max = self.config.max_login_attempts;

        let credentials = lock(&self.credentials);
        let mut sessions = lock(&self.sessions);

        if sessions.attempts_exhausted(&session_id, max) {
            tracing::warn!(session = %session_id, "login attempts already exhausted");
            sessions.remove(&session_id);
            ctx.session.terminate();
            return Ok(LoginOutcome::LockedOut);
        }

        match sessions.check_login(&session_id, challenge, authenticator, &credentials, max) {
            LoginResult::Success { username } => {
                tracing::info!(username = %username, "user logged in");
                Ok(LoginOutcome::LoggedIn)
            }
            LoginResult::InvalidContext => Err(Error::InvalidContext(
                "challenge does not match any pending login".to_string(),
            )),
            LoginResult::Mismatch => Err(Error::AuthenticationFailure),
            LoginResult::LockedOut => {
                tracing::warn!(session = %session_id, "login attempt limit exceeded");
                ctx.session.terminate();
                Ok(LoginOutcome::LockedOut)
            }
        }
    }

    /// `UserLogout` — drop the caller's pending login state
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCertificate`] for anonymous callers
    pub fn user_logout(&self, ctx: &RequestContext<'_>) -> Result<()> {
        let session_id = ctx.identity()?;
        lock(&self.sessions).clear_login(&session_id);
        Ok(())
    }

    /// Remove all state for a closed transport session
    ///
    /// The transport layer calls this when a connection goes away; the
    /// directory entry's lifetime never exceeds its session's.
    pub fn session_closed(&self, certificate: &[u8]) {
        let session_id = derive_identity(certificate);
        lock(&self.sessions).remove(&session_id);
    }

    /// `GetACLData` — the serialized ACL document
    ///
    /// # Errors
    ///
    /// Returns [`Error::ActionFailed`] if serialization fails
    pub fn get_acl_data(&self) -> Result<String> {
        lock(&self.acl).to_document().map_err(storage_failure)
    }

    /// `AddRolesForIdentity` — grant roles to a username or hash identity
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRoleList`] for an unrecognized role name
    /// or [`Error::UnknownRoleRecipient`] for an identity with no entry
    pub fn add_roles_for_identity(&self, identity: &str, role_list: &str) -> Result<()> {
        if identity.trim().is_empty() {
            return Err(Error::InvalidArgs("identity is required".to_string()));
        }
        let roles = RoleSet::parse(role_list)?;
        lock(&self.acl)
            .add_roles(identity, &roles)
            .map_err(storage_failure)
    }

    /// `RemoveRolesForIdentity` — revoke roles from an identity
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRoleList`] for an unrecognized role name
    /// or [`Error::UnknownRoleRecipient`] for an identity with no entry
    pub fn remove_roles_for_identity(&self, identity: &str, role_list: &str) -> Result<()> {
        if identity.trim().is_empty() {
            return Err(Error::InvalidArgs("identity is required".to_string()));
        }
        let roles = RoleSet::parse(role_list)?;
        lock(&self.acl)
            .remove_roles(identity, &roles)
            .map_err(storage_failure)
    }

    /// `GetCurrentRoles` — space-separated roles of the calling session
    ///
    /// Anonymous callers and identities without ACL entries report
    /// `"Public"`.
    #[must_use]
    pub fn get_current_roles(&self, ctx: &RequestContext<'_>) -> String {
        let Ok(session_id) = ctx.identity() else {
            return Role::Public.to_string();
        };

        let acl = lock(&self.acl);
        let mut sessions = lock(&self.sessions);
        let entry = sessions.resolve(&session_id);
        let assumed = entry.role;

        let identity = entry.identity.clone().unwrap_or(session_id);
        let roles = acl.roles_of(&identity);
        if roles.is_empty() {
            assumed.to_string()
        } else {
            roles.to_string()
        }
    }
}

impl std::fmt::Debug for DeviceProtection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceProtection")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Lock a store, recovering from poisoning
///
/// Guards never leave partial updates behind, so a panic elsewhere does
/// not invalidate store state.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Map store IO/serialization failures to [`Error::ActionFailed`]
///
/// Validation errors (unknown user, unknown recipient, invalid role list)
/// pass through untouched; only infrastructure failures are translated.
fn storage_failure(e: Error) -> Error {
    match e {
        Error::Io(e) => Error::ActionFailed(format!("storage failure: {e}")),
        Error::Serialization(e) => Error::ActionFailed(format!("serialization failure: {e}")),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::introduction::SetupStep;

    struct NoopSession;

    impl TransportSession for NoopSession {
        fn terminate(&self) {}
    }

    struct OneShotEngine;

    impl SetupEngine for OneShotEngine {
        fn start(&mut self) -> Result<Vec<u8>> {
            Ok(b"m1".to_vec())
        }

        fn update(&mut self, _message: &[u8]) -> Result<SetupStep> {
            Ok(SetupStep {
                reply: b"done".to_vec(),
                status: SetupStatus::Success,
            })
        }
    }

    fn service() -> (tempfile::TempDir, DeviceProtection) {
        let dir = tempfile::tempdir().unwrap();
        let config = ProtectionConfig {
            admin_password: "secret".to_string(),
            passwd_file: dir.path().join("passwd"),
            acl_file: dir.path().join("acl.json"),
            max_login_attempts: 3,
        };
        let dp = DeviceProtection::new(config, Box::new(|| Box::new(OneShotEngine))).unwrap();
        (dir, dp)
    }

    #[test]
    fn test_supported_protocols() {
        let (_dir, dp) = service();
        assert!(dp.get_supported_protocols().contains("WPS"));
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        let (_dir, dp) = service();
        let ctx = RequestContext::new(Some(b"cert" as &[u8]), &NoopSession);

        assert!(matches!(
            dp.send_setup_message(&ctx, "Bluetooth", ""),
            Err(Error::InvalidArgs(_))
        ));
    }

    #[test]
    fn test_invalid_algorithm_rejected() {
        let (_dir, dp) = service();
        let ctx = RequestContext::new(Some(b"cert" as &[u8]), &NoopSession);

        assert!(matches!(
            dp.get_user_login_challenge(&ctx, "SRP", "ADMIN"),
            Err(Error::InvalidAlgorithm(_))
        ));
    }

    #[test]
    fn test_anonymous_caller_is_public_only() {
        let (_dir, dp) = service();
        let ctx = RequestContext::new(None, &NoopSession);

        assert!(dp.check_privileges(&ctx, Role::Public));
        assert!(!dp.check_privileges(&ctx, Role::Basic));
        assert_eq!(dp.get_current_roles(&ctx), "Public");
        assert!(matches!(
            dp.get_user_login_challenge(&ctx, LOGIN_ALGORITHM, "ADMIN"),
            Err(Error::NoCertificate)
        ));
    }

    #[test]
    fn test_empty_login_args_rejected() {
        let (_dir, dp) = service();
        let ctx = RequestContext::new(Some(b"cert" as &[u8]), &NoopSession);

        assert!(matches!(
            dp.user_login(&ctx, "", ""),
            Err(Error::InvalidArgs(_))
        ));
    }
}
