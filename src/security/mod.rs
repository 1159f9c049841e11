//! Security primitives: identity derivation, roles, credential and ACL
//! stores, session directory, and the pairing introduction controller

pub mod acl;
pub mod credentials;
pub mod identity;
pub mod introduction;
pub mod roles;
pub mod sessions;

pub use acl::{AclEntry, AclStore};
pub use credentials::{CredentialRecord, CredentialStore, derive_verifier};
pub use identity::{derive_identity, is_certificate_hash};
pub use introduction::{IntroductionController, SetupEngine, SetupStatus, SetupStep};
pub use roles::{Role, RoleSet};
pub use sessions::{LoginResult, SessionDirectory, SessionEntry};
