//! DeviceProtection subsystem for a network gateway
//!
//! This library provides the security core a gateway's transport/RPC
//! dispatch layer builds on:
//! - Pairwise-introduction (secure pairing) session control
//! - Challenge-response user login with attempt limiting
//! - Identity/role authorization store (ACL) gating privileged actions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │          Transport / RPC dispatch (external)         │
//! │     TLS session  │  action routing  │  peer certs   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │               DeviceProtection actions               │
//! │  SendSetupMessage │ UserLogin │ ACL role management │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │   Credential store │ ACL │ Session directory (SIR)  │
//! │           Introduction controller (single slot)      │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod actions;
pub mod config;
pub mod error;
pub mod security;

pub use actions::{
    DeviceProtection, LOGIN_ALGORITHM, LoginOutcome, PROTOCOL_WPS, RequestContext,
    SUPPORTED_PROTOCOLS, TransportSession,
};
pub use config::ProtectionConfig;
pub use error::{Error, Result};
pub use security::{
    AclEntry, AclStore, CredentialRecord, CredentialStore, IntroductionController, LoginResult,
    Role, RoleSet, SessionDirectory, SessionEntry, SetupEngine, SetupStatus, SetupStep,
    derive_identity, derive_verifier, is_certificate_hash,
};
