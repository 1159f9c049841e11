//! Error types for the DeviceProtection subsystem

use thiserror::Error;

/// Result type alias for DeviceProtection operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the DeviceProtection subsystem
///
/// Cryptographic and storage failures are mapped to [`Error::ActionFailed`]
/// at the action boundary; they never cross it as panics.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed action parameters
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    /// Credential lookup miss for a non-bootstrap username
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// Identity is neither a known username nor a known certificate hash
    #[error("unknown identity: {0}")]
    UnknownIdentity(String),

    /// Login algorithm is not the supported literal
    #[error("invalid algorithm: {0}")]
    InvalidAlgorithm(String),

    /// Challenge mismatch or stale/absent pending login
    #[error("invalid context: {0}")]
    InvalidContext(String),

    /// Authenticator value does not match the expected value
    #[error("authentication failure")]
    AuthenticationFailure,

    /// Introduction controller is occupied by another peer
    #[error("introduction in progress for another peer")]
    Busy,

    /// Internal derivation, crypto, or storage failure
    #[error("action failed: {0}")]
    ActionFailed(String),

    /// Role list contains a name outside the recognized vocabulary
    #[error("invalid role list: {0}")]
    InvalidRoleList(String),

    /// Role mutation targets an identity with no ACL entry
    #[error("unknown role recipient: {0}")]
    UnknownRoleRecipient(String),

    /// Connection is not certificate-authenticated
    #[error("no peer certificate")]
    NoCertificate,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
