//! Configuration for the DeviceProtection subsystem

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Default ceiling on failed login attempts per session
const DEFAULT_MAX_LOGIN_ATTEMPTS: u32 = 3;

/// DeviceProtection configuration
///
/// The administrator password is the root of trust for the first login:
/// the credential store derives the stored verifier from it lazily, after
/// which the plaintext password is never consulted again.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProtectionConfig {
    /// Bootstrap password for the administrator account
    pub admin_password: String,

    /// Path to the credential store file (one salt/verifier record per line)
    pub passwd_file: PathBuf,

    /// Path to the persisted ACL document
    pub acl_file: PathBuf,

    /// Failed login attempts tolerated before the session is torn down
    pub max_login_attempts: u32,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            admin_password: String::new(),
            passwd_file: PathBuf::from("gateway.passwd"),
            acl_file: PathBuf::from("gateway-acl.json"),
            max_login_attempts: DEFAULT_MAX_LOGIN_ATTEMPTS,
        }
    }
}

impl ProtectionConfig {
    /// Create from environment variables
    ///
    /// Reads `GATEWAY_ADMIN_PASSWORD`, `GATEWAY_PASSWD_FILE`,
    /// `GATEWAY_ACL_FILE`, and `GATEWAY_MAX_LOGIN_ATTEMPTS`, falling back
    /// to defaults for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let admin_password =
            std::env::var("GATEWAY_ADMIN_PASSWORD").unwrap_or(defaults.admin_password);
        let passwd_file = std::env::var("GATEWAY_PASSWD_FILE")
            .map_or(defaults.passwd_file, PathBuf::from);
        let acl_file =
            std::env::var("GATEWAY_ACL_FILE").map_or(defaults.acl_file, PathBuf::from);
        let max_login_attempts = std::env::var("GATEWAY_MAX_LOGIN_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_login_attempts);

        Self {
            admin_password,
            passwd_file,
            acl_file,
            max_login_attempts,
        }
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not valid TOML
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProtectionConfig::default();
        assert_eq!(config.max_login_attempts, DEFAULT_MAX_LOGIN_ATTEMPTS);
        assert!(config.admin_password.is_empty());
    }

    #[test]
    fn test_load_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("protection.toml");
        std::fs::write(
            &path,
            "admin_password = \"hunter2\"\nmax_login_attempts = 5\n",
        )
        .unwrap();

        let config = ProtectionConfig::load(&path).unwrap();
        assert_eq!(config.admin_password, "hunter2");
        assert_eq!(config.max_login_attempts, 5);
        // Unset fields keep defaults
        assert_eq!(config.passwd_file, PathBuf::from("gateway.passwd"));
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "admin_password = [").unwrap();

        assert!(ProtectionConfig::load(&path).is_err());
    }
}
