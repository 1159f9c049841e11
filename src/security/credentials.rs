//! Credential store: per-username salt/verifier records
//!
//! Passwords are never stored. Each record keeps a random salt and a
//! PBKDF2-derived verifier; the administrator record is provisioned
//! lazily from the configured bootstrap password on its first login
//! challenge. The backing file holds one `NAME,base64(salt),base64(verifier)`
//! record per line and is rewritten through a temp file and an atomic
//! rename on update or delete.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;

use super::identity::{base64_decode, base64_encode, normalize_username};
use crate::{Error, Result};

/// Salt length in bytes
pub const SALT_BYTES: usize = 16;

/// Verifier length in bytes (first 160 bits of the PBKDF2 output)
pub const VERIFIER_BYTES: usize = 20;

/// PBKDF2 iteration count
const PRF_ROUNDS: u32 = 5000;

/// Username of the bootstrap administrator account
pub const ADMIN_NAME: &str = "ADMIN";

/// A stored salt/verifier pair for one username
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    /// Case-normalized username
    pub username: String,

    /// Random salt
    pub salt: Vec<u8>,

    /// PBKDF2-derived secret standing in for the password
    pub verifier: Vec<u8>,
}

/// File-backed credential store
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    admin_password: String,
    records: HashMap<String, CredentialRecord>,
}

impl CredentialStore {
    /// Open the store, loading existing records from `path` if present
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn open(path: &Path, admin_password: &str) -> Result<Self> {
        let mut store = Self {
            path: path.to_path_buf(),
            admin_password: admin_password.to_string(),
            records: HashMap::new(),
        };
        store.reload()?;
        Ok(store)
    }

    /// Re-read all records from the backing file
    ///
    /// # Errors
    ///
    /// Returns error on IO failure or a malformed record line
    pub fn reload(&mut self) -> Result<()> {
        self.records.clear();

        if !self.path.exists() {
            return Ok(());
        }

        let content = fs::read_to_string(&self.path)?;
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let record = parse_record(line)?;
            self.records.insert(record.username.clone(), record);
        }

        tracing::debug!(count = self.records.len(), "loaded credential records");
        Ok(())
    }

    /// Check whether a username has a stored record
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        normalize_username(name)
            .map(|upper| self.records.contains_key(&upper))
            .unwrap_or(false)
    }

    /// Look up the record for a username
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&CredentialRecord> {
        let upper = normalize_username(name).ok()?;
        self.records.get(&upper)
    }

    /// Fetch the salt/verifier pair for a username, provisioning the
    /// administrator account on first sight
    ///
    /// Only `ADMIN` is ever auto-provisioned; the verifier is derived from
    /// the configured bootstrap password with
    /// `PBKDF2-HMAC-SHA256(password, name ‖ salt, 5000)` truncated to
    /// 20 bytes. All other unknown usernames are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownUser`] for an unknown non-admin username,
    /// or an IO error if the new record cannot be persisted.
    pub fn get_or_create(&mut self, name: &str) -> Result<CredentialRecord> {
        let upper = normalize_username(name)?;

        if let Some(record) = self.records.get(&upper) {
            return Ok(record.clone());
        }

        if upper != ADMIN_NAME {
            return Err(Error::UnknownUser(upper));
        }

        let mut salt = vec![0u8; SALT_BYTES];
        OsRng.fill_bytes(&mut salt);

        let verifier = derive_verifier(&self.admin_password, &upper, &salt);
        let record = CredentialRecord {
            username: upper.clone(),
            salt,
            verifier,
        };

        self.append(&record)?;
        self.records.insert(upper.clone(), record.clone());
        tracing::info!(username = %upper, "provisioned administrator credential record");

        Ok(record)
    }

    /// Replace the salt/verifier pair for an existing username
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownUser`] if no record exists, or an IO error
    /// on rewrite failure
    pub fn upsert(&mut self, name: &str, salt: Vec<u8>, verifier: Vec<u8>) -> Result<()> {
        let upper = normalize_username(name)?;
        check_lengths(&salt, &verifier)?;

        if !self.records.contains_key(&upper) {
            return Err(Error::UnknownUser(upper));
        }

        self.records.insert(
            upper.clone(),
            CredentialRecord {
                username: upper,
                salt,
                verifier,
            },
        );
        self.rewrite()
    }

    /// Remove a username's record
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownUser`] if no record exists, or an IO error
    /// on rewrite failure
    pub fn delete(&mut self, name: &str) -> Result<()> {
        let upper = normalize_username(name)?;
        if self.records.remove(&upper).is_none() {
            return Err(Error::UnknownUser(upper));
        }
        self.rewrite()
    }

    /// Append a single new record to the backing file
    fn append(&self, record: &CredentialRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", format_record(record))?;
        Ok(())
    }

    /// Rewrite the whole file through a temp file and atomic rename
    fn rewrite(&self) -> Result<()> {
        let temp = self.path.with_extension("temp");

        let mut out = String::new();
        for record in self.records.values() {
            out.push_str(&format_record(record));
            out.push('\n');
        }

        fs::write(&temp, out)?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

/// Derive a verifier from a password, normalized name, and salt
#[must_use]
pub fn derive_verifier(password: &str, name_upper: &str, salt: &[u8]) -> Vec<u8> {
    let mut name_salt = Vec::with_capacity(name_upper.len() + salt.len());
    name_salt.extend_from_slice(name_upper.as_bytes());
    name_salt.extend_from_slice(salt);

    let mut verifier = vec![0u8; VERIFIER_BYTES];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &name_salt, PRF_ROUNDS, &mut verifier);
    verifier
}

fn check_lengths(salt: &[u8], verifier: &[u8]) -> Result<()> {
    if salt.len() != SALT_BYTES {
        return Err(Error::ActionFailed(format!(
            "salt length {} (expected {SALT_BYTES})",
            salt.len()
        )));
    }
    if verifier.len() != VERIFIER_BYTES {
        return Err(Error::ActionFailed(format!(
            "verifier length {} (expected {VERIFIER_BYTES})",
            verifier.len()
        )));
    }
    Ok(())
}

fn format_record(record: &CredentialRecord) -> String {
    format!(
        "{},{},{}",
        record.username,
        base64_encode(&record.salt),
        base64_encode(&record.verifier)
    )
}

fn parse_record(line: &str) -> Result<CredentialRecord> {
    let mut fields = line.split(',');
    let (Some(name), Some(b64_salt), Some(b64_verifier), None) = (
        fields.next(),
        fields.next(),
        fields.next(),
        fields.next(),
    ) else {
        return Err(Error::ActionFailed(format!(
            "malformed credential record: {line}"
        )));
    };

    let username = normalize_username(name)?;
    let salt = base64_decode(b64_salt)?;
    let verifier = base64_decode(b64_verifier)?;
    check_lengths(&salt, &verifier)?;

    Ok(CredentialRecord {
        username,
        salt,
        verifier,
    })
}
