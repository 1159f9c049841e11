//! Shared test utilities

use std::sync::atomic::{AtomicBool, Ordering};

use gateway_protection::{
    DeviceProtection, ProtectionConfig, Result, SetupEngine, SetupStatus, SetupStep,
    TransportSession,
};

/// Bootstrap password used by every test service
pub const TEST_PASSWORD: &str = "correct horse battery staple";

/// Transport session mock that records termination
#[derive(Default)]
pub struct MockSession {
    terminated: AtomicBool,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

impl TransportSession for MockSession {
    fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }
}

/// Handshake engine mock that replays a fixed status sequence
pub struct ScriptedEngine {
    statuses: Vec<SetupStatus>,
}

impl ScriptedEngine {
    /// Engine whose first update reports the given terminal status
    pub fn terminal(status: SetupStatus) -> Self {
        Self {
            statuses: vec![status],
        }
    }
}

impl SetupEngine for ScriptedEngine {
    fn start(&mut self) -> Result<Vec<u8>> {
        Ok(b"handshake-m1".to_vec())
    }

    fn update(&mut self, _message: &[u8]) -> Result<SetupStep> {
        let status = if self.statuses.is_empty() {
            SetupStatus::Failure
        } else {
            self.statuses.remove(0)
        };
        Ok(SetupStep {
            reply: b"handshake-reply".to_vec(),
            status,
        })
    }
}

/// Install a log subscriber once so `RUST_LOG` works under `cargo test`
fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build an isolated service whose engines replay `statuses`
pub fn setup_service(
    statuses: Vec<SetupStatus>,
) -> (tempfile::TempDir, DeviceProtection) {
    init_tracing();
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let config = ProtectionConfig {
        admin_password: TEST_PASSWORD.to_string(),
        passwd_file: dir.path().join("gateway.passwd"),
        acl_file: dir.path().join("acl.json"),
        max_login_attempts: 3,
    };

    let dp = DeviceProtection::new(
        config,
        Box::new(move || {
            Box::new(ScriptedEngine {
                statuses: statuses.clone(),
            })
        }),
    )
    .expect("failed to open service");

    (dir, dp)
}

pub fn base64_decode(data: &str) -> Vec<u8> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .expect("invalid base64")
}
