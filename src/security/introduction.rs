//! Pairwise introduction controller
//!
//! Wraps a single in-flight pairing handshake. The handshake's message
//! format is an external concern: the engine behind [`SetupEngine`] is an
//! opaque state machine that consumes and produces message buffers. This
//! module only enforces the session lifecycle: at most one introduction
//! runs at a time, only the initiating peer may feed it, and any terminal
//! state or engine error returns the slot to idle so a wedged peer can
//! never block future pairing.

use crate::{Error, Result};

/// Terminal or intermediate status reported by the handshake engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStatus {
    /// Handshake continues; more messages expected
    Continue,

    /// Handshake completed fully; the peer should be enrolled
    Success,

    /// Handshake terminated early with an informational message
    /// (e.g. display-only completion); no enrollment
    SuccessInfo,

    /// Handshake failed
    Failure,
}

impl SetupStatus {
    /// True for any status that ends the handshake
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Continue)
    }
}

/// One engine step: the outbound reply and the resulting status
#[derive(Debug, Clone)]
pub struct SetupStep {
    /// Outbound handshake message to return to the peer
    pub reply: Vec<u8>,

    /// Engine status after consuming the inbound message
    pub status: SetupStatus,
}

/// Opaque pairwise-introduction handshake state machine
pub trait SetupEngine: Send {
    /// Start the handshake and produce the first outbound message
    ///
    /// # Errors
    ///
    /// Returns error if the engine fails to initialize
    fn start(&mut self) -> Result<Vec<u8>>;

    /// Feed one inbound message and collect the engine's step
    ///
    /// # Errors
    ///
    /// Returns error on an unrecoverable engine failure
    fn update(&mut self, message: &[u8]) -> Result<SetupStep>;
}

enum Slot {
    Idle,
    Running {
        peer: String,
        engine: Box<dyn SetupEngine>,
    },
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Running { peer, .. } => {
                f.debug_struct("Running").field("peer", peer).finish_non_exhaustive()
            }
        }
    }
}

/// Single-slot controller for the pairing introduction flow
#[derive(Debug)]
pub struct IntroductionController {
    slot: Slot,
}

impl Default for IntroductionController {
    fn default() -> Self {
        Self::new()
    }
}

impl IntroductionController {
    /// Create an idle controller
    #[must_use]
    pub const fn new() -> Self {
        Self { slot: Slot::Idle }
    }

    /// True while an introduction is in flight
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self.slot, Slot::Running { .. })
    }

    /// Peer identity that owns the in-flight introduction, if any
    #[must_use]
    pub fn running_peer(&self) -> Option<&str> {
        match &self.slot {
            Slot::Idle => None,
            Slot::Running { peer, .. } => Some(peer),
        }
    }

    /// Start a new introduction for `peer`
    ///
    /// Produces the first outbound handshake message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if an introduction is already running, or
    /// the engine's error (slot stays idle) if it fails to start.
    pub fn start(&mut self, peer: &str, mut engine: Box<dyn SetupEngine>) -> Result<Vec<u8>> {
        if self.is_busy() {
            return Err(Error::Busy);
        }

        let first = engine.start()?;
        tracing::info!(peer = %peer, "started pairwise introduction");

        self.slot = Slot::Running {
            peer: peer.to_string(),
            engine,
        };
        Ok(first)
    }

    /// Feed inbound handshake bytes from `peer`
    ///
    /// Terminal statuses reset the slot to idle before returning; the
    /// caller decides whether the outcome warrants enrollment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the introduction belongs to a different
    /// peer, [`Error::InvalidContext`] if none is running, or the engine's
    /// error (slot reset to idle).
    pub fn feed(&mut self, peer: &str, message: &[u8]) -> Result<SetupStep> {
        let Slot::Running { peer: owner, engine } = &mut self.slot
        else {
            return Err(Error::InvalidContext(
                "no introduction in progress".to_string(),
            ));
        };

        if owner != peer {
            return Err(Error::Busy);
        }

        let step = match engine.update(message) {
            Ok(step) => step,
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "introduction engine failure");
                self.slot = Slot::Idle;
                return Err(e);
            }
        };

        if step.status.is_terminal() {
            tracing::info!(peer = %peer, status = ?step.status, "introduction finished");
            self.slot = Slot::Idle;
        }

        Ok(step)
    }

    /// Abort any in-flight introduction
    pub fn reset(&mut self) {
        if self.is_busy() {
            tracing::debug!("introduction controller reset");
        }
        self.slot = Slot::Idle;
    }
}
