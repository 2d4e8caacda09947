//! Recognition session lifecycle
//!
//! Listening -> Resolved     (final result or engine error)
//! Listening -> Superseded   (a newer session is starting)
//! Listening -> Destroyed    (explicit stop)
//! Resolved -> Destroyed     (explicit stop or superseding teardown)
//! Superseded -> Destroyed   (superseding teardown)

use std::time::Instant;

use tracing::{debug, info, warn};

use super::pending::PendingCall;
use crate::engine::{ActiveRecognition, SessionToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Engine running, result not yet delivered
    Listening,
    /// The caller's request has its outcome
    Resolved,
    /// A newer session is replacing this one
    Superseded,
    /// Engine released, nothing more will happen
    Destroyed,
}

impl SessionState {
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        matches!(
            (self, target),
            (SessionState::Listening, SessionState::Resolved)
                | (SessionState::Listening, SessionState::Superseded)
                | (SessionState::Listening, SessionState::Destroyed)
                | (SessionState::Resolved, SessionState::Destroyed)
                | (SessionState::Superseded, SessionState::Destroyed)
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Listening => write!(f, "Listening"),
            SessionState::Resolved => write!(f, "Resolved"),
            SessionState::Superseded => write!(f, "Superseded"),
            SessionState::Destroyed => write!(f, "Destroyed"),
        }
    }
}

/// One run of the recognition engine and the request that opened it
pub struct RecognitionSession {
    token: SessionToken,
    language: String,
    partial_results: bool,
    state: SessionState,
    pending: Option<PendingCall<Vec<String>>>,
    engine: Option<Box<dyn ActiveRecognition>>,
    started_at: Instant,
}

impl RecognitionSession {
    pub fn new(
        token: SessionToken,
        language: String,
        partial_results: bool,
        pending: PendingCall<Vec<String>>,
        engine: Box<dyn ActiveRecognition>,
    ) -> Self {
        Self {
            token,
            language,
            partial_results,
            state: SessionState::Listening,
            pending: Some(pending),
            engine: Some(engine),
            started_at: Instant::now(),
        }
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn partial_results(&self) -> bool {
        self.partial_results
    }

    /// Take the caller's request out, marking it released
    pub fn take_pending(&mut self) -> Option<PendingCall<Vec<String>>> {
        self.pending.take()
    }

    /// Apply a transition; invalid ones are logged and ignored
    pub fn transition(&mut self, target: SessionState) -> bool {
        if !self.state.can_transition_to(&target) {
            warn!(
                token = %self.token,
                from = %self.state,
                to = %target,
                "invalid session transition"
            );
            return false;
        }

        info!(
            token = %self.token,
            from = %self.state,
            to = %target,
            elapsed_ms = self.started_at.elapsed().as_millis() as u64,
            "session transition"
        );
        self.state = target;
        true
    }

    /// Cancel and drop the engine instance
    pub fn release_engine(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            debug!(token = %self.token, "releasing recognition engine");
            engine.cancel();
        }
    }
}

impl Drop for RecognitionSession {
    fn drop(&mut self) {
        self.release_engine();
    }
}
