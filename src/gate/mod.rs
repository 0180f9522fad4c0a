//! The lock gate: a per-trigger state machine guarding one target.
//!
//! `Presented -> Validating -> {Unlocked, IntruderFlow}`; `IntruderFlow` may
//! `resume` back to `Presented`. Nothing but a verified attempt reaches
//! `Unlocked`.

use crate::intruder::{CaptureReport, FailedAttempt, IntruderResponse};
use crate::models::{current_millis, SecurityConfig, UnlockMethod};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Presented,
    Validating,
    Unlocked,
    IntruderFlow,
}

/// What the host surface should do after a gate call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    /// Send the user to the home surface; the gate stays up.
    GoHome,
    /// Remove the overlay.
    Dismiss,
    /// Attempt not evaluated; ask again.
    Retry,
    /// Attempt rejected and the intruder response ran.
    IntruderDetected { decoy_shown: bool },
}

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("cannot {action} while {from:?}")]
    InvalidTransition {
        from: GateState,
        action: &'static str,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("authenticator unavailable: {0}")]
    Unavailable(String),
    #[error("malformed attempt: {0}")]
    Malformed(String),
}

/// A user-submitted unlock attempt. The secret is opaque to the gate.
#[derive(Clone, PartialEq, Eq)]
pub struct UnlockAttempt {
    pub method: UnlockMethod,
    pub secret: Vec<u8>,
}

impl UnlockAttempt {
    pub fn new(method: UnlockMethod, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            method,
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for UnlockAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockAttempt")
            .field("method", &self.method)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Decides whether an attempt unlocks. How is up to the implementation.
pub trait Authenticator: Send + Sync {
    fn verify(&self, attempt: &UnlockAttempt) -> Result<bool, AuthError>;
}

pub struct LockGate {
    target: String,
    state: GateState,
    config: SecurityConfig,
    authenticator: Arc<dyn Authenticator>,
    response: Arc<dyn IntruderResponse>,
    failed_attempts: u32,
    evidence_tx: Sender<CaptureReport>,
    evidence_rx: Receiver<CaptureReport>,
}

impl LockGate {
    /// Shows the gate over `target`.
    pub fn present(
        target: &str,
        config: SecurityConfig,
        authenticator: Arc<dyn Authenticator>,
        response: Arc<dyn IntruderResponse>,
    ) -> Self {
        log::info!("Lock gate presented for {target}");
        let (evidence_tx, evidence_rx) = mpsc::channel();
        Self {
            target: target.to_string(),
            state: GateState::Presented,
            config,
            authenticator,
            response,
            failed_attempts: 0,
            evidence_tx,
            evidence_rx,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn is_unlocked(&self) -> bool {
        self.state == GateState::Unlocked
    }

    /// Back navigation never dismisses a locked gate.
    pub fn back(&self) -> GateAction {
        match self.state {
            GateState::Unlocked => GateAction::Dismiss,
            GateState::Presented | GateState::Validating | GateState::IntruderFlow => {
                GateAction::GoHome
            }
        }
    }

    pub fn submit(&mut self, attempt: &UnlockAttempt) -> Result<GateAction, GateError> {
        if self.state != GateState::Presented {
            return Err(GateError::InvalidTransition {
                from: self.state,
                action: "submit",
            });
        }

        if !self.config.is_method_enabled(attempt.method) {
            log::warn!(
                "Unlock method {} is disabled, ignoring attempt on {}",
                attempt.method,
                self.target
            );
            return Ok(GateAction::Retry);
        }

        self.state = GateState::Validating;

        if self.verify(attempt) {
            self.state = GateState::Unlocked;
            log::info!("Lock gate for {} unlocked via {}", self.target, attempt.method);
            return Ok(GateAction::Dismiss);
        }

        self.failed_attempts = self.failed_attempts.saturating_add(1);
        self.state = GateState::IntruderFlow;
        log::warn!(
            "Failed {} unlock on {} (attempt {})",
            attempt.method,
            self.target,
            self.failed_attempts
        );

        let decoy_shown = self.run_intruder_flow(attempt.method);
        Ok(GateAction::IntruderDetected { decoy_shown })
    }

    /// Leave the intruder flow for another attempt.
    pub fn resume(&mut self) -> Result<(), GateError> {
        if self.state != GateState::IntruderFlow {
            return Err(GateError::InvalidTransition {
                from: self.state,
                action: "resume",
            });
        }
        self.state = GateState::Presented;
        Ok(())
    }

    /// Capture completions that arrived since the last call.
    pub fn poll_evidence(&self) -> Vec<CaptureReport> {
        self.evidence_rx.try_iter().collect()
    }

    /// Any error or panic from the authenticator counts as a rejection.
    fn verify(&self, attempt: &UnlockAttempt) -> bool {
        match panic::catch_unwind(AssertUnwindSafe(|| self.authenticator.verify(attempt))) {
            Ok(Ok(verified)) => verified,
            Ok(Err(e)) => {
                log::warn!("Authenticator error on {}: {e}", self.target);
                false
            }
            Err(_) => {
                log::error!("Authenticator panicked on {}", self.target);
                false
            }
        }
    }

    fn start_capture(&self, attempt: &FailedAttempt) -> bool {
        let reply = self.evidence_tx.clone();
        match panic::catch_unwind(AssertUnwindSafe(|| self.response.capture(attempt, reply))) {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                log::warn!("Intruder capture for {} not started: {e}", self.target);
                false
            }
            Err(_) => {
                log::error!("Intruder capture for {} panicked", self.target);
                false
            }
        }
    }

    fn record(&self, attempt: &FailedAttempt) {
        match panic::catch_unwind(AssertUnwindSafe(|| self.response.record(attempt))) {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => log::warn!("Failed to record intruder event: {e}"),
            Err(_) => log::error!("Intruder record for {} panicked", self.target),
        }
    }

    /// Runs the intruder response. Never fails and never changes the state.
    fn run_intruder_flow(&self, method: UnlockMethod) -> bool {
        let attempt = FailedAttempt {
            target: self.target.clone(),
            method,
            at_ms: current_millis(),
        };

        // A capture that never started falls back to a plain record.
        if !self.config.intruder_capture_enabled || !self.start_capture(&attempt) {
            self.record(&attempt);
        }

        if !self.config.decoy_enabled {
            return false;
        }

        let shown =
            panic::catch_unwind(AssertUnwindSafe(|| self.response.present_decoy(&self.target)))
                .is_ok();
        if !shown {
            log::error!("Decoy surface for {} panicked", self.target);
        }
        shown
    }
}
