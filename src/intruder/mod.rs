//! Intruder handling: evidence capture on a dedicated thread and the
//! response strategy the lock gate invokes after a failed unlock.

pub mod capture;
pub mod response;

pub use capture::{
    CaptureError, CaptureReport, CaptureWorker, EvidenceCamera, IntruderSink, LocationProvider,
    NoLocation,
};
pub use response::{EvidenceResponse, IntruderResponse, NoopResponse};

use crate::models::UnlockMethod;

/// What the gate knows about a rejected unlock attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttempt {
    pub target: String,
    pub method: UnlockMethod,
    pub at_ms: i64,
}
