use super::capture::{CaptureError, CaptureReport, CaptureWorker, IntruderSink};
use super::FailedAttempt;
use crate::error::AppResult;
use crate::models::IntruderEvent;
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// What happens after a failed unlock.
///
/// Implementations must not block: `capture` hands work off and returns.
pub trait IntruderResponse: Send + Sync {
    /// Start gathering evidence; the outcome arrives on `reply`.
    fn capture(&self, attempt: &FailedAttempt, reply: Sender<CaptureReport>)
        -> Result<(), CaptureError>;

    /// Record the attempt without evidence.
    fn record(&self, attempt: &FailedAttempt) -> AppResult<i64>;

    /// Put a decoy surface in front of the protected target.
    fn present_decoy(&self, target: &str);
}

type DecoyHook = Box<dyn Fn(&str) + Send + Sync>;

/// Camera capture through a [`CaptureWorker`], events into an [`IntruderSink`].
pub struct EvidenceResponse {
    worker: CaptureWorker,
    sink: Arc<dyn IntruderSink>,
    decoy: Option<DecoyHook>,
}

impl EvidenceResponse {
    pub fn new(worker: CaptureWorker, sink: Arc<dyn IntruderSink>) -> Self {
        Self {
            worker,
            sink,
            decoy: None,
        }
    }

    pub fn with_decoy<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.decoy = Some(Box::new(hook));
        self
    }
}

impl IntruderResponse for EvidenceResponse {
    fn capture(
        &self,
        attempt: &FailedAttempt,
        reply: Sender<CaptureReport>,
    ) -> Result<(), CaptureError> {
        self.worker.submit(attempt.clone(), Some(reply))
    }

    fn record(&self, attempt: &FailedAttempt) -> AppResult<i64> {
        let mut event = IntruderEvent::new(attempt.at_ms, &attempt.target, attempt.method);
        self.sink.record(&mut event)
    }

    fn present_decoy(&self, target: &str) {
        match &self.decoy {
            Some(hook) => hook(target),
            None => log::info!("Decoy requested for {target} but no decoy surface is attached"),
        }
    }
}

/// Does nothing; for hosts without a camera and for tests.
pub struct NoopResponse;

impl IntruderResponse for NoopResponse {
    fn capture(
        &self,
        _attempt: &FailedAttempt,
        _reply: Sender<CaptureReport>,
    ) -> Result<(), CaptureError> {
        Ok(())
    }

    fn record(&self, _attempt: &FailedAttempt) -> AppResult<i64> {
        Ok(0)
    }

    fn present_decoy(&self, _target: &str) {}
}
