use super::FailedAttempt;
use crate::error::AppResult;
use crate::models::{GeoPoint, IntruderEvent};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("failed to write evidence: {0}")]
    Io(#[from] std::io::Error),
    #[error("camera panicked during capture")]
    Panicked,
    #[error("capture worker is not running")]
    WorkerStopped,
}

/// Blocking hardware boundary. Writes one image to `dest`.
pub trait EvidenceCamera: Send + Sync {
    fn capture(&self, dest: &Path, target: &str) -> Result<(), CaptureError>;
}

/// Best-effort position of the device.
pub trait LocationProvider: Send + Sync {
    fn current_fix(&self) -> Option<GeoPoint>;
}

pub struct NoLocation;

impl LocationProvider for NoLocation {
    fn current_fix(&self) -> Option<GeoPoint> {
        None
    }
}

/// Where intruder events end up.
pub trait IntruderSink: Send + Sync {
    /// Persists the event and returns its id.
    fn record(&self, event: &mut IntruderEvent) -> AppResult<i64>;
}

/// Completion delivered back to the gate that requested a capture.
#[derive(Debug)]
pub struct CaptureReport {
    pub attempt: FailedAttempt,
    pub evidence: Result<PathBuf, CaptureError>,
    pub event_id: Option<i64>,
}

struct CaptureJob {
    attempt: FailedAttempt,
    reply: Option<Sender<CaptureReport>>,
}

/// Runs captures one at a time on its own thread.
///
/// Submitting never blocks. Shutting down (or dropping) the worker closes the
/// queue without joining: an in-flight capture finishes on its own, queued
/// ones are discarded.
pub struct CaptureWorker {
    tx: Option<Sender<CaptureJob>>,
}

impl CaptureWorker {
    pub fn spawn(
        camera: Arc<dyn EvidenceCamera>,
        location: Arc<dyn LocationProvider>,
        sink: Arc<dyn IntruderSink>,
        evidence_dir: PathBuf,
    ) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<CaptureJob>();

        thread::Builder::new()
            .name("intruder-capture".to_string())
            .spawn(move || run_jobs(&rx, &*camera, &*location, &*sink, &evidence_dir))?;

        Ok(Self { tx: Some(tx) })
    }

    pub fn submit(
        &self,
        attempt: FailedAttempt,
        reply: Option<Sender<CaptureReport>>,
    ) -> Result<(), CaptureError> {
        let tx = self.tx.as_ref().ok_or(CaptureError::WorkerStopped)?;
        tx.send(CaptureJob { attempt, reply })
            .map_err(|_| CaptureError::WorkerStopped)
    }

    pub fn shutdown(&mut self) {
        self.tx = None;
    }

    pub fn is_running(&self) -> bool {
        self.tx.is_some()
    }
}

fn run_jobs(
    rx: &Receiver<CaptureJob>,
    camera: &dyn EvidenceCamera,
    location: &dyn LocationProvider,
    sink: &dyn IntruderSink,
    evidence_dir: &Path,
) {
    while let Ok(job) = rx.recv() {
        let report = process_job(job.attempt, camera, location, sink, evidence_dir);
        if let Some(reply) = job.reply {
            // The gate may already be gone; nobody is waiting then.
            let _ = reply.send(report);
        }
    }
    log::debug!("Capture worker queue closed, exiting");
}

fn process_job(
    attempt: FailedAttempt,
    camera: &dyn EvidenceCamera,
    location: &dyn LocationProvider,
    sink: &dyn IntruderSink,
    evidence_dir: &Path,
) -> CaptureReport {
    let evidence = capture_evidence(&attempt, camera, evidence_dir);
    if let Err(e) = &evidence {
        log::warn!("Evidence capture for {} failed: {e}", attempt.target);
    }

    let fix = panic::catch_unwind(AssertUnwindSafe(|| location.current_fix()))
        .unwrap_or_else(|_| {
            log::warn!("Location provider panicked, recording without a fix");
            None
        });

    let mut event = IntruderEvent::new(attempt.at_ms, &attempt.target, attempt.method);
    event.evidence_path = evidence
        .as_ref()
        .ok()
        .map(|p| p.to_string_lossy().into_owned());
    event.location = fix;

    let event_id = match panic::catch_unwind(AssertUnwindSafe(|| sink.record(&mut event))) {
        Ok(Ok(id)) => Some(id),
        Ok(Err(e)) => {
            log::error!("Failed to record intruder event for {}: {e}", attempt.target);
            None
        }
        Err(_) => {
            log::error!("Intruder sink panicked for {}", attempt.target);
            None
        }
    };

    CaptureReport {
        attempt,
        evidence,
        event_id,
    }
}

fn capture_evidence(
    attempt: &FailedAttempt,
    camera: &dyn EvidenceCamera,
    evidence_dir: &Path,
) -> Result<PathBuf, CaptureError> {
    std::fs::create_dir_all(evidence_dir)?;
    let dest = evidence_file_path(evidence_dir, attempt.at_ms);

    panic::catch_unwind(AssertUnwindSafe(|| camera.capture(&dest, &attempt.target)))
        .map_err(|_| CaptureError::Panicked)??;

    Ok(dest)
}

/// `<dir>/intruder_<unix_millis>.jpg`
pub fn evidence_file_path(evidence_dir: &Path, at_ms: i64) -> PathBuf {
    evidence_dir.join(format!("intruder_{at_ms}.jpg"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::UnlockMethod;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::tempdir;

    pub struct FileCamera;

    impl EvidenceCamera for FileCamera {
        fn capture(&self, dest: &Path, _target: &str) -> Result<(), CaptureError> {
            std::fs::write(dest, b"jpeg")?;
            Ok(())
        }
    }

    pub struct BrokenCamera;

    impl EvidenceCamera for BrokenCamera {
        fn capture(&self, _dest: &Path, _target: &str) -> Result<(), CaptureError> {
            Err(CaptureError::CameraUnavailable("front camera busy".into()))
        }
    }

    pub struct PanickingCamera;

    impl EvidenceCamera for PanickingCamera {
        fn capture(&self, _dest: &Path, _target: &str) -> Result<(), CaptureError> {
            panic!("camera binding failed");
        }
    }

    struct FixedLocation(GeoPoint);

    impl LocationProvider for FixedLocation {
        fn current_fix(&self) -> Option<GeoPoint> {
            Some(self.0)
        }
    }

    #[derive(Default)]
    pub struct MemorySink {
        pub events: Mutex<Vec<IntruderEvent>>,
    }

    impl IntruderSink for MemorySink {
        fn record(&self, event: &mut IntruderEvent) -> AppResult<i64> {
            let mut events = self.events.lock().unwrap();
            let id = i64::try_from(events.len()).unwrap() + 1;
            event.id = Some(id);
            events.push(event.clone());
            Ok(id)
        }
    }

    struct PanickingSink;

    impl IntruderSink for PanickingSink {
        fn record(&self, _event: &mut IntruderEvent) -> AppResult<i64> {
            panic!("database handle gone");
        }
    }

    fn attempt(at_ms: i64) -> FailedAttempt {
        FailedAttempt {
            target: "com.instagram.android".to_string(),
            method: UnlockMethod::Pin,
            at_ms,
        }
    }

    #[test]
    fn test_successful_capture_records_evidence() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(MemorySink::default());
        let location = GeoPoint::checked(52.52, 13.405).unwrap();
        let worker = CaptureWorker::spawn(
            Arc::new(FileCamera),
            Arc::new(FixedLocation(location)),
            Arc::clone(&sink) as Arc<dyn IntruderSink>,
            dir.path().join("evidence"),
        )
        .unwrap();

        let (tx, rx) = mpsc::channel();
        worker.submit(attempt(1_700), Some(tx)).unwrap();
        let report = rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let path = report.evidence.unwrap();
        assert_eq!(path, dir.path().join("evidence").join("intruder_1700.jpg"));
        assert!(path.exists());
        assert_eq!(report.event_id, Some(1));

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].location, Some(location));
        assert_eq!(
            events[0].evidence_path.as_deref(),
            Some(path.to_string_lossy().as_ref())
        );
    }

    #[test]
    fn test_failed_capture_still_records_attempt() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(MemorySink::default());
        let worker = CaptureWorker::spawn(
            Arc::new(BrokenCamera),
            Arc::new(NoLocation),
            Arc::clone(&sink) as Arc<dyn IntruderSink>,
            dir.path().to_path_buf(),
        )
        .unwrap();

        let (tx, rx) = mpsc::channel();
        worker.submit(attempt(5), Some(tx)).unwrap();
        let report = rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert!(matches!(report.evidence, Err(CaptureError::CameraUnavailable(_))));
        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].evidence_path.is_none());
    }

    #[test]
    fn test_panicking_camera_does_not_kill_worker() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(MemorySink::default());
        let worker = CaptureWorker::spawn(
            Arc::new(PanickingCamera),
            Arc::new(NoLocation),
            Arc::clone(&sink) as Arc<dyn IntruderSink>,
            dir.path().to_path_buf(),
        )
        .unwrap();

        let (tx, rx) = mpsc::channel();
        worker.submit(attempt(1), Some(tx.clone())).unwrap();
        worker.submit(attempt(2), Some(tx)).unwrap();

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(first.evidence, Err(CaptureError::Panicked)));
        assert!(matches!(second.evidence, Err(CaptureError::Panicked)));
        assert_eq!(sink.events.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_panicking_sink_does_not_kill_worker() {
        let dir = tempdir().unwrap();
        let worker = CaptureWorker::spawn(
            Arc::new(FileCamera),
            Arc::new(NoLocation),
            Arc::new(PanickingSink),
            dir.path().to_path_buf(),
        )
        .unwrap();

        let (tx, rx) = mpsc::channel();
        worker.submit(attempt(1), Some(tx.clone())).unwrap();
        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(first.evidence.is_ok());
        assert_eq!(first.event_id, None);

        worker.submit(attempt(2), Some(tx)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(second.attempt.at_ms, 2);
        assert_eq!(second.event_id, None);
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let dir = tempdir().unwrap();
        let mut worker = CaptureWorker::spawn(
            Arc::new(FileCamera),
            Arc::new(NoLocation),
            Arc::new(MemorySink::default()),
            dir.path().to_path_buf(),
        )
        .unwrap();

        assert!(worker.is_running());
        worker.shutdown();
        assert!(!worker.is_running());
        assert!(matches!(
            worker.submit(attempt(1), None),
            Err(CaptureError::WorkerStopped)
        ));
    }

    #[test]
    fn test_evidence_file_path() {
        let path = evidence_file_path(Path::new("/data/evidence"), 1_234);
        assert_eq!(path, PathBuf::from("/data/evidence/intruder_1234.jpg"));
    }
}
