//! Camera monitoring loop.
//!
//! Every frame report from the detector is counted. Once the detection
//! interval has passed since the last violation, the frame is analysed and
//! each violation found is stored as evidence, classified and sent out.
//! A quiet camera is therefore analysed on every frame until something is
//! found, after which the interval applies again.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use thiserror::Error;
use tokio::io::AsyncBufRead;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use super::evidence::{EvidenceError, EvidenceStore};
use super::state::{MonitorState, MonitorSummary};
use crate::detection::{FeedError, FrameFeed, FrameReport, ViolationAnalyzer, ViolationCandidate, ViolationType};
use crate::ontology::{FineContext, Ontology, OntologyError, Violation};
use crate::telegram::Notifier;

/// Control messages for a running monitor.
#[derive(Debug, Clone)]
pub enum MonitorMessage {
    /// Stop after the current frame.
    Shutdown,
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Evidence(#[from] EvidenceError),

    #[error(transparent)]
    Ontology(#[from] OntologyError),

    #[error("Monitor task failed: {0}")]
    Task(#[from] JoinError),
}

/// Waits for a spawned monitor, sending it `Shutdown` once `stop` resolves.
///
/// # Errors
///
/// Returns the monitor's own error, or [`MonitorError::Task`] if the task panicked.
pub async fn supervise<S>(
    mut handle: JoinHandle<Result<MonitorSummary, MonitorError>>,
    tx: mpsc::Sender<MonitorMessage>,
    stop: S,
) -> Result<MonitorSummary, MonitorError>
where
    S: Future,
{
    tokio::select! {
        result = &mut handle => return result?,
        _ = stop => info!("Stop requested, shutting down..."),
    }

    if tx.send(MonitorMessage::Shutdown).await.is_err() {
        debug!("Monitor already stopped");
    }
    handle.await?
}

/// Watches a detector feed for violations.
pub struct CameraMonitor {
    analyzer: ViolationAnalyzer,
    ontology: Arc<Ontology>,
    evidence: EvidenceStore,
    notifier: Option<Arc<dyn Notifier>>,
    location: String,
    state: MonitorState,
}

impl CameraMonitor {
    #[must_use]
    pub fn new(
        analyzer: ViolationAnalyzer,
        ontology: Arc<Ontology>,
        evidence: EvidenceStore,
        notifier: Option<Arc<dyn Notifier>>,
        location: String,
        interval: Duration,
    ) -> Self {
        Self {
            analyzer,
            ontology,
            evidence,
            notifier,
            location,
            state: MonitorState::new(interval, Instant::now()),
        }
    }

    /// Processes reports until the feed ends or a shutdown message arrives.
    ///
    /// # Errors
    ///
    /// Returns an error only if reading the feed fails. Problems with single
    /// violations are logged and skipped.
    pub async fn run<R>(
        &mut self,
        feed: &mut FrameFeed<R>,
        mut rx: mpsc::Receiver<MonitorMessage>,
    ) -> Result<MonitorSummary, MonitorError>
    where
        R: AsyncBufRead + Unpin,
    {
        info!("Monitoring started at {}", self.location);

        loop {
            tokio::select! {
                report = feed.next_report() => {
                    match report? {
                        Some(report) => self.handle_report(report).await,
                        None => {
                            info!("Detector feed ended");
                            break;
                        }
                    }
                }
                msg = rx.recv() => {
                    match msg {
                        Some(MonitorMessage::Shutdown) | None => {
                            info!("Monitor shutting down");
                            break;
                        }
                    }
                }
            }
        }

        let summary = self.state.summary();
        info!("Monitoring stopped: {}", summary);
        Ok(summary)
    }

    async fn handle_report(&mut self, report: FrameReport) {
        let frame_count = self.state.record_frame();
        let now = Instant::now();
        if !self.state.is_detection_due(now) {
            return;
        }

        let analysis = self.analyzer.analyze(&report.detections);
        debug!(
            "Frame {}: {} detections, {} violations",
            frame_count,
            analysis.detections.len(),
            analysis.candidates.len()
        );

        let found: Vec<ViolationType> = analysis.candidates.iter().map(|c| c.kind).collect();
        self.state.record_analysis(now, &found);

        let frame = report.frame.unwrap_or(frame_count);
        for candidate in &analysis.candidates {
            if let Err(e) = self.process_violation(candidate, frame, &report).await {
                error!("Failed to process {} violation: {}", candidate.kind, e);
            }
        }
    }

    async fn process_violation(
        &self,
        candidate: &ViolationCandidate,
        frame: u64,
        report: &FrameReport,
    ) -> Result<Violation, MonitorError> {
        warn!(
            "Violation detected: {} ({:.1}%) at {}",
            candidate.kind.label(),
            candidate.confidence * 100.0,
            candidate.bbox
        );

        let saved = self
            .evidence
            .save(candidate, Some(frame), report.image.as_deref(), Local::now())
            .await?;

        let mut violation = self.ontology.classify(
            candidate.kind.as_str(),
            Some(&self.location),
            &FineContext::with_confidence(candidate.confidence),
        )?;
        violation.evidence_image_path.clone_from(&saved.image);

        match &self.notifier {
            Some(notifier) => {
                if let Err(e) = notifier
                    .notify_violation(&violation, saved.image.as_deref())
                    .await
                {
                    error!("Failed to send alert: {}", e);
                }
            }
            None => debug!("Telegram alerts disabled, not sending {}", violation.violation_type),
        }

        Ok(violation)
    }
}

impl std::fmt::Debug for CameraMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraMonitor")
            .field("location", &self.location)
            .field("alerts", &self.notifier.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use async_trait::async_trait;
    use tokio::io::BufReader;
    use tokio::sync::Mutex;

    use super::*;
    use crate::telegram::NotifyError;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, Option<PathBuf>)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify_violation(
            &self,
            violation: &Violation,
            image: Option<&Path>,
        ) -> Result<(), NotifyError> {
            self.sent
                .lock()
                .await
                .push((violation.violation_type.clone(), image.map(Path::to_path_buf)));
            Ok(())
        }

        async fn send_test_message(&self) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    const SMOKING_FRAME: &str = r#"{"frame":FRAME,"detections":[{"class_id":0,"confidence":0.9,"bbox":[100,100,300,500]},{"class_id":67,"confidence":0.8,"bbox":[180,150,200,170]}]}"#;

    fn frames(count: u64) -> String {
        (1..=count)
            .map(|n| SMOKING_FRAME.replace("FRAME", &n.to_string()) + "\n")
            .collect()
    }

    async fn monitor(
        dir: &Path,
        interval: Duration,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> CameraMonitor {
        CameraMonitor::new(
            ViolationAnalyzer::new(0.5, false, Vec::new()),
            Arc::new(Ontology::example()),
            EvidenceStore::open(dir).await.unwrap(),
            notifier,
            "Test camera".to_owned(),
            interval,
        )
    }

    #[tokio::test]
    async fn test_every_frame_analysed_without_interval() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let mut monitor = monitor(dir.path(), Duration::ZERO, Some(notifier.clone())).await;

        let input = frames(3);
        let mut feed = FrameFeed::new(BufReader::new(input.as_bytes()));
        let (_tx, rx) = mpsc::channel(1);

        let summary = monitor.run(&mut feed, rx).await.unwrap();
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.analyses, 3);
        assert_eq!(summary.violations[&ViolationType::Smoking], 3);

        let sent = notifier.sent.lock().await;
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].0, "smoking");
        assert!(sent[0].1.is_none());

        let records = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|entry| {
                entry
                    .as_ref()
                    .is_ok_and(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            })
            .count();
        assert_eq!(records, 3);
    }

    #[tokio::test]
    async fn test_interval_skips_early_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = monitor(dir.path(), Duration::from_secs(3600), None).await;

        let input = frames(5);
        let mut feed = FrameFeed::new(BufReader::new(input.as_bytes()));
        let (_tx, rx) = mpsc::channel(1);

        let summary = monitor.run(&mut feed, rx).await.unwrap();
        assert_eq!(summary.frames, 5);
        assert_eq!(summary.analyses, 0);
        assert_eq!(summary.total_violations(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_is_attached_to_alert() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("frame.jpg");
        std::fs::write(&snapshot, b"jpeg").unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let mut monitor = monitor(&dir.path().join("evidence"), Duration::ZERO, Some(notifier.clone())).await;

        let line = format!(
            r#"{{"frame":7,"image":{},"detections":[{{"class_id":0,"confidence":0.9,"bbox":[100,100,300,500]}},{{"class_id":39,"confidence":0.9,"bbox":[150,470,170,510]}}]}}"#,
            serde_json::to_string(&snapshot).unwrap()
        );
        let mut feed = FrameFeed::new(BufReader::new(line.as_bytes()));
        let (_tx, rx) = mpsc::channel(1);

        let summary = monitor.run(&mut feed, rx).await.unwrap();
        assert_eq!(summary.violations[&ViolationType::Littering], 1);

        let sent = notifier.sent.lock().await;
        let image = sent[0].1.as_ref().unwrap();
        assert!(image.starts_with(dir.path().join("evidence")));
        assert_eq!(std::fs::read(image).unwrap(), b"jpeg");
    }

    #[tokio::test]
    async fn test_shutdown_message_stops_monitor() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = monitor(dir.path(), Duration::ZERO, None).await;

        // The writer half stays open, so the feed never ends on its own.
        let (reader, _writer) = tokio::io::duplex(64);
        let mut feed = FrameFeed::new(BufReader::new(reader));
        let (tx, rx) = mpsc::channel(1);
        tx.send(MonitorMessage::Shutdown).await.unwrap();

        let summary = monitor.run(&mut feed, rx).await.unwrap();
        assert_eq!(summary.frames, 0);
    }

    #[tokio::test]
    async fn test_supervise_stops_running_monitor() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = monitor(dir.path(), Duration::ZERO, None).await;

        let (reader, mut writer) = tokio::io::duplex(4096);
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(async move {
            let mut feed = FrameFeed::new(BufReader::new(reader));
            monitor.run(&mut feed, rx).await
        });

        tokio::io::AsyncWriteExt::write_all(&mut writer, frames(2).as_bytes())
            .await
            .unwrap();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let supervisor = tokio::spawn(supervise(handle, tx, stop_rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!supervisor.is_finished());
        stop_tx.send(()).unwrap();

        let summary = supervisor.await.unwrap().unwrap();
        assert_eq!(summary.frames, 2);
        drop(writer);
    }

    #[tokio::test]
    async fn test_supervise_returns_when_feed_ends() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = monitor(dir.path(), Duration::ZERO, None).await;

        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(async move {
            let input = frames(1);
            let mut feed = FrameFeed::new(BufReader::new(input.as_bytes()));
            monitor.run(&mut feed, rx).await
        });

        let summary = supervise(handle, tx, std::future::pending::<()>()).await.unwrap();
        assert_eq!(summary.frames, 1);
    }
}
