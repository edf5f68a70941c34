//! Detector sidecar invocation.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use super::feed::FrameFeed;
use super::types::FrameReport;
use crate::config::{CameraConfig, DetectionConfig};

/// Longest image side the sidecar resizes bot photos to.
const IMAGE_MAX_SIZE: u32 = 1280;

#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("DETECTOR_COMMAND is empty")]
    EmptyCommand,

    #[error("Failed to start detector '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Detector I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Detector exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Failed to parse detector output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Detector produced no output")]
    NoOutput,
}

/// Runs object detection on a single image.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect_image(&self, image: &Path) -> Result<FrameReport, DetectorError>;
}

/// Detector backed by the external sidecar process.
#[derive(Debug, Clone)]
pub struct CommandDetector {
    program: String,
    base_args: Vec<String>,
    model: String,
    confidence: f64,
    custom_model: bool,
}

impl CommandDetector {
    /// Builds a detector from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured command is empty.
    pub fn from_config(config: &DetectionConfig) -> Result<Self, DetectorError> {
        let (program, base_args) = config
            .detector_command
            .split_first()
            .ok_or(DetectorError::EmptyCommand)?;

        let custom_model = config.custom_model().is_some();
        let model = config.effective_model();

        if custom_model {
            info!("Using trained violation model: {}", model);
        } else {
            if let Some(path) = &config.model_path {
                warn!("Model {} not found, falling back to {}", path.display(), model);
            }
            info!("Using generic model {} with heuristics", model);
        }

        Ok(Self {
            program: program.clone(),
            base_args: base_args.to_vec(),
            model,
            confidence: config.confidence_threshold,
            custom_model,
        })
    }

    #[must_use]
    pub const fn is_custom_model(&self) -> bool {
        self.custom_model
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Arguments for single-image mode.
    #[must_use]
    pub fn image_args(&self, image: &Path) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.extend([
            "--image".to_owned(),
            image.display().to_string(),
            "--max-size".to_owned(),
            IMAGE_MAX_SIZE.to_string(),
        ]);
        self.push_model_args(&mut args);
        args
    }

    /// Arguments for camera stream mode.
    #[must_use]
    pub fn stream_args(&self, camera: &CameraConfig) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.extend([
            "--source".to_owned(),
            camera.source.to_string(),
            "--fps".to_owned(),
            camera.frame_rate.to_string(),
            "--width".to_owned(),
            camera.width.to_string(),
            "--height".to_owned(),
            camera.height.to_string(),
        ]);
        self.push_model_args(&mut args);
        args
    }

    fn push_model_args(&self, args: &mut Vec<String>) {
        args.extend([
            "--conf".to_owned(),
            self.confidence.to_string(),
            "--model".to_owned(),
            self.model.clone(),
        ]);
        if self.custom_model {
            args.push("--custom".to_owned());
        }
    }

    fn command(&self, args: &[String]) -> Command {
        let mut command = Command::new(&self.program);
        command.args(args).stdin(Stdio::null()).kill_on_drop(true);
        command
    }

    /// Starts the sidecar in camera stream mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be started.
    pub fn spawn_stream(&self, camera: &CameraConfig) -> Result<DetectorStream, DetectorError> {
        let args = self.stream_args(camera);
        debug!("Starting detector stream: {} {:?}", self.program, args);

        let mut child = self
            .command(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| DetectorError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or(DetectorError::NoOutput)?;
        info!("Detector stream started on camera {}", camera.source);

        Ok(DetectorStream {
            child,
            feed: FrameFeed::new(BufReader::new(stdout)),
        })
    }
}

#[async_trait]
impl Detector for CommandDetector {
    async fn detect_image(&self, image: &Path) -> Result<FrameReport, DetectorError> {
        let args = self.image_args(image);
        debug!("Running detector: {} {:?}", self.program, args);

        let output = self
            .command(&args)
            .output()
            .await
            .map_err(|source| DetectorError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(DetectorError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        parse_image_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Takes the last non-empty stdout line as the report, so sidecar
/// libraries printing banners do not break parsing.
fn parse_image_output(stdout: &str) -> Result<FrameReport, DetectorError> {
    let line = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .ok_or(DetectorError::NoOutput)?;

    Ok(serde_json::from_str(line)?)
}

/// A running sidecar in stream mode.
pub struct DetectorStream {
    child: Child,
    feed: FrameFeed<BufReader<ChildStdout>>,
}

impl DetectorStream {
    pub fn feed(&mut self) -> &mut FrameFeed<BufReader<ChildStdout>> {
        &mut self.feed
    }

    /// Stops the sidecar.
    pub async fn shutdown(mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => debug!("Detector already exited with {}", status),
            _ => {
                if let Err(e) = self.child.kill().await {
                    warn!("Failed to stop detector: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraSource;

    fn detector() -> CommandDetector {
        let config = DetectionConfig {
            confidence_threshold: 0.4,
            ..DetectionConfig::default()
        };
        CommandDetector::from_config(&config).unwrap()
    }

    #[test]
    fn test_image_args() {
        let args = detector().image_args(Path::new("/tmp/photo.jpg"));
        assert_eq!(
            args,
            vec![
                "detector_sidecar.py",
                "--image",
                "/tmp/photo.jpg",
                "--max-size",
                "1280",
                "--conf",
                "0.4",
                "--model",
                "yolov8n.pt",
            ]
        );
    }

    #[test]
    fn test_stream_args() {
        let camera = CameraConfig {
            source: CameraSource::Uri("rtsp://cam/1".to_owned()),
            frame_rate: 15,
            width: 640,
            height: 480,
        };
        let args = detector().stream_args(&camera);
        assert_eq!(&args[1..9], ["--source", "rtsp://cam/1", "--fps", "15", "--width", "640", "--height", "480"]);
        assert!(!args.contains(&"--custom".to_owned()));
    }

    #[test]
    fn test_custom_model_flag() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("best.pt");
        std::fs::write(&model, b"weights").unwrap();

        let config = DetectionConfig {
            model_path: Some(model.clone()),
            ..DetectionConfig::default()
        };
        let detector = CommandDetector::from_config(&config).unwrap();
        assert!(detector.is_custom_model());
        assert_eq!(detector.model(), model.display().to_string());
        assert_eq!(detector.image_args(Path::new("a.jpg")).last().unwrap(), "--custom");
    }

    #[test]
    fn test_empty_command_rejected() {
        let config = DetectionConfig {
            detector_command: Vec::new(),
            ..DetectionConfig::default()
        };
        assert!(matches!(
            CommandDetector::from_config(&config),
            Err(DetectorError::EmptyCommand)
        ));
    }

    #[test]
    fn test_parse_image_output_uses_last_line() {
        let stdout = "Ultralytics YOLOv8\n\n{\"detections\":[{\"class_id\":67,\"confidence\":0.8,\"bbox\":[1,2,3,4]}]}\n";
        let report = parse_image_output(stdout).unwrap();
        assert_eq!(report.detections[0].class_id, 67);

        assert!(matches!(parse_image_output("\n \n"), Err(DetectorError::NoOutput)));
        assert!(matches!(parse_image_output("oops"), Err(DetectorError::Parse(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_command_reports_status() {
        let config = DetectionConfig {
            detector_command: vec!["sh".to_owned(), "-c".to_owned(), "echo boom >&2; exit 3".to_owned()],
            ..DetectionConfig::default()
        };
        let detector = CommandDetector::from_config(&config).unwrap();
        let err = detector.detect_image(Path::new("x.jpg")).await.unwrap_err();
        match err {
            DetectorError::Failed { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stream_reads_reports() {
        let config = DetectionConfig {
            detector_command: vec![
                "sh".to_owned(),
                "-c".to_owned(),
                r#"echo '{"frame":1}'; echo '{"frame":2}'"#.to_owned(),
            ],
            ..DetectionConfig::default()
        };
        let detector = CommandDetector::from_config(&config).unwrap();
        let mut stream = detector.spawn_stream(&CameraConfig::default()).unwrap();

        let first = stream.feed().next_report().await.unwrap().unwrap();
        let second = stream.feed().next_report().await.unwrap().unwrap();
        assert_eq!((first.frame, second.frame), (Some(1), Some(2)));
        assert!(stream.feed().next_report().await.unwrap().is_none());
        stream.shutdown().await;
    }
}
