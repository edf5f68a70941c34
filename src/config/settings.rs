//! Application settings and Telegram configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Length of the secret part of a bot token issued by `BotFather`.
const TOKEN_SECRET_LEN: usize = 35;

/// Telegram bot token in the `<bot_id>:<secret>` form.
///
/// The secret is never printed: `Debug` and [`BotToken::masked`] only show the bot id.
#[derive(Clone, PartialEq, Eq)]
pub struct BotToken(String);

impl BotToken {
    /// Parses and validates a token string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBotToken`] if the format does not match.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        let (id, secret) = raw.split_once(':').ok_or(ConfigError::InvalidBotToken)?;

        let id_ok = !id.is_empty() && id.chars().all(|c| c.is_ascii_digit());
        let secret_ok = secret.chars().count() == TOKEN_SECRET_LEN
            && secret
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

        if id_ok && secret_ok {
            Ok(Self(raw.to_owned()))
        } else {
            Err(ConfigError::InvalidBotToken)
        }
    }

    /// Returns the full token for API calls.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns the numeric bot id part.
    #[must_use]
    pub fn bot_id(&self) -> &str {
        self.0.split_once(':').map_or("", |(id, _)| id)
    }

    /// Returns a log-safe representation.
    #[must_use]
    pub fn masked(&self) -> String {
        format!("{}:***", self.bot_id())
    }
}

impl fmt::Debug for BotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BotToken").field(&self.masked()).finish()
    }
}

/// Telegram alerting configuration.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot token from `BotFather`, if configured.
    pub bot_token: Option<BotToken>,

    /// Chat that receives alerts. Group chats have negative ids.
    pub chat_id: Option<i64>,

    /// Minimum interval between two sends in seconds.
    pub min_send_interval_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            min_send_interval_secs: default_min_send_interval(),
        }
    }
}

fn default_min_send_interval() -> u64 {
    1
}

impl TelegramConfig {
    /// Creates configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    /// Creates configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = non_empty(&lookup, "TELEGRAM_BOT_TOKEN")
            .map(|raw| BotToken::parse(&raw))
            .transpose()?;

        let chat_id = non_empty(&lookup, "TELEGRAM_CHAT_ID")
            .map(|raw| {
                raw.parse::<i64>()
                    .map_err(|_| ConfigError::InvalidChatId(raw.clone()))
            })
            .transpose()?;

        Ok(Self {
            bot_token,
            chat_id,
            min_send_interval_secs: parse_var(
                &lookup,
                "NOTIFY_MIN_INTERVAL_SECS",
                default_min_send_interval(),
            )?,
        })
    }

    /// Returns the token and chat id when both are configured.
    #[must_use]
    pub fn credentials(&self) -> Option<(&BotToken, i64)> {
        Some((self.bot_token.as_ref()?, self.chat_id?))
    }

    /// Checks whether alerts can be delivered.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }

    /// Returns the token or an error naming the missing variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] when no token is set.
    pub fn require_token(&self) -> Result<&BotToken, ConfigError> {
        self.bot_token
            .as_ref()
            .ok_or(ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN"))
    }
}

/// Where frames come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraSource {
    /// Local capture device index.
    Device(u32),
    /// Stream URI or video file path.
    Uri(String),
}

impl CameraSource {
    /// Interprets an all-digit value as a device index, anything else as a URI.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if !raw.is_empty()
            && raw.chars().all(|c| c.is_ascii_digit())
            && let Ok(index) = raw.parse()
        {
            return Self::Device(index);
        }
        Self::Uri(raw.to_owned())
    }
}

impl fmt::Display for CameraSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(index) => write!(f, "{index}"),
            Self::Uri(uri) => f.write_str(uri),
        }
    }
}

/// Camera capture parameters handed to the detector sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraConfig {
    pub source: CameraSource,
    pub frame_rate: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: CameraSource::Device(0),
            frame_rate: 30,
            width: 1920,
            height: 1080,
        }
    }
}

/// Detection and model parameters.
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Minimum detection confidence in `[0, 1]`.
    pub confidence_threshold: f64,

    /// Minimum seconds between two analyses of the camera feed.
    pub interval_secs: u64,

    /// Path to a trained violation model.
    pub model_path: Option<PathBuf>,

    /// Generic COCO model used when no trained model exists.
    pub fallback_model: String,

    /// Class names by id overriding whatever the model reports.
    pub class_names: Vec<String>,

    /// Sidecar program followed by its leading arguments.
    pub detector_command: Vec<String>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            interval_secs: 5,
            model_path: None,
            fallback_model: default_fallback_model(),
            class_names: Vec::new(),
            detector_command: default_detector_command(),
        }
    }
}

fn default_fallback_model() -> String {
    "yolov8n.pt".to_owned()
}

fn default_detector_command() -> Vec<String> {
    vec!["python3".to_owned(), "detector_sidecar.py".to_owned()]
}

impl DetectionConfig {
    /// Returns the trained model path if the file exists.
    #[must_use]
    pub fn custom_model(&self) -> Option<&Path> {
        self.model_path.as_deref().filter(|path| path.exists())
    }

    /// Returns the model the sidecar should load.
    #[must_use]
    pub fn effective_model(&self) -> String {
        self.custom_model().map_or_else(
            || self.fallback_model.clone(),
            |path| path.display().to_string(),
        )
    }

    /// Returns the detection interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Everything the monitor and the photo bot need besides Telegram credentials.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub camera: CameraConfig,
    pub detection: DetectionConfig,

    /// Knowledge base with articles and fines.
    pub ontology_path: PathBuf,

    /// Where violation evidence is stored.
    pub evidence_dir: PathBuf,

    /// Where the bot keeps downloaded photos while analysing them.
    pub temp_dir: PathBuf,

    /// Location shown in alerts.
    pub location: String,
}

fn default_ontology_path() -> PathBuf {
    PathBuf::from("violations_ontology.ttl")
}

fn default_location() -> String {
    "Демонстрационная камера".to_owned()
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            detection: DetectionConfig::default(),
            ontology_path: default_ontology_path(),
            evidence_dir: PathBuf::from("violations_evidence"),
            temp_dir: PathBuf::from("temp_images"),
            location: default_location(),
        }
    }
}

impl MonitorSettings {
    /// Creates settings from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    /// Creates settings from an arbitrary key lookup with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let camera = CameraConfig {
            source: non_empty(&lookup, "CAMERA_SOURCE")
                .map_or(defaults.camera.source, |raw| CameraSource::parse(&raw)),
            frame_rate: positive_var(&lookup, "FRAME_RATE", defaults.camera.frame_rate)?,
            width: positive_var(&lookup, "RESOLUTION_WIDTH", defaults.camera.width)?,
            height: positive_var(&lookup, "RESOLUTION_HEIGHT", defaults.camera.height)?,
        };

        let confidence_threshold = parse_var(
            &lookup,
            "CONFIDENCE_THRESHOLD",
            defaults.detection.confidence_threshold,
        )?;
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "CONFIDENCE_THRESHOLD",
                value: confidence_threshold.to_string(),
                reason: "must be between 0 and 1",
            });
        }

        let class_names = non_empty(&lookup, "YOLO_CLASS_NAMES")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        let detector_command = match non_empty(&lookup, "DETECTOR_COMMAND") {
            Some(raw) => raw.split_whitespace().map(str::to_owned).collect(),
            None => defaults.detection.detector_command,
        };

        let detection = DetectionConfig {
            confidence_threshold,
            interval_secs: parse_var(&lookup, "DETECTION_INTERVAL", defaults.detection.interval_secs)?,
            model_path: non_empty(&lookup, "YOLO_MODEL_PATH").map(PathBuf::from),
            fallback_model: non_empty(&lookup, "YOLO_FALLBACK_MODEL")
                .unwrap_or(defaults.detection.fallback_model),
            class_names,
            detector_command,
        };

        Ok(Self {
            camera,
            detection,
            ontology_path: non_empty(&lookup, "ONTOLOGY_PATH")
                .map_or(defaults.ontology_path, PathBuf::from),
            evidence_dir: non_empty(&lookup, "EVIDENCE_DIR")
                .map_or(defaults.evidence_dir, PathBuf::from),
            temp_dir: non_empty(&lookup, "TEMP_DIR").map_or(defaults.temp_dir, PathBuf::from),
            location: non_empty(&lookup, "CAMERA_LOCATION").unwrap_or(defaults.location),
        })
    }
}

/// Reads a variable from the process environment.
fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Returns a trimmed value, treating blank values as unset.
fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_var<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match non_empty(lookup, key) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw,
            reason: "not a valid number",
        }),
        None => Ok(default),
    }
}

fn positive_var<F>(lookup: &F, key: &'static str, default: u32) -> Result<u32, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_var(lookup, key, default)?;
    if value == 0 {
        Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: "must be greater than 0",
        })
    } else {
        Ok(value)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid bot token format (expected <digits>:<35 characters>)")]
    InvalidBotToken,

    #[error("Invalid chat id '{0}' (must be an integer)")]
    InvalidChatId(String),

    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const TOKEN: &str = "123456789:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsawQ";

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_settings() {
        let settings = MonitorSettings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.camera.source, CameraSource::Device(0));
        assert_eq!(settings.camera.frame_rate, 30);
        assert_eq!(settings.camera.width, 1920);
        assert_eq!(settings.camera.height, 1080);
        assert!((settings.detection.confidence_threshold - 0.5).abs() < f64::EPSILON);
        assert_eq!(settings.detection.interval_secs, 5);
        assert_eq!(settings.detection.fallback_model, "yolov8n.pt");
        assert_eq!(settings.ontology_path, PathBuf::from("violations_ontology.ttl"));
    }

    #[test]
    fn test_settings_from_values() {
        let settings = MonitorSettings::from_lookup(lookup(&[
            ("CAMERA_SOURCE", "rtsp://cam.local/stream"),
            ("FRAME_RATE", "15"),
            ("CONFIDENCE_THRESHOLD", "0.35"),
            ("DETECTION_INTERVAL", "10"),
            ("YOLO_CLASS_NAMES", "graffiti, littering,,smoking"),
            ("DETECTOR_COMMAND", "python3 sidecar.py --device cuda"),
        ]))
        .unwrap();

        assert_eq!(
            settings.camera.source,
            CameraSource::Uri("rtsp://cam.local/stream".to_owned())
        );
        assert_eq!(settings.camera.frame_rate, 15);
        assert_eq!(settings.detection.interval_secs, 10);
        assert_eq!(
            settings.detection.class_names,
            vec!["graffiti", "littering", "smoking"]
        );
        assert_eq!(settings.detection.detector_command.len(), 4);
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let settings =
            MonitorSettings::from_lookup(lookup(&[("FRAME_RATE", "  "), ("CAMERA_SOURCE", "")]))
                .unwrap();
        assert_eq!(settings.camera.frame_rate, 30);
        assert_eq!(settings.camera.source, CameraSource::Device(0));
    }

    #[test]
    fn test_invalid_number_rejected() {
        let err = MonitorSettings::from_lookup(lookup(&[("FRAME_RATE", "fast")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "FRAME_RATE", .. }));
    }

    #[test]
    fn test_zero_resolution_rejected() {
        let err = MonitorSettings::from_lookup(lookup(&[("RESOLUTION_WIDTH", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "RESOLUTION_WIDTH", .. }));
    }

    #[test]
    fn test_threshold_out_of_range() {
        let err =
            MonitorSettings::from_lookup(lookup(&[("CONFIDENCE_THRESHOLD", "1.5")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "CONFIDENCE_THRESHOLD", .. }));
    }

    #[test]
    fn test_camera_source_parse() {
        assert_eq!(CameraSource::parse("2"), CameraSource::Device(2));
        assert_eq!(
            CameraSource::parse("video.mp4"),
            CameraSource::Uri("video.mp4".to_owned())
        );
    }

    #[test]
    fn test_bot_token_valid() {
        let token = BotToken::parse(TOKEN).unwrap();
        assert_eq!(token.bot_id(), "123456789");
        assert_eq!(token.masked(), "123456789:***");
        assert!(!format!("{token:?}").contains("AAHdq"));
    }

    #[test]
    fn test_bot_token_invalid() {
        assert!(BotToken::parse("no-colon").is_err());
        assert!(BotToken::parse("abc:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsawQ").is_err());
        assert!(BotToken::parse("123:short").is_err());
        assert!(BotToken::parse("123:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw!").is_err());
    }

    #[test]
    fn test_telegram_config_from_values() {
        let config = TelegramConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", TOKEN),
            ("TELEGRAM_CHAT_ID", "-1001234567890"),
        ]))
        .unwrap();
        assert!(config.is_configured());
        assert_eq!(config.chat_id, Some(-1_001_234_567_890));
    }

    #[test]
    fn test_telegram_config_partial_is_not_configured() {
        let config = TelegramConfig::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", TOKEN)])).unwrap();
        assert!(!config.is_configured());
        assert!(config.require_token().is_ok());

        let empty = TelegramConfig::from_lookup(lookup(&[])).unwrap();
        assert!(matches!(
            empty.require_token(),
            Err(ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN"))
        ));
    }

    #[test]
    fn test_telegram_config_bad_chat_id() {
        let err = TelegramConfig::from_lookup(lookup(&[("TELEGRAM_CHAT_ID", "my-chat")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidChatId(_)));
    }

    #[test]
    fn test_custom_model_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("best.pt");

        let mut detection = DetectionConfig {
            model_path: Some(model.clone()),
            ..DetectionConfig::default()
        };
        assert!(detection.custom_model().is_none());
        assert_eq!(detection.effective_model(), "yolov8n.pt");

        std::fs::write(&model, b"weights").unwrap();
        assert_eq!(detection.custom_model(), Some(model.as_path()));

        detection.model_path = None;
        assert!(detection.custom_model().is_none());
    }
}
