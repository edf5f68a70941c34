//! Configuration module for the violation monitor.
//!
//! Settings come from a `.env` file and the process environment.
//! The setup wizard edits the same file through [`EnvFile`].

mod env_file;
mod settings;

pub use env_file::EnvFile;
pub use settings::{
    BotToken, CameraConfig, CameraSource, ConfigError, DetectionConfig, MonitorSettings,
    TelegramConfig,
};
