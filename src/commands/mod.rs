//! Photo-analysis bot.
//!
//! Answers `/start` and `/help`, and replies to photos with the violations
//! found on them.

mod handler;
mod report;
mod types;

pub use handler::{PhotoAnalyzer, PhotoBot, PhotoError};
pub use report::{AnalysisReport, NO_VIOLATIONS_TEXT};
pub use types::{BotCommand, DownloadStage, HELP_TEXT, USER_UPLOAD_LOCATION, WELCOME_TEXT};
