//! Photo-analysis bot.
//!
//! Users send photos; each photo is downloaded, run through the detector and
//! the violation analyzer, and the progress message is edited into a report.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::net::Download;
use teloxide::payloads::{EditMessageTextSetters, SendMessageSetters};
use teloxide::prelude::*;
use teloxide::types::{FileId, MessageId, ParseMode};
use teloxide::update_listeners::Polling;
use teloxide::{DownloadError, RequestError, dptree};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use super::report::AnalysisReport;
use super::types::{
    ANALYZING_TEXT, BotCommand, DETECTING_TEXT, DOWNLOADED_TEXT, DownloadStage, NETWORK_TEXT,
    TIMEOUT_TEXT, USER_UPLOAD_LOCATION, error_text, retry_text,
};
use crate::config::BotToken;
use crate::detection::{Detector, DetectorError, ViolationAnalyzer};
use crate::ontology::{Ontology, OntologyError};

const DOWNLOAD_RETRIES: RetryPolicy = RetryPolicy {
    attempts: 3,
    delay: Duration::from_secs(2),
};
const GET_FILE_TIMEOUT: Duration = Duration::from_secs(30);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);
const DETECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors while handling one photo.
#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Telegram error: {0}")]
    Telegram(String),

    #[error("Message has no photo")]
    NoPhoto,

    #[error(transparent)]
    Detector(#[from] DetectorError),

    #[error(transparent)]
    Ontology(#[from] OntologyError),

    #[error("File error: {0}")]
    Io(#[from] std::io::Error),
}

impl PhotoError {
    const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Network(_))
    }

    /// Reply text and whether it is HTML.
    fn user_text(&self) -> (String, bool) {
        match self {
            Self::Timeout(_) => (TIMEOUT_TEXT.to_owned(), true),
            Self::Network(_) => (NETWORK_TEXT.to_owned(), true),
            other => (error_text(other), false),
        }
    }
}

impl From<RequestError> for PhotoError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Network(e) if e.is_timeout() => Self::Timeout("Telegram request"),
            RequestError::Network(e) => Self::Network(e.to_string()),
            other => Self::Telegram(other.to_string()),
        }
    }
}

impl From<DownloadError> for PhotoError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::Network(e) if e.is_timeout() => Self::Timeout("Photo download"),
            DownloadError::Network(e) => Self::Network(e.to_string()),
            other => Self::Telegram(other.to_string()),
        }
    }
}

/// Runs detection and builds a report for one image file.
pub struct PhotoAnalyzer {
    detector: Arc<dyn Detector>,
    analyzer: ViolationAnalyzer,
    ontology: Arc<Ontology>,
    timeout: Duration,
}

impl PhotoAnalyzer {
    /// Each photo is analysed with a fresh copy of `analyzer`, so unrelated
    /// photos never share detection history.
    #[must_use]
    pub fn new(detector: Arc<dyn Detector>, analyzer: ViolationAnalyzer, ontology: Arc<Ontology>) -> Self {
        Self {
            detector,
            analyzer,
            ontology,
            timeout: DETECTION_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Analyses an image file.
    ///
    /// # Errors
    ///
    /// Returns an error if detection fails or times out.
    pub async fn analyze(&self, image: &Path) -> Result<AnalysisReport, PhotoError> {
        let report = tokio::time::timeout(self.timeout, self.detector.detect_image(image))
            .await
            .map_err(|_| PhotoError::Timeout("Detection"))??;

        let mut analyzer = self.analyzer.clone();
        let analysis = analyzer.analyze(&report.detections);
        info!(
            "Photo {}: {} detections, {} violation candidates",
            image.display(),
            analysis.detections.len(),
            analysis.candidates.len()
        );

        Ok(AnalysisReport::build(
            &analysis.candidates,
            &self.ontology,
            USER_UPLOAD_LOCATION,
        )?)
    }
}

/// Shared state of the dispatcher.
struct BotContext {
    analyzer: PhotoAnalyzer,
    temp_dir: PathBuf,
}

/// Telegram bot answering photos with violation reports.
pub struct PhotoBot {
    bot: Bot,
    context: Arc<BotContext>,
}

impl PhotoBot {
    #[must_use]
    pub fn new(token: &BotToken, analyzer: PhotoAnalyzer, temp_dir: PathBuf) -> Self {
        Self {
            bot: Bot::new(token.expose()),
            context: Arc::new(BotContext { analyzer, temp_dir }),
        }
    }

    /// Polls for updates until Ctrl+C. Updates sent while the bot was down are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the temp directory cannot be created or the token is rejected.
    pub async fn run(self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.context.temp_dir).await?;

        let me = self.bot.get_me().await?;
        info!(
            "Bot @{} started, send it /start",
            me.user.username.as_deref().unwrap_or("unknown")
        );

        let handler = Update::filter_message()
            .branch(
                dptree::filter_map(|msg: Message| msg.text().and_then(BotCommand::parse))
                    .endpoint(handle_command),
            )
            .branch(dptree::filter(|msg: Message| msg.photo().is_some()).endpoint(handle_photo));

        let listener = Polling::builder(self.bot.clone())
            .drop_pending_updates()
            .build();

        Dispatcher::builder(self.bot, handler)
            .dependencies(dptree::deps![self.context])
            .enable_ctrlc_handler()
            .build()
            .dispatch_with_listener(
                listener,
                LoggingErrorHandler::with_custom_text("Failed to fetch updates"),
            )
            .await;

        info!("Bot stopped");
        Ok(())
    }
}

async fn handle_command(bot: Bot, msg: Message, command: BotCommand) -> ResponseResult<()> {
    debug!("Command {} from chat {}", command, msg.chat.id.0);

    let sent = bot
        .send_message(msg.chat.id, command.reply())
        .parse_mode(ParseMode::Html)
        .await;

    if let Err(e) = sent {
        warn!("Failed to send {} reply: {}", command, e);
        if let Err(e) = bot.send_message(msg.chat.id, command.fallback_reply()).await {
            error!("Failed to send plain {} reply: {}", command, e);
        }
    }
    Ok(())
}

async fn handle_photo(bot: Bot, msg: Message, context: Arc<BotContext>) -> ResponseResult<()> {
    info!("Photo received from chat {}", msg.chat.id.0);

    let progress = match bot.send_message(msg.chat.id, ANALYZING_TEXT).await {
        Ok(sent) => Progress::new(&bot, msg.chat.id, sent.id),
        Err(e) => {
            error!("Failed to acknowledge photo: {}", e);
            return Ok(());
        }
    };

    let target = context
        .temp_dir
        .join(format!("{}_{}.jpg", msg.chat.id.0, msg.id.0));

    let result = process_photo(&bot, &msg, &context.analyzer, &progress, &target).await;

    if let Err(e) = tokio::fs::remove_file(&target).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!("Failed to remove {}: {}", target.display(), e);
    }

    match result {
        Ok(report) => progress.finish(&report.render(), false).await,
        Err(e) => {
            error!("Photo processing failed: {}", e);
            let (text, html) = e.user_text();
            progress.finish(&text, html).await;
        }
    }
    Ok(())
}

async fn process_photo(
    bot: &Bot,
    msg: &Message,
    analyzer: &PhotoAnalyzer,
    progress: &Progress<'_>,
    target: &Path,
) -> Result<AnalysisReport, PhotoError> {
    let sizes = msg.photo().ok_or(PhotoError::NoPhoto)?;
    let photo = pick_photo_size(sizes).ok_or(PhotoError::NoPhoto)?;
    debug!("Using {}x{} photo size", photo.width, photo.height);

    let file_id: &FileId = &photo.file.id;
    let file = with_retries(
        progress,
        DownloadStage::GetFile,
        GET_FILE_TIMEOUT,
        DOWNLOAD_RETRIES,
        || async move {
            Ok::<_, PhotoError>(bot.get_file(file_id.clone()).await?)
        },
    )
    .await?;

    let file_path = file.path.as_str();
    with_retries(
        progress,
        DownloadStage::Download,
        DOWNLOAD_TIMEOUT,
        DOWNLOAD_RETRIES,
        || async move {
            let mut destination = tokio::fs::File::create(target).await?;
            bot.download_file(file_path, &mut destination).await?;
            destination.flush().await?;
            Ok::<_, PhotoError>(())
        },
    )
    .await?;

    progress.update(DOWNLOADED_TEXT).await;
    progress.update(DETECTING_TEXT).await;

    analyzer.analyze(target).await
}

/// Picks the second-largest size, or the only one.
fn pick_photo_size<T>(sizes: &[T]) -> Option<&T> {
    match sizes.len() {
        0 => None,
        1 => sizes.first(),
        n => sizes.get(n - 2),
    }
}

/// How often and how far apart a network step is retried.
#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

/// Where retry notices are shown.
#[async_trait]
trait StatusLine: Sync {
    async fn show(&self, text: &str);
}

/// Runs a network step with a timeout, retrying timeouts and network errors.
async fn with_retries<T, F, Fut>(
    status: &impl StatusLine,
    stage: DownloadStage,
    limit: Duration,
    policy: RetryPolicy,
    mut op: F,
) -> Result<T, PhotoError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PhotoError>>,
{
    let mut attempt = 1;
    loop {
        let result = tokio::time::timeout(limit, op())
            .await
            .unwrap_or(Err(PhotoError::Timeout(stage.label())));

        match result {
            Err(e) if e.is_retryable() && attempt < policy.attempts => {
                warn!("{} attempt {} failed: {}", stage.label(), attempt, e);
                status.show(&retry_text(stage, attempt, policy.attempts)).await;
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// The "analysing" message that is edited as work progresses.
struct Progress<'a> {
    bot: &'a Bot,
    chat_id: ChatId,
    message_id: MessageId,
}

impl<'a> Progress<'a> {
    const fn new(bot: &'a Bot, chat_id: ChatId, message_id: MessageId) -> Self {
        Self {
            bot,
            chat_id,
            message_id,
        }
    }

    async fn edit(&self, text: &str, html: bool) -> Result<(), RequestError> {
        let request = self.bot.edit_message_text(self.chat_id, self.message_id, text);
        if html {
            request.parse_mode(ParseMode::Html).await?;
        } else {
            request.await?;
        }
        Ok(())
    }

    /// Best-effort status update.
    async fn update(&self, text: &str) {
        if let Err(e) = self.edit(text, false).await {
            debug!("Failed to update progress message: {}", e);
        }
    }

    /// Shows the final text, sending a new message if editing fails.
    async fn finish(&self, text: &str, html: bool) {
        let Err(e) = self.edit(text, html).await else {
            return;
        };
        warn!("Failed to edit result message: {}", e);

        let mut request = self.bot.send_message(self.chat_id, text);
        if html {
            request = request.parse_mode(ParseMode::Html);
        }
        if let Err(e) = request.await {
            error!("Failed to send result: {}", e);
        }
    }
}

#[async_trait]
impl<'a> StatusLine for Progress<'a> {
    async fn show(&self, text: &str) {
        self.update(text).await;
    }
}
