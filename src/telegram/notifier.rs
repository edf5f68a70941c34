//! Violation alerts over the Telegram Bot API.

use std::future::Future;
use std::path::Path;

use async_trait::async_trait;
use teloxide::RequestError;
use teloxide::payloads::{SendMessageSetters, SendPhotoSetters};
use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode};
use thiserror::Error;
use tracing::{debug, info};

use super::format::{TEST_MESSAGE, violation_message};
use super::rate_limiter::RateLimiter;
use crate::config::TelegramConfig;
use crate::ontology::Violation;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Telegram request failed: {0}")]
    Request(#[from] RequestError),
}

/// Delivers alerts to a chat.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends a violation alert, with the evidence photo when one exists.
    async fn notify_violation(
        &self,
        violation: &Violation,
        image: Option<&Path>,
    ) -> Result<(), NotifyError>;

    /// Sends the setup confirmation message.
    async fn send_test_message(&self) -> Result<(), NotifyError>;
}

/// Teloxide-backed notifier bound to one chat.
pub struct TelegramNotifier {
    bot: Bot,
    chat_id: ChatId,
    limiter: RateLimiter,
}

impl TelegramNotifier {
    #[must_use]
    pub fn new(bot: Bot, chat_id: i64, min_interval_secs: u64) -> Self {
        Self {
            bot,
            chat_id: ChatId(chat_id),
            limiter: RateLimiter::from_secs(min_interval_secs),
        }
    }

    /// Builds a notifier when both token and chat id are configured.
    #[must_use]
    pub fn from_config(config: &TelegramConfig) -> Option<Self> {
        let (token, chat_id) = config.credentials()?;
        info!("Telegram alerts enabled for chat {} (bot {})", chat_id, token.masked());
        Some(Self::new(
            Bot::new(token.expose()),
            chat_id,
            config.min_send_interval_secs,
        ))
    }

    async fn deliver(&self, text: &str, image: Option<&Path>) -> Result<(), RequestError> {
        match image {
            Some(path) => {
                self.bot
                    .send_photo(self.chat_id, InputFile::file(path.to_path_buf()))
                    .caption(text)
                    .parse_mode(ParseMode::Html)
                    .await?;
            }
            None => {
                self.bot
                    .send_message(self.chat_id, text)
                    .parse_mode(ParseMode::Html)
                    .await?;
            }
        }
        Ok(())
    }

    async fn send(&self, text: &str, image: Option<&Path>) -> Result<(), NotifyError> {
        send_spaced(&self.limiter, move || self.deliver(text, image)).await?;
        Ok(())
    }
}

/// Sends through the limiter once, and once more after a `RetryAfter` answer.
async fn send_spaced<F, Fut>(limiter: &RateLimiter, mut deliver: F) -> Result<(), RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), RequestError>>,
{
    limiter.acquire().await;

    match deliver().await {
        Err(RequestError::RetryAfter(delay)) => {
            limiter.retry_after(delay.duration()).await;
            limiter.acquire().await;
            deliver().await
        }
        result => result,
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify_violation(
        &self,
        violation: &Violation,
        image: Option<&Path>,
    ) -> Result<(), NotifyError> {
        let message = violation_message(violation);
        let image = image.filter(|path| path.is_file());

        debug!(
            "Sending {} alert to chat {} (photo: {})",
            violation.violation_type,
            self.chat_id.0,
            image.is_some()
        );
        self.send(&message, image).await?;
        info!("Alert sent: {}", violation.violation_type);
        Ok(())
    }

    async fn send_test_message(&self) -> Result<(), NotifyError> {
        self.send(TEST_MESSAGE, None).await?;
        info!("Test message sent to chat {}", self.chat_id.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{Duration, Instant};

    use teloxide::types::Seconds;

    use super::*;
    use crate::config::BotToken;

    const TOKEN: &str = "123456789:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsawQ";

    #[test]
    fn test_notifier_requires_both_credentials() {
        let mut config = TelegramConfig {
            bot_token: Some(BotToken::parse(TOKEN).unwrap()),
            ..TelegramConfig::default()
        };
        assert!(TelegramNotifier::from_config(&config).is_none());

        config.chat_id = Some(-100_123);
        let notifier = TelegramNotifier::from_config(&config).unwrap();
        assert_eq!(notifier.chat_id, ChatId(-100_123));
    }

    #[tokio::test]
    async fn test_retry_after_waits_then_retries_once() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let started = Instant::now();
        let result = send_spaced(&limiter, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RequestError::RetryAfter(Seconds::from_seconds(1)))
        })
        .await;

        assert!(matches!(result, Err(RequestError::RetryAfter(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test]
    async fn test_retry_after_then_success() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result = send_spaced(&limiter, move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(RequestError::RetryAfter(Seconds::from_seconds(1)))
            } else {
                Ok(())
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result = send_spaced(&limiter, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RequestError::Io(Arc::new(std::io::Error::other("broken pipe"))))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
