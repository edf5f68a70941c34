//! Telegram delivery: alert formatting, the notifier, send pacing and chat discovery.

mod format;
mod notifier;
mod rate_limiter;
mod updates;

pub use format::{TEST_MESSAGE, escape_html, violation_message};
pub use notifier::{NotifyError, Notifier, TelegramNotifier};
pub use rate_limiter::RateLimiter;
pub use updates::{DiscoveredChat, dedupe_chats, discover_chats};
