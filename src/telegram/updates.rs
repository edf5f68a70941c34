//! Chat discovery through `getUpdates`.

use std::collections::HashSet;
use std::fmt;

use teloxide::RequestError;
use teloxide::prelude::*;
use teloxide::types::Chat;
use tracing::debug;

/// A chat that has recently talked to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredChat {
    pub id: i64,
    /// `private`, `group`, `supergroup` or `channel`.
    pub kind: &'static str,
    pub title: String,
}

impl DiscoveredChat {
    #[must_use]
    pub fn from_chat(chat: &Chat) -> Self {
        let kind = if chat.is_private() {
            "private"
        } else if chat.is_supergroup() {
            "supergroup"
        } else if chat.is_group() {
            "group"
        } else {
            "channel"
        };

        let title = chat.title().map_or_else(|| person_name(chat), str::to_owned);

        Self {
            id: chat.id.0,
            kind,
            title,
        }
    }
}

impl fmt::Display for DiscoveredChat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.title, self.kind, self.id)
    }
}

fn person_name(chat: &Chat) -> String {
    let name = [chat.first_name(), chat.last_name()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");

    if !name.is_empty() {
        return name;
    }
    chat.username()
        .map_or_else(|| chat.id.0.to_string(), |username| format!("@{username}"))
}

/// Removes repeated chats, keeping the first occurrence.
#[must_use]
pub fn dedupe_chats(chats: impl IntoIterator<Item = DiscoveredChat>) -> Vec<DiscoveredChat> {
    let mut seen = HashSet::new();
    chats.into_iter().filter(|chat| seen.insert(chat.id)).collect()
}

/// Lists chats found in pending updates.
///
/// # Errors
///
/// Returns an error if the `getUpdates` request fails.
pub async fn discover_chats(bot: &Bot) -> Result<Vec<DiscoveredChat>, RequestError> {
    let updates = bot.get_updates().await?;
    debug!("getUpdates returned {} updates", updates.len());

    Ok(dedupe_chats(
        updates
            .iter()
            .filter_map(Update::chat)
            .map(DiscoveredChat::from_chat),
    ))
}
