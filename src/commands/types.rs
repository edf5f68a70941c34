//! Bot commands and user-facing texts.

use std::fmt;

/// Reply to `/start`.
pub const WELCOME_TEXT: &str = "🤖 <b>Система мониторинга нарушений</b>

Отправьте фото для анализа на наличие нарушений:
• 🚭 Курение
• 🗑️ Выброс мусора
• 🎨 Граффити

Бот проанализирует изображение и покажет:
• Вероятность нарушения (в процентах)
• Статью КоАП РФ
• Размер штрафа

Просто отправьте фото! 📸";

/// Reply to `/help`.
pub const HELP_TEXT: &str = "📖 <b>Справка по использованию бота</b>

<b>Команды:</b>
/start - Начать работу с ботом
/help - Показать эту справку

<b>Как использовать:</b>
1. Отправьте фото через Telegram
2. Бот проанализирует изображение
3. Получите результат с вероятностью нарушения

<b>Что анализируется:</b>
• Курение в запрещенных местах
• Выброс мусора
• Граффити на стенах

<b>Примечание:</b>
Без обученной модели используются эвристические правила на основе стандартной YOLO модели.";

pub const ANALYZING_TEXT: &str = "🔍 Анализирую изображение...";
pub const DOWNLOADED_TEXT: &str = "📥 Фото загружено, начинаю анализ...";
pub const DETECTING_TEXT: &str = "🔍 Запускаю детекцию объектов...";

pub const TIMEOUT_TEXT: &str = "⏱️ <b>Превышено время ожидания</b>

Обработка изображения заняла слишком много времени.
Попробуйте:
• Отправить фото меньшего размера
• Убедиться, что интернет-соединение стабильно
• Попробовать позже";

pub const NETWORK_TEXT: &str = "⏱️ <b>Проблема с соединением</b>

Не удалось обработать фото из-за проблем с сетью.
Попробуйте:
• Проверить интернет-соединение
• Отправить фото еще раз
• Попробовать позже";

/// Location recorded for photos sent to the bot.
pub const USER_UPLOAD_LOCATION: &str = "Загружено пользователем";

/// Progress text shown before a retry.
#[must_use]
pub fn retry_text(stage: DownloadStage, attempt: u32, max_attempts: u32) -> String {
    match stage {
        DownloadStage::GetFile => format!("🔄 Попытка загрузки {attempt}/{max_attempts}..."),
        DownloadStage::Download => format!("🔄 Попытка скачивания {attempt}/{max_attempts}..."),
    }
}

/// Shown for failures that are neither timeouts nor network problems.
#[must_use]
pub fn error_text(error: &impl fmt::Display) -> String {
    format!("❌ Ошибка при обработке изображения: {error}")
}

/// The two network steps of fetching a photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStage {
    /// `getFile`, resolving the file path.
    GetFile,
    /// Downloading the file contents.
    Download,
}

impl DownloadStage {
    /// Name of the step used in error messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::GetFile => "Photo lookup",
            Self::Download => "Photo download",
        }
    }
}

/// Commands understood by the photo bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Help,
}

impl BotCommand {
    /// Parses a command from message text.
    ///
    /// Accepts `/start` and `/help`, case-insensitive, optionally addressed as
    /// `/help@SomeBot` and followed by arguments.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let command = text.trim().strip_prefix('/')?;
        let command = command.split_whitespace().next()?;
        let name = command.split_once('@').map_or(command, |(name, _)| name);

        match name.to_lowercase().as_str() {
            "start" => Some(Self::Start),
            "help" => Some(Self::Help),
            _ => None,
        }
    }

    /// HTML reply.
    #[must_use]
    pub const fn reply(self) -> &'static str {
        match self {
            Self::Start => WELCOME_TEXT,
            Self::Help => HELP_TEXT,
        }
    }

    /// Plain reply used when the HTML one cannot be sent.
    #[must_use]
    pub const fn fallback_reply(self) -> &'static str {
        match self {
            Self::Start => "Привет! Отправьте фото для анализа.",
            Self::Help => "Справка: Отправьте фото для анализа нарушений.",
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
        }
    }
}

impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.name())
    }
}
