//! HTML message texts.

use std::fmt::Write as _;

use crate::ontology::Violation;

/// Sent once after setup and at monitor start.
pub const TEST_MESSAGE: &str = "🤖 Бот успешно настроен и готов к работе!";

const UNKNOWN_LOCATION: &str = "Не указано";

/// Escapes text for Telegram's HTML parse mode.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Formats a violation alert.
#[must_use]
pub fn violation_message(violation: &Violation) -> String {
    let mut message = String::from("🚨 Обнаружено нарушение 🚨\n");

    let _ = writeln!(
        message,
        "Тип нарушения: <b>{}</b>",
        escape_html(&violation.description)
    );
    if let Some(confidence) = violation.confidence {
        let _ = writeln!(message, "Вероятность: <b>{:.1}%</b>", confidence * 100.0);
    }
    let _ = writeln!(message, "Статья КоАП: <b>{}</b>", escape_html(&violation.article));
    let _ = writeln!(
        message,
        "Штраф: <b>{:.0} {}</b>",
        violation.fine_amount,
        escape_html(&violation.fine_currency)
    );
    message.push('\n');
    let _ = writeln!(
        message,
        "Время: <b>{}</b>",
        violation.timestamp.format("%Y-%m-%d %H:%M:%S")
    );
    let _ = write!(
        message,
        "Местоположение: <b>{}</b>",
        escape_html(violation.location.as_deref().unwrap_or(UNKNOWN_LOCATION))
    );

    message
}
