pub mod telegram;
pub mod terminal;

use crate::entity::Role;
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Longest slice of the first message quoted when a thread opens.
pub const PREVIEW_LIMIT: usize = 200;

/// Server-side handle on the channel humans watch.
#[async_trait]
pub trait ThreadRelay: Send + Sync {
    /// Start a thread and return its id.
    async fn open_thread(&self, title: &str, opening: &str) -> Result<String>;

    async fn post(&self, thread_id: &str, text: &str) -> Result<()>;
}

pub fn thread_title(chat_id: &str, date: NaiveDate) -> String {
    let short: String = chat_id.chars().take(8).collect();
    format!("Chat {} - {}", short, date.format("%Y-%m-%d"))
}

pub fn opening_line(first_message: Option<&str>) -> String {
    match first_message.filter(|m| !m.is_empty()) {
        Some(message) => {
            let preview: String = message.chars().take(PREVIEW_LIMIT).collect();
            let ellipsis = if message.chars().count() > PREVIEW_LIMIT {
                "..."
            } else {
                ""
            };
            format!(
                "Chat session started. First message: \"{}{}\"",
                preview, ellipsis
            )
        }
        None => "New chat session started".to_string(),
    }
}

pub fn format_mirror_message(content: &str, role: Role, client_ip: Option<&str>) -> String {
    match (role, client_ip) {
        (Role::User, Some(ip)) => format!("{} ({}):\n{}", role.display_name(), ip, content),
        _ => format!("{}:\n{}", role.display_name(), content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_uses_short_chat_id() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        assert_eq!(
            thread_title("0123456789abcdef", date),
            "Chat 01234567 - 2026-03-14"
        );
        assert_eq!(thread_title("abc", date), "Chat abc - 2026-03-14");
    }

    #[test]
    fn opening_line_previews_first_message() {
        assert_eq!(
            opening_line(Some("Hello")),
            "Chat session started. First message: \"Hello\""
        );
        assert_eq!(opening_line(None), "New chat session started");
        assert_eq!(opening_line(Some("")), "New chat session started");

        let long = "x".repeat(PREVIEW_LIMIT + 1);
        let line = opening_line(Some(&long));
        assert!(line.ends_with("...\""));
        assert_eq!(line.matches('x').count(), PREVIEW_LIMIT);
    }

    #[test]
    fn mirror_messages_carry_role_and_ip() {
        assert_eq!(
            format_mirror_message("Hi", Role::User, Some("1.2.3.4")),
            "User (1.2.3.4):\nHi"
        );
        assert_eq!(format_mirror_message("Hi", Role::User, None), "User:\nHi");
        assert_eq!(
            format_mirror_message("Hello!", Role::Assistant, Some("1.2.3.4")),
            "AI Assistant:\nHello!"
        );
    }
}
