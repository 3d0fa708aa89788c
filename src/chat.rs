use crate::entity::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One piece of a structured message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: Some(text.into()),
            content: None,
        }
    }
}

/// `content` may arrive either as a bare string or as a list of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<MessagePart>),
}

/// A conversation turn as it lives in the widget and travels to `/api/chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<Vec<MessagePart>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// A freshly authored turn in the `parts` shape.
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: format!("msg-{}", Uuid::new_v4().simple()),
            role,
            parts: Some(vec![MessagePart::text(text)]),
            content: None,
            created_at: Utc::now(),
        }
    }

    /// Flattens whichever payload shape is present into one string.
    pub fn text(&self) -> String {
        if let Some(parts) = &self.parts {
            return parts
                .iter()
                .filter(|p| p.kind == "text")
                .map(|p| p.text.as_deref().unwrap_or(""))
                .collect();
        }

        match &self.content {
            Some(MessageContent::Text(s)) => s.clone(),
            Some(MessageContent::Parts(parts)) => parts
                .iter()
                .filter(|p| p.kind == "text" || p.kind == "input_text")
                .map(|p| {
                    p.text
                        .as_deref()
                        .or(p.content.as_deref())
                        .unwrap_or("")
                })
                .collect(),
            None => String::new(),
        }
    }

    /// Appends streamed text to the last text part, creating one if needed.
    pub fn push_text(&mut self, delta: &str) {
        let parts = self.parts.get_or_insert_with(Vec::new);
        match parts.iter_mut().rev().find(|p| p.kind == "text") {
            Some(part) => part.text.get_or_insert_with(String::new).push_str(delta),
            None => parts.push(MessagePart::text(delta)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare(role: Role) -> ChatMessage {
        ChatMessage {
            id: "m".to_string(),
            role,
            parts: None,
            content: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn text_from_parts_keeps_only_text_parts() {
        let mut msg = bare(Role::Assistant);
        msg.parts = Some(vec![
            MessagePart::text("Hello"),
            MessagePart {
                kind: "reasoning".to_string(),
                text: Some("hidden".to_string()),
                content: None,
            },
            MessagePart::text(" world"),
        ]);
        assert_eq!(msg.text(), "Hello world");
    }

    #[test]
    fn text_from_string_content() {
        let mut msg = bare(Role::User);
        msg.content = Some(MessageContent::Text("plain".to_string()));
        assert_eq!(msg.text(), "plain");
    }

    #[test]
    fn text_from_content_list_falls_back_to_content_field() {
        let mut msg = bare(Role::User);
        msg.content = Some(MessageContent::Parts(vec![
            MessagePart::text("a"),
            MessagePart {
                kind: "input_text".to_string(),
                text: None,
                content: Some("b".to_string()),
            },
            MessagePart {
                kind: "image".to_string(),
                text: Some("c".to_string()),
                content: None,
            },
        ]));
        assert_eq!(msg.text(), "ab");
    }

    #[test]
    fn text_is_empty_without_any_payload() {
        assert_eq!(bare(Role::Assistant).text(), "");
    }

    #[test]
    fn content_shapes_deserialize() {
        let as_string: ChatMessage =
            serde_json::from_str(r#"{"id":"1","role":"user","content":"hi"}"#).unwrap();
        assert_eq!(as_string.text(), "hi");

        let as_list: ChatMessage = serde_json::from_str(
            r#"{"id":"2","role":"assistant","content":[{"type":"text","text":"yo"}]}"#,
        )
        .unwrap();
        assert_eq!(as_list.text(), "yo");
    }

    #[test]
    fn push_text_extends_stream() {
        let mut msg = bare(Role::Assistant);
        msg.push_text("Hi");
        msg.push_text(" there");
        assert_eq!(msg.text(), "Hi there");
        assert_eq!(msg.parts.as_ref().map(Vec::len), Some(1));
    }
}
