use super::{prompt::CHAT_SYSTEM_PROMPT, sse_data, CompletionService, TextStream};
use crate::chat::ChatMessage;
use crate::config::GatewayConfig;
use anyhow::{Context, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Server-side client for an OpenAI-compatible AI gateway.
#[derive(Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    config: GatewayConfig,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct UpstreamMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Serialize)]
struct UpstreamRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: Vec<UpstreamMessage>,
}

#[derive(Deserialize)]
struct UpstreamChunk {
    #[serde(default)]
    choices: Vec<UpstreamChoice>,
}

#[derive(Deserialize)]
struct UpstreamChoice {
    #[serde(default)]
    delta: UpstreamDelta,
}

#[derive(Deserialize, Default)]
struct UpstreamDelta {
    content: Option<String>,
}

impl GatewayClient {
    pub fn new(client: reqwest::Client, config: GatewayConfig) -> Self {
        Self { client, config }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

/// System prompt followed by every turn that carries text.
pub fn upstream_messages(messages: &[ChatMessage]) -> Vec<UpstreamMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    out.push(UpstreamMessage {
        role: "system",
        content: CHAT_SYSTEM_PROMPT.to_string(),
    });

    out.extend(messages.iter().filter_map(|m| {
        let content = m.text();
        if content.is_empty() {
            return None;
        }
        Some(UpstreamMessage {
            role: m.role.as_str(),
            content,
        })
    }));

    out
}

#[async_trait]
impl CompletionService for GatewayClient {
    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<TextStream> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .context("AI_GATEWAY_API_KEY is not set")?;

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = UpstreamRequest {
            model: &self.config.model,
            stream: true,
            messages: upstream_messages(&messages),
        };

        debug!(
            "Requesting completion from {} ({} messages)",
            self.config.model,
            body.messages.len()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .context("Gateway request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Gateway returned {}: {}", status, text);
        }

        Ok(content_deltas(sse_data(response.bytes_stream())).boxed())
    }
}

/// Pulls `choices[0].delta.content` out of each upstream chunk.
pub fn content_deltas<S>(frames: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = Result<String>> + Send + 'static,
{
    try_stream! {
        let mut frames = Box::pin(frames);

        while let Some(frame) = frames.next().await {
            let frame = frame?;
            let chunk: UpstreamChunk = match serde_json::from_str(&frame) {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!("Skipping unparsable gateway chunk: {}", e);
                    continue;
                }
            };

            let text: String = chunk
                .choices
                .into_iter()
                .filter_map(|c| c.delta.content)
                .collect();
            if !text.is_empty() {
                yield text;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Role;
    use futures::stream;

    #[test]
    fn upstream_messages_prepend_prompt_and_drop_empty_turns() {
        let messages = vec![
            ChatMessage::new(Role::User, "Hello"),
            ChatMessage::new(Role::Assistant, ""),
            ChatMessage::new(Role::User, "Pricing?"),
        ];
        let upstream = upstream_messages(&messages);

        assert_eq!(upstream.len(), 3);
        assert_eq!(upstream[0].role, "system");
        assert_eq!(
            upstream[1],
            UpstreamMessage {
                role: "user",
                content: "Hello".to_string()
            }
        );
        assert_eq!(upstream[2].content, "Pricing?");
    }

    #[tokio::test]
    async fn content_deltas_skip_role_only_and_bad_chunks() {
        let frames: Vec<Result<String>> = vec![
            Ok(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#.to_string()),
            Ok(r#"{"choices":[{"delta":{"content":"Beep"}}]}"#.to_string()),
            Ok("not json".to_string()),
            Ok(r#"{"choices":[{"delta":{"content":" boop"}}]}"#.to_string()),
            Ok(r#"{"choices":[]}"#.to_string()),
        ];

        let out: Vec<String> = content_deltas(stream::iter(frames))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(out, vec!["Beep".to_string(), " boop".to_string()]);
    }
}
