use super::{sse_data, CompletionService, StreamEvent, TextStream};
use crate::chat::ChatMessage;
use anyhow::{Context, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use tracing::debug;

/// Widget-side transport for the site's `/api/chat` route.
#[derive(Clone)]
pub struct ChatTransport {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    id: &'a str,
    messages: &'a [ChatMessage],
}

impl ChatTransport {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session_id: session_id.into(),
        }
    }
}

#[async_trait]
impl CompletionService for ChatTransport {
    fn session_id(&self) -> Option<String> {
        Some(self.session_id.clone())
    }

    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<TextStream> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&ChatRequest {
                id: &self.session_id,
                messages: &messages,
            })
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        if !response.status().is_success() {
            anyhow::bail!("/api/chat returned {}", response.status());
        }

        debug!("Completion stream opened for session {}", self.session_id);
        Ok(deltas(sse_data(response.bytes_stream())).boxed())
    }
}

/// Maps `/api/chat` frames to assistant text. An `error` frame fails the stream.
pub fn deltas<S>(frames: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = Result<String>> + Send + 'static,
{
    try_stream! {
        let mut frames = Box::pin(frames);

        while let Some(frame) = frames.next().await {
            let frame = frame?;
            let event: StreamEvent = serde_json::from_str(&frame)
                .with_context(|| format!("Malformed stream frame: {}", frame))?;

            match event {
                StreamEvent::TextDelta { delta } => yield delta,
                StreamEvent::Finish => break,
                StreamEvent::Error => {
                    Err::<(), _>(anyhow::anyhow!("Completion service reported an error"))?
                }
                StreamEvent::Other => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn frames(items: &[&str]) -> impl Stream<Item = Result<String>> + Send + 'static {
        let owned: Vec<Result<String>> = items.iter().map(|s| Ok(s.to_string())).collect();
        stream::iter(owned)
    }

    #[tokio::test]
    async fn collects_text_until_finish() {
        let out: Vec<String> = deltas(frames(&[
            r#"{"type":"start"}"#,
            r#"{"type":"text-delta","delta":"Hi"}"#,
            r#"{"type":"text-delta","delta":" there"}"#,
            r#"{"type":"finish"}"#,
            r#"{"type":"text-delta","delta":"ignored"}"#,
        ]))
        .map(|r| r.unwrap())
        .collect()
        .await;
        assert_eq!(out, vec!["Hi".to_string(), " there".to_string()]);
    }

    #[tokio::test]
    async fn error_frame_fails_the_stream() {
        let out: Vec<Result<String>> = deltas(frames(&[
            r#"{"type":"text-delta","delta":"partial"}"#,
            r#"{"type":"error"}"#,
        ]))
        .collect()
        .await;
        assert_eq!(out.len(), 2);
        assert!(out[0].is_ok());
        assert!(out[1].is_err());
    }

    #[tokio::test]
    async fn empty_successful_stream_is_not_an_error() {
        let out: Vec<Result<String>> = deltas(frames(&[r#"{"type":"finish"}"#])).collect().await;
        assert!(out.is_empty());
    }
}
