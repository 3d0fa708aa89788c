pub mod gateway;
pub mod prompt;
pub mod transport;

use crate::chat::ChatMessage;
use anyhow::Result;
use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};

pub use gateway::GatewayClient;
pub use transport::ChatTransport;

/// Incremental assistant text. An `Err` item means the stream broke.
pub type TextStream = BoxStream<'static, Result<String>>;

/// Turns a conversation into a streamed assistant reply.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Identifier of the conversation on the service side, if it assigns one.
    fn session_id(&self) -> Option<String> {
        None
    }

    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<TextStream>;
}

/// Event frames `/api/chat` emits and the widget transport consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    TextDelta {
        delta: String,
    },
    Finish,
    Error,
    #[serde(other)]
    Other,
}

/// Splits a server-sent event body into its `data:` payloads.
/// Ends at a `[DONE]` sentinel or when the body ends.
pub fn sse_data<S, B, E>(body: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    try_stream! {
        let mut body = Box::pin(body);
        let mut buf: Vec<u8> = Vec::new();

        'read: while let Some(chunk) = body.next().await {
            buf.extend_from_slice(chunk?.as_ref());

            while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                match data_line(&line) {
                    Some(DataLine::Done) => break 'read,
                    Some(DataLine::Payload(data)) => yield data,
                    None => {}
                }
            }
        }

        if let Some(DataLine::Payload(data)) = data_line(&buf) {
            yield data;
        }
    }
}

enum DataLine {
    Payload(String),
    Done,
}

fn data_line(raw: &[u8]) -> Option<DataLine> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches(['\n', '\r']);
    let data = line.strip_prefix("data:")?.trim_start();

    if data == "[DONE]" {
        Some(DataLine::Done)
    } else if data.is_empty() {
        None
    } else {
        Some(DataLine::Payload(data.to_string()))
    }
}
