use super::MirrorService;
use crate::entity::Role;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Talks to the site's `/api/mirror/*` routes.
#[derive(Clone)]
pub struct HttpMirror {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateThreadBody<'a> {
    chat_id: &'a str,
    first_message: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateThreadReply {
    thread_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PostMessageBody<'a> {
    thread_id: &'a str,
    content: &'a str,
    role: Role,
}

impl HttpMirror {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("{} returned {}: {}", path, status, text);
        }

        Ok(response)
    }
}

#[async_trait]
impl MirrorService for HttpMirror {
    async fn create_thread(
        &self,
        session_id: &str,
        first_message: Option<&str>,
    ) -> Result<String> {
        let body = CreateThreadBody {
            chat_id: session_id,
            first_message: first_message.unwrap_or("Chat session started"),
        };

        let reply: CreateThreadReply = self
            .post("/api/mirror/thread", &body)
            .await?
            .json()
            .await
            .context("Invalid thread creation reply")?;

        reply.thread_id.context("Thread creation reply had no threadId")
    }

    async fn post_message(&self, thread_id: &str, content: &str, role: Role) -> Result<()> {
        let body = PostMessageBody {
            thread_id,
            content,
            role,
        };
        self.post("/api/mirror/message", &body).await?;
        Ok(())
    }
}
