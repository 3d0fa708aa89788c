//! Best-effort duplication of the conversation into a channel humans watch.
//!
//! The destination thread is created lazily on the first logged message and
//! memoized for the rest of the session. A failed creation is not remembered:
//! the next logged message simply tries again. Every call outcome feeds the
//! shared `offline` flag that the controller folds into its connectivity.

pub mod http;

use crate::entity::Role;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error};

pub use http::HttpMirror;

/// Longest message body the mirroring channel accepts.
pub const MIRROR_CONTENT_LIMIT: usize = 2000;

#[async_trait]
pub trait MirrorService: Send + Sync {
    /// Open a destination thread for a session and return its handle.
    async fn create_thread(&self, session_id: &str, first_message: Option<&str>)
        -> Result<String>;

    async fn post_message(&self, thread_id: &str, content: &str, role: Role) -> Result<()>;
}

#[derive(Clone)]
pub struct MirrorLog {
    service: Arc<dyn MirrorService>,
    session_id: Option<String>,
    thread_id: Arc<Mutex<Option<String>>>,
    offline: Arc<AtomicBool>,
}

impl MirrorLog {
    pub fn new(service: Arc<dyn MirrorService>, session_id: Option<String>) -> Self {
        Self {
            service,
            session_id: session_id.filter(|id| !id.trim().is_empty()),
            thread_id: Arc::new(Mutex::new(None)),
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the most recent call to the logging service failed.
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    pub async fn thread_id(&self) -> Option<String> {
        self.thread_id.lock().await.clone()
    }

    async fn thread_for(&self, first_message: &str) -> Result<Option<String>> {
        let Some(session_id) = self.session_id.as_deref() else {
            return Ok(None);
        };

        // Held across creation so concurrent loggers share a single thread.
        let mut slot = self.thread_id.lock().await;
        if let Some(id) = slot.as_ref() {
            return Ok(Some(id.clone()));
        }

        let first = if first_message.is_empty() {
            None
        } else {
            Some(first_message)
        };

        match self.service.create_thread(session_id, first).await {
            Ok(id) => {
                self.offline.store(false, Ordering::SeqCst);
                debug!("Mirror thread {} created for session {}", id, session_id);
                *slot = Some(id.clone());
                Ok(Some(id))
            }
            Err(e) => {
                self.offline.store(true, Ordering::SeqCst);
                Err(e.context("Failed to create mirror thread"))
            }
        }
    }

    /// Relay one message. Silently skips when there is no session id.
    pub async fn log(&self, content: &str, role: Role) -> Result<()> {
        let Some(thread_id) = self.thread_for(content).await? else {
            return Ok(());
        };

        let content = truncate_chars(content, MIRROR_CONTENT_LIMIT);
        match self.service.post_message(&thread_id, content, role).await {
            Ok(()) => {
                self.offline.store(false, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                self.offline.store(true, Ordering::SeqCst);
                Err(e.context("Failed to post mirror message"))
            }
        }
    }

    /// Fire-and-forget variant of [`MirrorLog::log`]; failures are only logged.
    pub fn spawn_log(&self, content: String, role: Role) -> JoinHandle<()> {
        let log = self.clone();
        tokio::spawn(async move {
            if let Err(e) = log.log(&content, role).await {
                error!("Failed to log {} message to mirror: {:#}", role, e);
            }
        })
    }
}

/// Cuts `s` to at most `max` characters without splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        CreateThread {
            session_id: String,
            first_message: Option<String>,
        },
        Post {
            thread_id: String,
            content: String,
            role: Role,
        },
    }

    /// Records every call; failures are toggled per operation.
    #[derive(Default)]
    pub struct RecordingMirror {
        pub calls: StdMutex<Vec<Call>>,
        pub fail_create: AtomicBool,
        pub fail_post: AtomicBool,
        /// Thread creation never answers.
        pub hang_create: AtomicBool,
    }

    impl RecordingMirror {
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn posts(&self) -> Vec<(String, Role)> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Post { content, role, .. } => Some((content, role)),
                    _ => None,
                })
                .collect()
        }

        pub fn creates(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, Call::CreateThread { .. }))
                .count()
        }
    }

    #[async_trait]
    impl MirrorService for RecordingMirror {
        async fn create_thread(
            &self,
            session_id: &str,
            first_message: Option<&str>,
        ) -> Result<String> {
            self.calls.lock().unwrap().push(Call::CreateThread {
                session_id: session_id.to_string(),
                first_message: first_message.map(str::to_string),
            });
            if self.hang_create.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.fail_create.load(Ordering::SeqCst) {
                anyhow::bail!("thread endpoint returned 500");
            }
            Ok(format!("thread-{}", session_id))
        }

        async fn post_message(&self, thread_id: &str, content: &str, role: Role) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Post {
                thread_id: thread_id.to_string(),
                content: content.to_string(),
                role,
            });
            if self.fail_post.load(Ordering::SeqCst) {
                anyhow::bail!("message endpoint returned 500");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Call, RecordingMirror};
    use super::*;

    fn log_with(service: Arc<RecordingMirror>, session: Option<&str>) -> MirrorLog {
        MirrorLog::new(service, session.map(str::to_string))
    }

    #[tokio::test]
    async fn thread_is_created_once_and_reused() {
        let service = Arc::new(RecordingMirror::default());
        let log = log_with(service.clone(), Some("abc"));

        log.log("Hello", Role::User).await.unwrap();
        log.log("Hi there", Role::Assistant).await.unwrap();

        assert_eq!(service.creates(), 1);
        assert_eq!(
            service.calls()[0],
            Call::CreateThread {
                session_id: "abc".to_string(),
                first_message: Some("Hello".to_string()),
            }
        );
        assert_eq!(service.posts().len(), 2);
        assert_eq!(log.thread_id().await.as_deref(), Some("thread-abc"));
    }

    #[tokio::test]
    async fn concurrent_logs_share_one_thread() {
        let service = Arc::new(RecordingMirror::default());
        let log = log_with(service.clone(), Some("abc"));

        let a = log.spawn_log("one".to_string(), Role::User);
        let b = log.spawn_log("two".to_string(), Role::Assistant);
        a.await.unwrap();
        b.await.unwrap();

        assert_eq!(service.creates(), 1);
        assert_eq!(service.posts().len(), 2);
    }

    #[tokio::test]
    async fn missing_session_id_is_a_silent_noop() {
        let service = Arc::new(RecordingMirror::default());
        let log = log_with(service.clone(), Some("  "));

        log.log("Hello", Role::User).await.unwrap();

        assert!(service.calls().is_empty());
        assert!(!log.is_offline());
    }

    #[tokio::test]
    async fn failed_creation_retries_on_next_message() {
        let service = Arc::new(RecordingMirror::default());
        service.fail_create.store(true, Ordering::SeqCst);
        let log = log_with(service.clone(), Some("abc"));

        assert!(log.log("first", Role::User).await.is_err());
        assert!(log.is_offline());
        assert_eq!(log.thread_id().await, None);

        service.fail_create.store(false, Ordering::SeqCst);
        log.log("second", Role::User).await.unwrap();

        assert_eq!(service.creates(), 2);
        assert!(!log.is_offline());
    }

    #[tokio::test]
    async fn post_failure_flips_offline_until_next_success() {
        let service = Arc::new(RecordingMirror::default());
        let log = log_with(service.clone(), Some("abc"));

        service.fail_post.store(true, Ordering::SeqCst);
        assert!(log.log("a", Role::User).await.is_err());
        assert!(log.is_offline());

        service.fail_post.store(false, Ordering::SeqCst);
        log.log("b", Role::User).await.unwrap();
        assert!(!log.is_offline());
    }

    #[tokio::test]
    async fn long_content_is_capped() {
        let service = Arc::new(RecordingMirror::default());
        let log = log_with(service.clone(), Some("abc"));

        let long = "é".repeat(MIRROR_CONTENT_LIMIT + 50);
        log.log(&long, Role::Assistant).await.unwrap();

        let (content, _) = service.posts().pop().unwrap();
        assert_eq!(content.chars().count(), MIRROR_CONTENT_LIMIT);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
