//! Chat session controller.
//!
//! Owns the live conversation and reconciles two independently failing
//! dependencies (the completion service and the mirroring channel) into one
//! online/offline signal. Completion requests run as spawned tasks that report
//! back over a channel; the owner drives the controller by feeding those
//! events through [`ChatController::next_event`] and [`ChatController::apply`],
//! the way a UI event loop would.
//! Mirroring is fire-and-forget and never blocks or cancels the completion.

use crate::bus::{Event, EventBus};
use crate::chat::{ChatMessage, MessageContent};
use crate::completion::CompletionService;
use crate::entity::Role;
use crate::mirror::{MirrorLog, MirrorService};
use crate::status::{ChatStatus, Connectivity};
use crate::store::{self, KvStore, StoredMessage};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Prefix marking messages restored from a previous visit.
pub const RESTORED_ID_PREFIX: &str = "prev-";

#[derive(Debug, Clone, PartialEq)]
pub enum CompletionEvent {
    Delta(String),
    Finished,
    Failed,
}

/// A completion event tagged with the request that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEvent {
    pub request: u64,
    pub kind: CompletionEvent,
}

pub struct ChatController {
    store: Arc<dyn KvStore>,
    completion: Arc<dyn CompletionService>,
    mirror: MirrorLog,
    bus: Arc<EventBus>,
    messages: Vec<ChatMessage>,
    input: String,
    status: ChatStatus,
    completion_error: bool,
    resume_marker: Option<DateTime<Utc>>,
    request: u64,
    streaming_id: Option<String>,
    events_tx: mpsc::UnboundedSender<RequestEvent>,
    events_rx: mpsc::UnboundedReceiver<RequestEvent>,
    mirrors: Vec<JoinHandle<()>>,
    last_connectivity: Connectivity,
    initialized: bool,
}

impl ChatController {
    pub fn new(
        store: Arc<dyn KvStore>,
        completion: Arc<dyn CompletionService>,
        mirror: Arc<dyn MirrorService>,
        bus: Arc<EventBus>,
    ) -> Self {
        let mirror = MirrorLog::new(mirror, completion.session_id());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            store,
            completion,
            mirror,
            bus,
            messages: Vec::new(),
            input: String::new(),
            status: ChatStatus::Ready,
            completion_error: false,
            resume_marker: None,
            request: 0,
            streaming_id: None,
            events_tx,
            events_rx,
            mirrors: Vec::new(),
            last_connectivity: Connectivity::Online,
            initialized: false,
        }
    }

    /// Hydrates the previous conversation. Never fails: bad stored data is
    /// logged and the session starts empty.
    pub async fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;

        let entries = match store::load_history(self.store.as_ref()).await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to load previous messages: {:#}", e);
                return;
            }
        };

        let restored: Vec<ChatMessage> = entries
            .into_iter()
            .filter(|entry| !entry.text.is_empty())
            .map(restore)
            .collect();

        if restored.is_empty() {
            return;
        }

        self.resume_marker = restored.last().map(|m| m.created_at);
        info!("Restored {} messages from previous session", restored.len());

        // Anything appended before hydration stays after the restored history.
        self.messages.splice(0..0, restored);
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Sets the input field and sends it.
    pub fn submit(&mut self, text: impl Into<String>) -> bool {
        self.set_input(text);
        self.send_user_message()
    }

    /// Sends the current input. Returns `false` without side effects when the
    /// text is blank, a request is in flight, or the session is offline.
    pub fn send_user_message(&mut self) -> bool {
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return false;
        }
        if self.status != ChatStatus::Ready {
            debug!("Rejecting submission while status is {:?}", self.status);
            return false;
        }
        if self.connectivity().is_offline() {
            debug!("Rejecting submission while offline");
            return false;
        }

        self.append(ChatMessage::new(Role::User, text.clone()));
        self.input.clear();

        self.request += 1;
        self.set_status(ChatStatus::Submitted);
        self.spawn_completion();

        let handle = self.mirror.spawn_log(text, Role::User);
        self.track_mirror(handle);

        true
    }

    fn spawn_completion(&self) {
        let request = self.request;
        let completion = self.completion.clone();
        let messages = self.messages.clone();
        let tx = self.events_tx.clone();

        tokio::spawn(async move {
            let send = |kind: CompletionEvent| {
                // The controller may be gone; nothing left to report to then.
                let _ = tx.send(RequestEvent { request, kind });
            };

            let mut stream = match completion.stream(messages).await {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Completion request failed: {:#}", e);
                    send(CompletionEvent::Failed);
                    return;
                }
            };

            while let Some(item) = stream.next().await {
                match item {
                    Ok(delta) => send(CompletionEvent::Delta(delta)),
                    Err(e) => {
                        error!("Completion stream failed: {:#}", e);
                        send(CompletionEvent::Failed);
                        return;
                    }
                }
            }

            send(CompletionEvent::Finished);
        });
    }

    /// Waits for the next completion event without applying it. Cancel safe,
    /// so it can sit in a `select!` next to other input sources.
    pub async fn next_event(&mut self) -> Option<RequestEvent> {
        self.events_rx.recv().await
    }

    /// Waits for the next completion event and applies it. Not cancel safe:
    /// settling awaits the store, so race [`ChatController::next_event`] instead.
    pub async fn pump(&mut self) -> bool {
        match self.next_event().await {
            Some(event) => {
                self.apply(event).await;
                true
            }
            None => false,
        }
    }

    /// Pumps events until no request is in flight.
    pub async fn run_until_idle(&mut self) {
        while self.status.is_loading() {
            if !self.pump().await {
                break;
            }
        }
    }

    pub async fn apply(&mut self, event: RequestEvent) {
        if event.request != self.request || !self.status.is_loading() {
            debug!("Ignoring event from superseded request {}", event.request);
            return;
        }

        match event.kind {
            CompletionEvent::Delta(delta) => {
                self.set_status(ChatStatus::Streaming);
                self.push_delta(&delta);
            }
            CompletionEvent::Finished => {
                self.streaming_id = None;
                self.set_status(ChatStatus::Ready);
                self.on_completion_settled().await;
            }
            CompletionEvent::Failed => {
                self.streaming_id = None;
                self.completion_error = true;
                self.set_status(ChatStatus::Error);
            }
        }

        self.refresh_connectivity();
    }

    fn push_delta(&mut self, delta: &str) {
        let current = self
            .streaming_id
            .as_ref()
            .and_then(|id| self.messages.iter_mut().rev().find(|m| &m.id == id));

        match current {
            Some(message) => {
                message.push_text(delta);
                let update = Event::MessageUpdated {
                    id: message.id.clone(),
                    text: message.text(),
                };
                self.bus.publish(update);
            }
            None => {
                let message = ChatMessage::new(Role::Assistant, delta);
                self.streaming_id = Some(message.id.clone());
                self.append(message);
            }
        }
    }

    /// Runs once per in-flight to idle transition: mirror the finished
    /// assistant reply and rewrite the stored snapshot.
    async fn on_completion_settled(&mut self) {
        let Some(last) = self.messages.last() else {
            return;
        };
        if last.role != Role::Assistant {
            return;
        }
        let text = last.text();
        if text.is_empty() {
            return;
        }

        let handle = self.mirror.spawn_log(text, Role::Assistant);
        self.track_mirror(handle);

        match store::save_history(self.store.as_ref(), &self.messages).await {
            Ok(count) => debug!("Saved {} messages", count),
            Err(e) => error!("Failed to save messages: {:#}", e),
        }
    }

    /// Clears a completion failure so the user can try again.
    pub fn clear_error(&mut self) {
        self.completion_error = false;
        if self.status == ChatStatus::Error {
            self.set_status(ChatStatus::Ready);
        }
        self.refresh_connectivity();
    }

    /// Derived on every call from the last outcome of both services.
    pub fn connectivity(&self) -> Connectivity {
        Connectivity::from_flags(self.completion_error, self.mirror.is_offline())
    }

    /// Publishes a connectivity change if one happened since the last check.
    pub fn refresh_connectivity(&mut self) -> Connectivity {
        let current = self.connectivity();
        if current != self.last_connectivity {
            self.last_connectivity = current;
            self.bus.publish(Event::ConnectivityChanged(current));
        }
        current
    }

    /// Waits for outstanding mirror calls; used at shutdown and in tests.
    pub async fn flush_mirrors(&mut self) {
        for handle in self.mirrors.drain(..) {
            if let Err(e) = handle.await {
                error!("Mirror task panicked: {}", e);
            }
        }
        self.refresh_connectivity();
    }

    fn track_mirror(&mut self, handle: JoinHandle<()>) {
        self.mirrors.retain(|h| !h.is_finished());
        self.mirrors.push(handle);
    }

    fn append(&mut self, message: ChatMessage) {
        self.bus.publish(Event::MessageAppended(message.clone()));
        self.messages.push(message);
    }

    fn set_status(&mut self, to: ChatStatus) {
        if self.status == to {
            return;
        }
        let from = self.status;
        self.status = to;
        self.bus.publish(Event::StatusChanged { from, to });
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn status(&self) -> ChatStatus {
        self.status
    }

    pub fn is_loading(&self) -> bool {
        self.status.is_loading()
    }

    pub fn resume_marker(&self) -> Option<DateTime<Utc>> {
        self.resume_marker
    }

    pub fn mirror(&self) -> &MirrorLog {
        &self.mirror
    }
}

fn restore(entry: StoredMessage) -> ChatMessage {
    // Snapshots rewritten after a restore already carry the prefix.
    let id = if entry.id.starts_with(RESTORED_ID_PREFIX) {
        entry.id
    } else {
        format!("{}{}", RESTORED_ID_PREFIX, entry.id)
    };

    ChatMessage {
        id,
        role: entry.role,
        parts: None,
        content: Some(MessageContent::Text(entry.text)),
        created_at: DateTime::from_timestamp_millis(entry.timestamp).unwrap_or_else(Utc::now),
    }
}
