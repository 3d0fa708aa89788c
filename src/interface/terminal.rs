use crate::{
    bus::{Event, EventBus},
    controller::ChatController,
    entity::Role,
    status::{ChatStatus, Connectivity},
    widget::{WidgetState, GREETING, GREETING_HINT, OFFLINE_NOTICE, RESUME_NOTICE},
};
use anyhow::Result;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    Open,
    Close,
    Retry,
    Say(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "/quit" | "/exit" => Command::Quit,
            "/open" => Command::Open,
            "/close" => Command::Close,
            "/retry" => Command::Retry,
            _ => Command::Say(line.to_string()),
        }
    }
}

/// Line-oriented rendition of the chat widget on stdin/stdout.
pub struct Terminal {
    controller: ChatController,
    widget: WidgetState,
    events: broadcast::Receiver<Event>,
    streaming: Option<(String, usize)>,
}

impl Terminal {
    pub fn new(controller: ChatController, bus: &Arc<EventBus>) -> Self {
        Self {
            controller,
            widget: WidgetState::new(),
            events: bus.subscribe(),
            streaming: None,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        self.controller.initialize().await;
        self.widget.open();
        self.render_intro();

        let (line_tx, line_rx) = mpsc::channel::<String>(16);
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line_tx.send(line).await.is_err() {
                    break;
                }
            }
            debug!("stdin closed");
        });

        self.drive(line_rx).await;

        self.controller.flush_mirrors().await;
        Ok(())
    }

    /// Interleaves typed lines with completion events until quit or end of input.
    async fn drive(&mut self, mut lines: mpsc::Receiver<String>) {
        loop {
            tokio::select! {
                line = lines.recv() => {
                    let Some(line) = line else { break };
                    if !self.handle(Command::parse(&line)) {
                        break;
                    }
                }
                event = self.controller.next_event() => {
                    let Some(event) = event else { break };
                    // Runs after the select settles, so typing cannot cut a save short.
                    self.controller.apply(event).await;
                }
            }

            self.controller.refresh_connectivity();
            self.drain_events();
        }
    }

    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Quit => return false,
            Command::Open => {
                let unread = self.widget.has_notification();
                self.widget.open();
                if unread {
                    self.render_last_reply();
                }
            }
            Command::Close => self.widget.close(),
            Command::Retry => self.controller.clear_error(),
            Command::Say(text) => {
                if self.controller.connectivity().is_offline() {
                    println!("{}", OFFLINE_NOTICE);
                } else if !self.controller.submit(text) && self.controller.is_loading() {
                    println!("(still answering, one moment)");
                }
            }
        }
        true
    }

    fn drain_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.render(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    debug!("Terminal skipped {} events", skipped);
                }
                Err(_) => break,
            }
        }
    }

    fn render(&mut self, event: Event) {
        match event {
            Event::MessageAppended(message) if message.role == Role::Assistant => {
                let text = message.text();
                if self.widget.is_open() {
                    print!("Assistant: {}", text);
                    flush();
                } else {
                    self.widget.show_notification();
                }
                self.streaming = Some((message.id, text.len()));
            }
            Event::MessageUpdated { id, text } => match self.streaming.as_mut() {
                Some((current, printed)) if *current == id => {
                    if self.widget.is_open() && text.len() > *printed {
                        print!("{}", &text[*printed..]);
                        flush();
                    }
                    *printed = text.len();
                }
                _ => {}
            },
            Event::StatusChanged { from, to } => {
                if from == ChatStatus::Streaming && self.widget.is_open() {
                    println!();
                }
                if to != ChatStatus::Streaming {
                    self.streaming = None;
                }
            }
            Event::ConnectivityChanged(state) => {
                println!("[{}]", state);
                if state == Connectivity::Offline {
                    println!("{}", OFFLINE_NOTICE);
                }
            }
            _ => {}
        }
    }

    fn render_intro(&self) {
        println!("[{}]", self.controller.connectivity());

        if let Some(marker) = self.controller.resume_marker() {
            println!("-- {} (last message {}) --", RESUME_NOTICE, marker.format("%Y-%m-%d %H:%M"));
            for message in self.controller.messages() {
                println!("{}: {}", speaker(message.role), message.text());
            }
        } else if self.controller.messages().is_empty() {
            println!("{}", GREETING);
            println!("{}", GREETING_HINT);
        }
    }

    fn render_last_reply(&self) {
        if let Some(message) = self
            .controller
            .messages()
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
        {
            println!("{}: {}", speaker(message.role), message.text());
        }
    }
}

fn speaker(role: Role) -> &'static str {
    match role {
        Role::User => "You",
        Role::Assistant => "Assistant",
    }
}

fn flush() {
    let _ = std::io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatMessage;
    use crate::completion::{CompletionService, TextStream};
    use crate::mirror::testing::RecordingMirror;
    use crate::store::{self, KvStore, MemoryStore};
    use async_trait::async_trait;
    use futures::stream::{self, StreamExt};
    use std::time::Duration;

    struct Greeter;

    #[async_trait]
    impl CompletionService for Greeter {
        fn session_id(&self) -> Option<String> {
            Some("terminal-session".to_string())
        }

        async fn stream(&self, _messages: Vec<ChatMessage>) -> anyhow::Result<TextStream> {
            let items: Vec<anyhow::Result<String>> = vec![Ok("Hi".to_string())];
            Ok(stream::iter(items).boxed())
        }
    }

    /// Store whose writes take long enough for a line to arrive mid-save.
    #[derive(Default)]
    struct SlowStore(MemoryStore);

    #[async_trait]
    impl KvStore for SlowStore {
        async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.0.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.0.set(key, value).await
        }
    }

    #[test]
    fn commands_parse() {
        assert_eq!(Command::parse("/quit"), Command::Quit);
        assert_eq!(Command::parse(" /open "), Command::Open);
        assert_eq!(Command::parse("/close"), Command::Close);
        assert_eq!(Command::parse("/retry"), Command::Retry);
        assert_eq!(
            Command::parse("How much is a website?"),
            Command::Say("How much is a website?".to_string())
        );
    }

    #[tokio::test]
    async fn typing_during_a_save_does_not_drop_it() {
        let kv = Arc::new(SlowStore::default());
        let bus = Arc::new(EventBus::new());
        let controller = ChatController::new(
            kv.clone(),
            Arc::new(Greeter),
            Arc::new(RecordingMirror::default()),
            bus.clone(),
        );
        let mut terminal = Terminal::new(controller, &bus);

        let (tx, rx) = mpsc::channel(16);
        tx.send("Hello".to_string()).await.unwrap();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send("/close".to_string()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(150)).await;
            tx.send("/quit".to_string()).await.unwrap();
        });

        terminal.drive(rx).await;

        assert_eq!(terminal.controller.status(), ChatStatus::Ready);
        let saved = store::load_history(&kv.0).await.unwrap();
        let texts: Vec<&str> = saved.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["Hello", "Hi"]);
    }
}
