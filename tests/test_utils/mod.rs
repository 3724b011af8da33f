//! Test utilities for integration tests
#![allow(dead_code)]
use std::sync::{Arc, Mutex};

use parley::chat::{ChatSession, Log, Notification, Notifier, Renderer};
use parley::openai::Client;

/// Keeps a copy of every log it is asked to render.
#[derive(Default)]
pub struct RecordingRenderer {
    pub renders: Mutex<Vec<Log>>,
}

impl Renderer for RecordingRenderer {
    fn render(&self, log: &Log) {
        self.renders.lock().unwrap().push(log.clone());
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub notifications: Mutex<Vec<Notification>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }
}

pub type TestSession = ChatSession<Client, Arc<RecordingRenderer>, Arc<RecordingNotifier>>;

/// Creates a session talking to `base_url` with recording collaborators.
pub fn test_session(
    base_url: &str,
) -> (TestSession, Arc<RecordingRenderer>, Arc<RecordingNotifier>) {
    let renderer = Arc::new(RecordingRenderer::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let session = ChatSession::new(
        Client::new(base_url, "test-api-key"),
        Arc::clone(&renderer),
        Arc::clone(&notifier),
        "gpt-4o",
    );
    (session, renderer, notifier)
}

/// Formats a streamed completion chunk as a server-sent event.
pub fn sse_chunk(id: &str, model: &str, content: &str) -> String {
    let chunk = serde_json::json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": 1694268190,
        "model": model,
        "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}],
    });
    format!("data: {}\n\n", chunk)
}
