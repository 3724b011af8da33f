use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Error, Result};
use chrono::Utc;
use futures_util::StreamExt;

use super::accumulator::accumulate;
use super::models::{Entry, Fragment, Log};
use crate::openai::{Message, Role, StreamError, Transport};

pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong, please try again later.";

/// Receives the full log after every committed change. Implementors
/// are expected to sanitize entry content before interpreting it and
/// to keep the most recently updated entry in view.
pub trait Renderer: Send + Sync {
    fn render(&self, log: &Log);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn success(message: &str) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.to_string(),
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.to_string(),
        }
    }
}

/// Presents user visible notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

impl<R: Renderer + ?Sized> Renderer for Arc<R> {
    fn render(&self, log: &Log) {
        (**self).render(log)
    }
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notify(&self, notification: Notification) {
        (**self).notify(notification)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The prompt was blank so nothing happened.
    Empty,
    /// Another submission is still streaming so nothing happened.
    Busy,
    /// The response streamed to the end.
    Completed,
    /// The response failed part way. Whatever arrived stays in the log.
    Failed,
}

/// Clears the busy flag however the submission ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The message shown to the user for a failed submission.
pub fn failure_message(err: &Error) -> String {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<StreamError>())
        .and_then(StreamError::reason)
        .unwrap_or(GENERIC_ERROR_MESSAGE)
        .to_string()
}

/// A single chat conversation against a completion endpoint.
///
/// The session owns the only mutable copy of the log. A submission
/// appends the user's entry, streams the response through
/// [`accumulate`] one fragment at a time and commits each resulting
/// log before asking for the next fragment. Only one submission may be
/// in flight; any other is rejected while it runs.
pub struct ChatSession<T, R, N> {
    transport: T,
    renderer: R,
    notifier: N,
    model: String,
    log: RwLock<Log>,
    busy: AtomicBool,
    last_user_id: AtomicI64,
}

impl<T, R, N> ChatSession<T, R, N>
where
    T: Transport,
    R: Renderer,
    N: Notifier,
{
    pub fn new(transport: T, renderer: R, notifier: N, model: &str) -> Self {
        Self {
            transport,
            renderer,
            notifier,
            model: model.to_string(),
            log: RwLock::new(Log::new()),
            busy: AtomicBool::new(false),
            last_user_id: AtomicI64::new(0),
        }
    }

    /// Starts the log with a system entry that is sent as context with
    /// every request.
    pub fn with_system_message(self, system_message: &str) -> Self {
        self.write_log()
            .push(Entry::new("system", &self.model, Role::System, system_message));
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Swaps in a newly built transport, e.g. after the API key changed.
    pub fn replace_transport(&mut self, transport: T) {
        self.transport = transport;
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// A snapshot of the current log.
    pub fn log(&self) -> Log {
        self.read_log().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Sends `input` as the next user turn and streams the reply into
    /// the log.
    ///
    /// Errors never escape: a failed stream is reported through the
    /// notifier and the partial reply is left in place.
    pub async fn submit(&self, input: &str) -> SubmitOutcome {
        if self.is_busy() {
            tracing::debug!("Ignoring submit while a response is streaming");
            return SubmitOutcome::Busy;
        }
        let prompt = input.trim();
        if prompt.is_empty() {
            return SubmitOutcome::Empty;
        }
        let Some(_busy) = BusyGuard::acquire(&self.busy) else {
            return SubmitOutcome::Busy;
        };

        let messages = self.push_user_entry(prompt);

        match self.stream_response(messages).await {
            Ok(()) => SubmitOutcome::Completed,
            Err(err) => {
                tracing::error!("Streaming response failed: {:?}", err);
                self.notifier
                    .notify(Notification::error(&failure_message(&err)));
                SubmitOutcome::Failed
            }
        }
    }

    /// Appends the user's entry, renders, and returns the transcript
    /// to send.
    fn push_user_entry(&self, prompt: &str) -> Vec<Message> {
        let messages = {
            let mut log = self.write_log();
            let mut id = self.next_user_id();
            while log.contains(&id) {
                id = self.next_user_id();
            }
            log.push(Entry::new(&id, &self.model, Role::User, prompt));
            log.messages()
        };
        self.renderer.render(&self.read_log());
        messages
    }

    async fn stream_response(&self, messages: Vec<Message>) -> Result<(), Error> {
        let mut stream = self.transport.stream(messages, &self.model).await?;

        while let Some(fragment) = stream.next().await {
            self.commit(&fragment?);
        }

        Ok(())
    }

    /// Folds `fragment` into the log under the write lock, then renders.
    fn commit(&self, fragment: &Fragment) {
        {
            let mut log = self.write_log();
            let current = std::mem::take(&mut *log);
            *log = accumulate(current, fragment);
        }
        self.renderer.render(&self.read_log());
    }

    /// Millisecond timestamp, bumped when needed so ids never repeat.
    fn next_user_id(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let prev = self.last_user_id.fetch_max(now, Ordering::AcqRel);
        let id = if now > prev {
            now
        } else {
            self.last_user_id.fetch_add(1, Ordering::AcqRel) + 1
        };
        id.to_string()
    }

    fn read_log(&self) -> RwLockReadGuard<'_, Log> {
        self.log.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_log(&self) -> RwLockWriteGuard<'_, Log> {
        self.log.write().unwrap_or_else(PoisonError::into_inner)
    }
}
