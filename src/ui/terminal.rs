//! Plain terminal presentation of the conversation log.
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use crate::chat::{Log, Notification, NotificationLevel, Notifier, Renderer};
use crate::openai::Role;

/// Drops terminal control characters (escape sequences, carriage
/// returns, bells) from untrusted text. Newlines and tabs are kept.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

struct RenderState<W> {
    out: W,
    // Bytes of sanitized content already written, per entry id
    written: HashMap<String, usize>,
}

/// Writes assistant replies as they grow.
///
/// Entry content only ever grows, so each render writes just the part
/// of each entry that has not been written yet. The user's own turns
/// are already on screen from the line editor and are not echoed.
pub struct TerminalRenderer<W> {
    state: Mutex<RenderState<W>>,
}

impl TerminalRenderer<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            state: Mutex::new(RenderState {
                out,
                written: HashMap::new(),
            }),
        }
    }

    pub fn into_inner(self) -> W {
        self.state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .out
    }

    fn write_log(state: &mut RenderState<W>, log: &Log) -> io::Result<()> {
        for entry in log {
            if entry.role != Role::Assistant {
                state.written.insert(entry.id.clone(), entry.content.len());
                continue;
            }

            let content = sanitize(&entry.content);
            let written = match state.written.get(&entry.id) {
                Some(written) => *written,
                None => {
                    let label = if entry.model.is_empty() {
                        "assistant"
                    } else {
                        entry.model.as_str()
                    };
                    write!(state.out, "\n[{}]\n", sanitize(label))?;
                    0
                }
            };

            if let Some(rest) = content.get(written..) {
                state.out.write_all(rest.as_bytes())?;
            }
            state.written.insert(entry.id.clone(), content.len());
        }
        state.out.flush()
    }
}

impl<W: Write + Send> Renderer for TerminalRenderer<W> {
    fn render(&self, log: &Log) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = Self::write_log(&mut state, log) {
            tracing::warn!("Failed to write response to terminal: {}", e);
        }
    }
}

/// Writes notifications on their own line.
pub struct TerminalNotifier<W> {
    out: Mutex<W>,
}

impl TerminalNotifier<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write> TerminalNotifier<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> Notifier for TerminalNotifier<W> {
    fn notify(&self, notification: Notification) {
        let prefix = match notification.level {
            NotificationLevel::Success => "ok",
            NotificationLevel::Error => "error",
        };
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "\n[{}] {}", prefix, sanitize(&notification.message)) {
            tracing::warn!("Failed to write notification: {}", e);
        }
    }
}
