//! The core models for a streamed chat: entries in the conversation
//! log and the fragments that build them up.
use serde::Serialize;

use crate::openai::{Message, Role};

/// One turn in the conversation log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub id: String,
    pub model: String,
    pub role: Role,
    pub content: String,
}

impl Entry {
    pub fn new(id: &str, model: &str, role: Role, content: &str) -> Self {
        Self {
            id: id.to_string(),
            model: model.to_string(),
            role,
            content: content.to_string(),
        }
    }

    /// The `{role, content}` pair sent to the completion endpoint.
    pub fn to_message(&self) -> Message {
        Message::new(self.role.clone(), &self.content)
    }
}

/// One incremental piece of a streamed response. All fragments of
/// the same response share an `id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragment {
    pub id: String,
    pub model: String,
    pub delta: String,
}

impl Fragment {
    pub fn new(id: &str, model: &str, delta: &str) -> Self {
        Self {
            id: id.to_string(),
            model: model.to_string(),
            delta: delta.to_string(),
        }
    }
}

/// The ordered conversation history for the current session.
///
/// Entries are only ever appended or extended in place. Ids are
/// unique; `push` refuses an entry whose id is already present.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Log(Vec<Entry>);

impl Log {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends `entry` unless an entry with the same id exists.
    /// Returns whether the entry was added.
    pub fn push(&mut self, entry: Entry) -> bool {
        if self.contains(&entry.id) {
            return false;
        }
        self.0.push(entry);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|e| e.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Entry> {
        self.0.iter().find(|e| e.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Entry> {
        self.0.iter_mut().find(|e| e.id == id)
    }

    pub fn last(&self) -> Option<&Entry> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.0.iter()
    }

    /// The transcript in the shape the completion endpoint expects.
    pub fn messages(&self) -> Vec<Message> {
        self.0.iter().map(Entry::to_message).collect()
    }
}

impl<'a> IntoIterator for &'a Log {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
