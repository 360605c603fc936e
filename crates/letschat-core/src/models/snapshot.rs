use serde::{Deserialize, Serialize};

use super::Message;

/// Full message history at a point in time, newest first.
///
/// A snapshot is replaced wholesale on every update and never mutated in
/// place, so readers holding an `Arc<Snapshot>` always see a consistent list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    messages: Vec<Message>,
}

impl Snapshot {
    /// Wrap messages exactly as the remote store ordered them.
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot ordered by creation time, newest first.
    /// The sort is stable: equal timestamps keep their input order.
    pub fn newest_first(mut messages: Vec<Message>) -> Self {
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Self { messages }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn newest(&self) -> Option<&Message> {
        self.messages.first()
    }

    /// Iterate oldest first, the order a chat transcript is read in
    pub fn chronological(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().rev()
    }
}

impl From<Vec<Message>> for Snapshot {
    fn from(messages: Vec<Message>) -> Self {
        Self::new(messages)
    }
}
