//! Postponed-message buffer and delivered-message log
//!
//! The pending buffer is an unordered multiset: position carries no meaning
//! and removal swaps the last element into the freed slot. The delivered log
//! is the opposite, an append-only record of local delivery order.

use causeway_clock::Message;

/// Messages that have arrived but are not yet causally deliverable.
#[derive(Debug, Clone, Default)]
pub struct PendingBuffer {
    messages: Vec<Message>,
}

impl PendingBuffer {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    /// Hold a message until it becomes deliverable.
    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Remove every entry whose index is in `marked`.
    ///
    /// Indices refer to positions before any removal. Surviving entries may
    /// be reordered.
    pub fn remove_marked(&mut self, marked: &[usize]) {
        let mut marked = marked.to_vec();
        marked.sort_unstable();
        marked.dedup();
        // Highest first, so swap_remove never moves an entry we still need.
        for index in marked.into_iter().rev() {
            if index < self.messages.len() {
                self.messages.swap_remove(index);
            }
        }
    }

    pub fn contains(&self, msg: &Message) -> bool {
        self.messages.iter().any(|m| m.id() == msg.id())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Messages in the order this process delivered them.
#[derive(Debug, Clone, Default)]
pub struct DeliveredLog {
    entries: Vec<Message>,
}

impl DeliveredLog {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, msg: Message) {
        self.entries.push(msg);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.entries
    }

    pub fn last(&self) -> Option<&Message> {
        self.entries.last()
    }

    /// Position of a message in delivery order.
    pub fn position(&self, msg: &Message) -> Option<usize> {
        self.entries.iter().position(|m| m.id() == msg.id())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
