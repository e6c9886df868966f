//! Bounded recent-chat buffer handed to late joiners.

use shared::ChatMessage;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct ChatLog {
    messages: VecDeque<ChatMessage>,
    capacity: usize,
}

impl ChatLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `msg`, dropping the oldest entries once the log is over capacity.
    pub fn append(&mut self, msg: ChatMessage) {
        self.messages.push_back(msg);
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
    }

    /// The last `n` messages in arrival order, or all of them if fewer exist.
    pub fn recent(&self, n: usize) -> Vec<ChatMessage> {
        let skip = self.messages.len().saturating_sub(n);
        self.messages.iter().skip(skip).cloned().collect()
    }

    /// Timestamp of the newest message, used to keep server time non-decreasing.
    pub fn last_timestamp(&self) -> Option<u64> {
        self.messages.back().map(|msg| msg.timestamp)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
