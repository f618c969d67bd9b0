//! transcript.rs: bounded in-memory log of the messages exchanged, i.e. what the chat screen shows.

use serde::Serialize;

use crate::message::{MessageKey, OutboundMessage};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Written to the store under this key.
    Stored(MessageKey),
    /// The store write failed; the message was still shown locally.
    Unsaved,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    pub message: OutboundMessage,
    pub from_bot: bool,
    pub delivery: Delivery,
}

#[derive(Debug)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    cap: usize,
}

impl Transcript {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            entries: Vec::with_capacity(cap.min(10_000)),
            cap: cap.clamp(1, 10_000),
        }
    }

    pub fn push(&mut self, message: OutboundMessage, from_bot: bool, delivery: Delivery) {
        self.entries.push(TranscriptEntry {
            message,
            from_bot,
            delivery,
        });
        if self.entries.len() > self.cap {
            let excess = self.entries.len() - self.cap;
            self.entries.drain(0..excess);
        }
    }

    pub fn snapshot_last_n(&self, n: usize) -> Vec<TranscriptEntry> {
        let start = self.entries.len().saturating_sub(n);
        self.entries[start..].to_vec()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Sender;

    #[test]
    fn drops_oldest_beyond_cap() {
        let bot = Sender::new("b", "B");
        let mut t = Transcript::with_capacity(2);
        for i in 0..3 {
            t.push(bot.says(format!("m{i}"), "ts"), true, Delivery::Unsaved);
        }
        assert_eq!(t.len(), 2);
        let last = t.snapshot_last_n(10);
        assert_eq!(last[0].message.text, "m1");
        assert_eq!(t.snapshot_last_n(1)[0].message.text, "m2");
    }
}
