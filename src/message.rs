// src/message.rs
use serde::{Deserialize, Serialize};

/// One chat message as written under `channels/<conversation>/messages`.
/// Used for both bot output and the user's own replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    /// Human-readable local time, e.g. `Mar 4, 2017, 3:04:05 PM`.
    pub timestamp: String,
    /// Year of the event this message announces, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_year: Option<String>,
}

/// Who speaks for the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: String,
    pub name: String,
}

impl Sender {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn says(&self, text: impl Into<String>, timestamp: impl Into<String>) -> OutboundMessage {
        OutboundMessage {
            sender_id: self.id.clone(),
            sender_name: self.name.clone(),
            text: text.into(),
            timestamp: timestamp.into(),
            event_year: None,
        }
    }
}

/// Store key of an appended message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageKey(pub String);

impl std::fmt::Display for MessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_uses_store_field_names() {
        let mut m = Sender::new("bot", "Histobotto").says("hi", "Mar 4, 2017, 3:04:05 PM");
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["senderId"], "bot");
        assert_eq!(v["senderName"], "Histobotto");
        assert!(v.get("eventYear").is_none());

        m.event_year = Some("1969".into());
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["eventYear"], "1969");
    }
}
