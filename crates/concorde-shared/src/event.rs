use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{EventId, RoomId, UserId};

/// Delivery direction of a sync batch.
///
/// Forward batches are live events appended to timelines; backward batches
/// are history backfill, prepended and never surfaced as notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
}

/// A single event as delivered by the sync transport.
///
/// The content payload is an opaque key/value structure; which fields are
/// meaningful depends on `event_type`. Events are immutable once observed —
/// later redactions and replacements arrive as separate events referencing
/// this one by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    pub event_id: EventId,
    pub room_id: RoomId,
    /// Protocol type tag, e.g. `m.room.message` or `m.room.member`.
    pub event_type: String,
    pub sender: UserId,
    pub origin_server_ts: DateTime<Utc>,
    /// Present on state events. The empty string is a valid state key.
    pub state_key: Option<String>,
    pub content: Value,
    /// Set by the crypto layer when an encrypted payload could not be
    /// decrypted. The event still projects, as a placeholder.
    pub decryption_failed: bool,
    /// Id of the redaction event, when the event was already redacted by
    /// the time the transport delivered it.
    pub redacted_because: Option<EventId>,
}

impl SyncEvent {
    /// Whether this is a state event (replaces prior value under the same
    /// type + state key).
    pub fn is_state(&self) -> bool {
        self.state_key.is_some()
    }

    /// Look up a top-level string field in the content payload.
    pub fn content_str(&self, key: &str) -> Option<&str> {
        self.content.get(key).and_then(Value::as_str)
    }

    /// The `msgtype` content field of message events.
    pub fn msgtype(&self) -> Option<&str> {
        self.content_str("msgtype")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(content: Value) -> SyncEvent {
        SyncEvent {
            event_id: EventId::new("$e1"),
            room_id: RoomId::new("!room:hs"),
            event_type: "m.room.message".into(),
            sender: UserId::new("@alice:hs"),
            origin_server_ts: Utc::now(),
            state_key: None,
            content,
            decryption_failed: false,
            redacted_because: None,
        }
    }

    #[test]
    fn content_accessors() {
        let ev = event(json!({"msgtype": "m.text", "body": "hi"}));
        assert_eq!(ev.msgtype(), Some("m.text"));
        assert_eq!(ev.content_str("body"), Some("hi"));
        assert_eq!(ev.content_str("missing"), None);
        assert!(!ev.is_state());
    }

    #[test]
    fn empty_state_key_is_state() {
        let mut ev = event(json!({}));
        ev.state_key = Some(String::new());
        assert!(ev.is_state());
    }
}
