//! Presence and typing projections.
//!
//! Both are soft real-time: last write wins wholesale, no history, and
//! being slightly stale is acceptable — unlike message state.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use concorde_shared::event::SyncEvent;
use concorde_shared::types::UserId;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PresenceStatus {
    Online,
    Away,
    Offline,
}

impl PresenceStatus {
    /// Map the wire presence value. `unavailable` is the protocol's word
    /// for away; anything unknown reads as offline.
    fn from_wire(value: &str) -> Self {
        match value {
            "online" => PresenceStatus::Online,
            "unavailable" => PresenceStatus::Away,
            _ => PresenceStatus::Offline,
        }
    }
}

/// A user's presence. Identity is the user id; overwritten wholesale on
/// each update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceRecord {
    pub user_id: UserId,
    pub status: PresenceStatus,
    /// Milliseconds since the user was last active, when reported.
    pub last_active_ago_ms: Option<i64>,
    pub status_msg: Option<String>,
}

/// Project a presence event into the sender's record.
pub fn project_presence(event: &SyncEvent) -> Result<PresenceRecord> {
    let status = event
        .content_str("presence")
        .ok_or(EngineError::Malformed("presence"))?;

    Ok(PresenceRecord {
        user_id: event.sender.clone(),
        status: PresenceStatus::from_wire(status),
        last_active_ago_ms: event.content.get("last_active_ago").and_then(Value::as_i64),
        status_msg: event
            .content_str("status_msg")
            .map(ToOwned::to_owned),
    })
}

/// Extract the user set from a typing event. The returned list replaces
/// the room's typing set wholesale; an empty list clears it.
pub fn parse_typing(event: &SyncEvent) -> Result<Vec<UserId>> {
    let ids = event
        .content
        .get("user_ids")
        .and_then(Value::as_array)
        .ok_or(EngineError::Malformed("user_ids"))?;

    Ok(ids
        .iter()
        .filter_map(Value::as_str)
        .map(UserId::new)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    use concorde_shared::constants::{EVENT_PRESENCE, EVENT_TYPING};
    use concorde_shared::types::{EventId, RoomId};

    fn event(event_type: &str, content: Value) -> SyncEvent {
        SyncEvent {
            event_id: EventId::new("$e"),
            room_id: RoomId::new("!r:hs"),
            event_type: event_type.to_owned(),
            sender: UserId::new("@alice:hs"),
            origin_server_ts: Utc::now(),
            state_key: None,
            content,
            decryption_failed: false,
            redacted_because: None,
        }
    }

    #[test]
    fn presence_maps_unavailable_to_away() {
        let record = project_presence(&event(
            EVENT_PRESENCE,
            json!({"presence": "unavailable", "last_active_ago": 30_000, "status_msg": "brb"}),
        ))
        .unwrap();
        assert_eq!(record.status, PresenceStatus::Away);
        assert_eq!(record.last_active_ago_ms, Some(30_000));
        assert_eq!(record.status_msg.as_deref(), Some("brb"));
    }

    #[test]
    fn unknown_presence_reads_as_offline() {
        let record =
            project_presence(&event(EVENT_PRESENCE, json!({"presence": "banana"}))).unwrap();
        assert_eq!(record.status, PresenceStatus::Offline);
    }

    #[test]
    fn missing_presence_field_is_malformed() {
        let err = project_presence(&event(EVENT_PRESENCE, json!({}))).unwrap_err();
        assert!(matches!(err, EngineError::Malformed("presence")));
    }

    #[test]
    fn typing_set_parses_and_may_be_empty() {
        let users = parse_typing(&event(
            EVENT_TYPING,
            json!({"user_ids": ["@a:hs", "@b:hs"]}),
        ))
        .unwrap();
        assert_eq!(users, vec![UserId::new("@a:hs"), UserId::new("@b:hs")]);

        let empty = parse_typing(&event(EVENT_TYPING, json!({"user_ids": []}))).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn typing_without_user_ids_is_malformed() {
        let err = parse_typing(&event(EVENT_TYPING, json!({}))).unwrap_err();
        assert!(matches!(err, EngineError::Malformed("user_ids")));
    }
}
