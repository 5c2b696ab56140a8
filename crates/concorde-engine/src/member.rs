//! Projection of per-room member state into ordered [`Member`] views.

use serde::{Deserialize, Serialize};

use concorde_shared::media;
use concorde_shared::roles;
use concorde_shared::types::{RoomId, UserId};

use crate::config::EngineConfig;
use crate::room::RoomState;

/// A projected room member. Identity is (room id, user id).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Member {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
    /// Wire membership value: `join` or `invite`.
    pub membership: String,
    pub power_level: i64,
    /// Badge name for the member's role tier, `None` for the base tier.
    pub role_name: Option<String>,
}

/// Recompute the member list for one room, wholesale.
///
/// Joined and invited members are included; departed ones are not. Ordered
/// by role level descending, then display name ascending (case-insensitive),
/// then user id as a final tie-break.
pub fn project_members(state: &RoomState, config: &EngineConfig) -> Vec<Member> {
    let mut members: Vec<Member> = state
        .members()
        .iter()
        .filter(|(_, m)| matches!(m.membership.as_str(), "join" | "invite"))
        .map(|(user_id, m)| {
            let power_level = state.power_levels.level_for(user_id);
            Member {
                room_id: state.room_id.clone(),
                user_id: user_id.clone(),
                display_name: m
                    .display_name
                    .clone()
                    .unwrap_or_else(|| user_id.to_string()),
                avatar_url: media::avatar_url(m.avatar_mxc.as_deref(), &config.homeserver_url),
                membership: m.membership.clone(),
                power_level,
                role_name: roles::role_name(power_level).map(ToOwned::to_owned),
            }
        })
        .collect();

    members.sort_by(|a, b| {
        b.power_level
            .cmp(&a.power_level)
            .then_with(|| {
                a.display_name
                    .to_lowercase()
                    .cmp(&b.display_name.to_lowercase())
            })
            .then_with(|| a.user_id.cmp(&b.user_id))
    });

    members
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    use concorde_shared::constants::{EVENT_ROOM_MEMBER, EVENT_ROOM_POWER_LEVELS};
    use concorde_shared::event::SyncEvent;
    use concorde_shared::types::EventId;

    fn config() -> EngineConfig {
        EngineConfig::new(UserId::new("@me:hs"), "https://hs.example")
    }

    fn member_event(user: &str, membership: &str, displayname: Option<&str>) -> SyncEvent {
        SyncEvent {
            event_id: EventId::new(format!("$m-{user}")),
            room_id: RoomId::new("!r:hs"),
            event_type: EVENT_ROOM_MEMBER.to_owned(),
            sender: UserId::new(user),
            origin_server_ts: Utc::now(),
            state_key: Some(user.to_owned()),
            content: json!({"membership": membership, "displayname": displayname}),
            decryption_failed: false,
            redacted_because: None,
        }
    }

    fn room_with_members() -> RoomState {
        let mut state = RoomState::new(RoomId::new("!r:hs"));
        let local = UserId::new("@me:hs");
        for (user, membership, name) in [
            ("@zoe:hs", "join", Some("zoe")),
            ("@admin:hs", "join", Some("Root")),
            ("@anna:hs", "join", Some("Anna")),
            ("@gone:hs", "leave", Some("Gone")),
            ("@new:hs", "invite", Some("Newcomer")),
        ] {
            state
                .apply_state(&member_event(user, membership, name), &local)
                .unwrap();
        }
        state
            .apply_state(
                &SyncEvent {
                    event_id: EventId::new("$pl"),
                    room_id: RoomId::new("!r:hs"),
                    event_type: EVENT_ROOM_POWER_LEVELS.to_owned(),
                    sender: UserId::new("@admin:hs"),
                    origin_server_ts: Utc::now(),
                    state_key: Some(String::new()),
                    content: json!({"users": {"@admin:hs": 100}, "users_default": 0}),
                    decryption_failed: false,
                    redacted_because: None,
                },
                &local,
            )
            .unwrap();
        state
    }

    #[test]
    fn ordered_by_role_then_name() {
        let members = project_members(&room_with_members(), &config());
        let names: Vec<&str> = members.iter().map(|m| m.display_name.as_str()).collect();
        assert_eq!(names, vec!["Root", "Anna", "Newcomer", "zoe"]);
        assert_eq!(members[0].role_name.as_deref(), Some("Owner"));
        assert_eq!(members[1].role_name, None);
    }

    #[test]
    fn departed_members_are_excluded() {
        let members = project_members(&room_with_members(), &config());
        assert!(members.iter().all(|m| m.user_id != UserId::new("@gone:hs")));
    }

    #[test]
    fn display_name_falls_back_to_user_id() {
        let mut state = RoomState::new(RoomId::new("!r:hs"));
        state
            .apply_state(
                &member_event("@anon:hs", "join", None),
                &UserId::new("@me:hs"),
            )
            .unwrap();
        let members = project_members(&state, &config());
        assert_eq!(members[0].display_name, "@anon:hs");
    }
}
