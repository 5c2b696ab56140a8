//! Room-level state accumulation and the [`RoomSummary`] projection.
//!
//! State events replace prior values under the same type + state key; the
//! accumulated [`RoomState`] is the single source the summary, member, and
//! call projections read from. Space parenthood is declared by edges in the
//! *parent's* state, so `resolve_parents` is a second pass over all rooms.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use concorde_shared::constants::{
    EVENT_CALL_MEMBER, EVENT_CALL_MEMBER_LEGACY, EVENT_ROOM_ACCESS, EVENT_ROOM_AVATAR,
    EVENT_ROOM_CREATE, EVENT_ROOM_MEMBER, EVENT_ROOM_NAME, EVENT_ROOM_PINNED,
    EVENT_ROOM_POWER_LEVELS, EVENT_ROOM_TOPIC, EVENT_SPACE_CHILD, ROOM_TYPE_SPACE,
};
use concorde_shared::event::SyncEvent;
use concorde_shared::media;
use concorde_shared::types::{EventId, RoomId, UserId};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// How the room presents in navigation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RoomKind {
    Normal,
    Space,
    Voice,
}

/// The local user's membership in the room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MembershipStatus {
    Joined,
    Invited,
    Left,
}

/// Raw per-user member state, as accumulated from `m.room.member` events.
#[derive(Debug, Clone, Default)]
pub struct MemberState {
    pub display_name: Option<String>,
    pub avatar_mxc: Option<String>,
    /// Wire membership value: `join`, `invite`, `leave`, `ban`.
    pub membership: String,
}

/// Power-level assignments for a room.
#[derive(Debug, Clone, Default)]
pub struct PowerLevels {
    pub users: BTreeMap<UserId, i64>,
    pub users_default: i64,
}

impl PowerLevels {
    pub fn level_for(&self, user: &UserId) -> i64 {
        self.users.get(user).copied().unwrap_or(self.users_default)
    }
}

#[derive(Debug, Deserialize)]
struct PowerLevelsContent {
    #[serde(default)]
    users: BTreeMap<String, i64>,
    #[serde(default)]
    users_default: i64,
}

#[derive(Debug, Deserialize)]
struct MemberContent {
    membership: String,
    displayname: Option<String>,
    avatar_url: Option<String>,
    #[serde(default)]
    is_direct: bool,
}

/// Which projections an applied state event invalidated.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StateImpact {
    pub summary: bool,
    pub members: bool,
    pub call: bool,
    pub hierarchy: bool,
}

/// Accumulated state of one room.
#[derive(Debug)]
pub struct RoomState {
    pub room_id: RoomId,
    pub name: Option<String>,
    pub topic: Option<String>,
    pub avatar_mxc: Option<String>,
    /// The `type` field of `m.room.create` content, when present.
    pub create_type: Option<String>,
    pub power_levels: PowerLevels,
    members: BTreeMap<UserId, MemberState>,
    /// Minimum power level required to view the room. 0 = everyone.
    pub access_floor: i64,
    /// Child edges, in discovery order. Only meaningful for spaces.
    pub space_children: Vec<RoomId>,
    /// Latest call-membership state event per state key.
    pub call_member_events: BTreeMap<String, SyncEvent>,
    pub pinned: Vec<EventId>,
    pub local_membership: MembershipStatus,
    pub invite_sender: Option<UserId>,
    pub is_dm: bool,
    pub unread_count: u64,
    pub last_activity_ts: Option<DateTime<Utc>>,
}

impl RoomState {
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            name: None,
            topic: None,
            avatar_mxc: None,
            create_type: None,
            power_levels: PowerLevels::default(),
            members: BTreeMap::new(),
            access_floor: 0,
            space_children: Vec::new(),
            call_member_events: BTreeMap::new(),
            pinned: Vec::new(),
            local_membership: MembershipStatus::Joined,
            invite_sender: None,
            is_dm: false,
            unread_count: 0,
            last_activity_ts: None,
        }
    }

    pub fn member(&self, user: &UserId) -> Option<&MemberState> {
        self.members.get(user)
    }

    pub fn members(&self) -> &BTreeMap<UserId, MemberState> {
        &self.members
    }

    pub fn is_space(&self) -> bool {
        self.create_type.as_deref() == Some(ROOM_TYPE_SPACE)
    }

    /// Apply one state event. Returns which projections went stale, or a
    /// [`EngineError::Malformed`] if a required field is missing — in which
    /// case the prior state is untouched.
    pub fn apply_state(&mut self, event: &SyncEvent, local_user: &UserId) -> Result<StateImpact> {
        let mut impact = StateImpact::default();

        match event.event_type.as_str() {
            EVENT_ROOM_CREATE => {
                self.create_type = event.content_str("type").map(ToOwned::to_owned);
                impact.summary = true;
            }

            EVENT_ROOM_NAME => {
                let name = event
                    .content_str("name")
                    .ok_or(EngineError::Malformed("name"))?;
                self.name = Some(name.to_owned());
                impact.summary = true;
            }

            EVENT_ROOM_TOPIC => {
                let topic = event
                    .content_str("topic")
                    .ok_or(EngineError::Malformed("topic"))?;
                self.topic = Some(topic.to_owned());
                impact.summary = true;
            }

            EVENT_ROOM_AVATAR => {
                let url = event
                    .content_str("url")
                    .ok_or(EngineError::Malformed("url"))?;
                self.avatar_mxc = Some(url.to_owned());
                impact.summary = true;
            }

            EVENT_ROOM_POWER_LEVELS => {
                let content: PowerLevelsContent = serde_json::from_value(event.content.clone())
                    .map_err(|_| EngineError::Malformed("power levels content"))?;
                self.power_levels = PowerLevels {
                    users: content
                        .users
                        .into_iter()
                        .map(|(user, level)| (UserId::new(user), level))
                        .collect(),
                    users_default: content.users_default,
                };
                impact.summary = true;
                impact.members = true;
            }

            EVENT_ROOM_MEMBER => {
                let target = event
                    .state_key
                    .as_deref()
                    .filter(|k| !k.is_empty())
                    .ok_or(EngineError::Malformed("state_key"))?;
                let content: MemberContent = serde_json::from_value(event.content.clone())
                    .map_err(|_| EngineError::Malformed("membership"))?;

                let target = UserId::new(target);
                if target == *local_user {
                    match content.membership.as_str() {
                        "join" => self.local_membership = MembershipStatus::Joined,
                        "invite" => {
                            self.local_membership = MembershipStatus::Invited;
                            self.invite_sender = Some(event.sender.clone());
                        }
                        _ => self.local_membership = MembershipStatus::Left,
                    }
                    if content.is_direct {
                        self.is_dm = true;
                    }
                    impact.summary = true;
                }

                self.members.insert(
                    target,
                    MemberState {
                        display_name: content.displayname,
                        avatar_mxc: content.avatar_url,
                        membership: content.membership,
                    },
                );
                impact.members = true;
            }

            EVENT_SPACE_CHILD => {
                let child = event
                    .state_key
                    .as_deref()
                    .filter(|k| !k.is_empty())
                    .ok_or(EngineError::Malformed("state_key"))?;
                let child = RoomId::new(child);

                // An edge with routing servers is live; empty content
                // retracts it.
                let live = event
                    .content
                    .get("via")
                    .and_then(Value::as_array)
                    .map(|via| !via.is_empty())
                    .unwrap_or(false);
                if live {
                    if !self.space_children.contains(&child) {
                        self.space_children.push(child);
                    }
                } else {
                    self.space_children.retain(|c| *c != child);
                }
                impact.hierarchy = true;
            }

            EVENT_ROOM_ACCESS => {
                self.access_floor = event
                    .content
                    .get("min_power_level")
                    .and_then(Value::as_i64)
                    .ok_or(EngineError::Malformed("min_power_level"))?;
                impact.summary = true;
            }

            EVENT_ROOM_PINNED => {
                self.pinned = event
                    .content
                    .get("pinned")
                    .and_then(Value::as_array)
                    .ok_or(EngineError::Malformed("pinned"))?
                    .iter()
                    .filter_map(Value::as_str)
                    .map(EventId::new)
                    .collect();
                impact.summary = true;
            }

            EVENT_CALL_MEMBER_LEGACY | EVENT_CALL_MEMBER => {
                let state_key = event
                    .state_key
                    .clone()
                    .ok_or(EngineError::Malformed("state_key"))?;
                self.call_member_events.insert(state_key, event.clone());
                impact.call = true;
                // Seeing call membership flips the room kind to voice.
                impact.summary = true;
            }

            // Unknown state types are ignored, not an error.
            _ => {}
        }

        Ok(impact)
    }
}

/// A projected room summary. Identity is the room id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub name: String,
    pub topic: Option<String>,
    pub avatar_url: Option<String>,
    pub kind: RoomKind,
    pub membership: MembershipStatus,
    /// Resolved from space-child edges by `resolve_parents`, never from the
    /// room's own state.
    pub parent_space_id: Option<RoomId>,
    /// Minimum power level required to view. Consumers filter at read time;
    /// the projection stays complete.
    pub min_power_level_to_view: i64,
    pub my_power_level: i64,
    pub is_dm: bool,
    pub invite_sender: Option<UserId>,
    pub unread_count: u64,
    pub last_activity_ts: Option<DateTime<Utc>>,
    pub pinned: Vec<EventId>,
}

/// Project a room's accumulated state into its summary.
///
/// `parent_space_id` is left as `None`; hierarchy resolution is a separate
/// pass because the declaring edge lives in the parent's state.
pub fn project_room(state: &RoomState, config: &EngineConfig) -> RoomSummary {
    let kind = if state.is_space() {
        RoomKind::Space
    } else if !state.call_member_events.is_empty() {
        RoomKind::Voice
    } else {
        RoomKind::Normal
    };

    RoomSummary {
        room_id: state.room_id.clone(),
        name: state
            .name
            .clone()
            .unwrap_or_else(|| state.room_id.0.clone()),
        topic: state.topic.clone(),
        avatar_url: media::avatar_url(state.avatar_mxc.as_deref(), &config.homeserver_url),
        kind,
        membership: state.local_membership,
        parent_space_id: None,
        min_power_level_to_view: state.access_floor,
        my_power_level: state.power_levels.level_for(&config.local_user_id),
        is_dm: state.is_dm,
        invite_sender: state.invite_sender.clone(),
        unread_count: state.unread_count,
        last_activity_ts: state.last_activity_ts,
        pinned: state.pinned.clone(),
    }
}

/// Resolve the space hierarchy over the full room set.
///
/// `edges` maps each space to its child edges in discovery order; spaces are
/// visited in map order, so the outcome is deterministic. When two spaces
/// claim the same child the first discovered wins and the conflict is
/// logged. The protocol treats the hierarchy as a forest by convention only
/// — nothing here assumes it.
pub fn resolve_parents(edges: &BTreeMap<RoomId, Vec<RoomId>>) -> BTreeMap<RoomId, RoomId> {
    let mut parents: BTreeMap<RoomId, RoomId> = BTreeMap::new();

    for (space, children) in edges {
        for child in children {
            if child == space {
                warn!(room = %space, "Space lists itself as a child, ignoring");
                continue;
            }
            match parents.get(child) {
                None => {
                    parents.insert(child.clone(), space.clone());
                }
                Some(existing) if existing != space => {
                    warn!(
                        child = %child,
                        kept = %existing,
                        conflicting = %space,
                        "Room claimed by two spaces, keeping first"
                    );
                }
                Some(_) => {}
            }
        }
    }

    parents
}
