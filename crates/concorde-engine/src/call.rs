//! Call-membership reconciliation.
//!
//! Three mutually incompatible wire formats for "who is in this call" have
//! shipped over the protocol's history. Each format gets its own pure
//! try-parse function; they are composed in oldest-first order and the
//! first one that recognises the content decides. The participant set is
//! rebuilt from scratch on every scan — there is no incremental diff, so
//! the formats can never drift apart. Legacy expiry compares against a
//! caller-supplied `now`, which advances independently of event arrival,
//! so results must not be cached across scans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use concorde_shared::event::SyncEvent;
use concorde_shared::media;
use concorde_shared::types::{RoomId, UserId};

use crate::config::EngineConfig;
use crate::room::RoomState;

/// A participant in a room's call. Identity is (room id, user id); a user
/// with several active devices appears once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallParticipant {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub speaking: bool,
    pub audio_muted: bool,
    pub video_muted: bool,
    /// Opaque handle into the call transport's media feed, when attached.
    pub feed_id: Option<String>,
}

/// Partial update reported by the call transport for one participant.
#[derive(Debug, Default, Clone)]
pub struct FeedUpdate {
    pub speaking: Option<bool>,
    pub audio_muted: Option<bool>,
    pub video_muted: Option<bool>,
    pub feed_id: Option<String>,
}

/// Extract the user id from a call-membership state key.
///
/// Modern composite keys have the form `_<userId>_<deviceId>`: strip the
/// leading underscore, then trim the final underscore-delimited segment.
/// Underscores inside the user id survive because the split is from the
/// right. Plain keys are the user id itself.
pub fn user_from_state_key(state_key: &str) -> Option<UserId> {
    if let Some(rest) = state_key.strip_prefix('_') {
        let (user, _device) = rest.rsplit_once('_')?;
        if user.is_empty() {
            return None;
        }
        Some(UserId::new(user))
    } else if state_key.is_empty() {
        None
    } else {
        Some(UserId::new(state_key))
    }
}

/// Format (a): a call object nesting per-device lists under `m.calls`.
fn try_nested_calls(content: &Value) -> Option<bool> {
    let calls = content.get("m.calls")?.as_array()?;
    Some(calls.iter().any(|call| {
        call.get("m.devices")
            .and_then(Value::as_array)
            .map(|devices| !devices.is_empty())
            .unwrap_or(false)
    }))
}

/// Format (b): a flat `memberships` list with optional expiry computed as
/// `created_ts + expires`. A record without an expiry never expires; a
/// record without `created_ts` is aged from the event's own timestamp.
fn try_flat_memberships(content: &Value, event_ts: DateTime<Utc>, now: DateTime<Utc>) -> Option<bool> {
    let memberships = content.get("memberships")?.as_array()?;
    Some(memberships.iter().any(|membership| {
        let created_ts = membership
            .get("created_ts")
            .and_then(Value::as_i64)
            .unwrap_or_else(|| event_ts.timestamp_millis());
        match membership.get("expires").and_then(Value::as_i64) {
            Some(expires) => created_ts + expires > now.timestamp_millis(),
            None => true,
        }
    }))
}

/// Format (c): a per-device state-keyed record, active simply by presence
/// with non-empty content (leaving writes an empty object).
fn try_session_keyed(state_key: &str, content: &Value) -> Option<bool> {
    if !state_key.starts_with('_') {
        return None;
    }
    Some(
        content
            .as_object()
            .map(|object| !object.is_empty())
            .unwrap_or(false),
    )
}

fn is_active(event: &SyncEvent, state_key: &str, now: DateTime<Utc>) -> bool {
    try_nested_calls(&event.content)
        .or_else(|| try_flat_memberships(&event.content, event.origin_server_ts, now))
        .or_else(|| try_session_keyed(state_key, &event.content))
        .unwrap_or(false)
}

/// Rebuild the participant list for a room from its call-membership state
/// events. A user is active if any of their device-keyed events resolves
/// active; the first active device wins and further devices for the same
/// user are not modelled as separate participants.
pub fn reconcile_call_members(
    state: &RoomState,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Vec<CallParticipant> {
    let mut participants: Vec<CallParticipant> = Vec::new();

    for (state_key, event) in &state.call_member_events {
        let Some(user_id) = user_from_state_key(state_key) else {
            warn!(room = %state.room_id, state_key = %state_key, "Unparseable call membership state key");
            continue;
        };
        if participants.iter().any(|p| p.user_id == user_id) {
            continue;
        }
        if !is_active(event, state_key, now) {
            continue;
        }

        let profile = state.member(&user_id);
        participants.push(CallParticipant {
            room_id: state.room_id.clone(),
            user_id: user_id.clone(),
            display_name: profile
                .and_then(|p| p.display_name.clone())
                .unwrap_or_else(|| user_id.to_string()),
            avatar_url: profile
                .and_then(|p| media::avatar_url(p.avatar_mxc.as_deref(), &config.homeserver_url)),
            speaking: false,
            audio_muted: false,
            video_muted: false,
            feed_id: None,
        });
    }

    participants
}

/// Merge a transport feed update into the current participant list.
/// Returns `false` when the user is not an active participant.
pub fn apply_feed_update(
    participants: &mut [CallParticipant],
    user_id: &UserId,
    update: &FeedUpdate,
) -> bool {
    let Some(participant) = participants.iter_mut().find(|p| p.user_id == *user_id) else {
        return false;
    };
    if let Some(speaking) = update.speaking {
        participant.speaking = speaking;
    }
    if let Some(audio_muted) = update.audio_muted {
        participant.audio_muted = audio_muted;
    }
    if let Some(video_muted) = update.video_muted {
        participant.video_muted = video_muted;
    }
    if let Some(feed_id) = &update.feed_id {
        participant.feed_id = Some(feed_id.clone());
    }
    true
}
