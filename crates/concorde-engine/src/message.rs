//! Projection of raw timeline events into [`Message`] views.
//!
//! `project_message` is a pure function of its inputs — the event, the
//! room's relation index, the timeline (for reply lookup), and the room
//! state (for sender profiles) — so every resolution rule is testable
//! without a router.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use concorde_shared::event::SyncEvent;
use concorde_shared::media;
use concorde_shared::relations::{self, Relation};
use concorde_shared::types::{EventId, RoomId, UserId};

use crate::config::EngineConfig;
use crate::relation_index::RoomRelations;
use crate::room::RoomState;
use crate::timeline::Timeline;

/// Semantic kind of a message, derived from the `msgtype` content field.
///
/// Decryption failures are a kind of their own rather than an error, so the
/// rendering layer shows a placeholder instead of breaking the list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    File,
    Undecryptable,
}

impl MessageKind {
    fn from_msgtype(msgtype: Option<&str>) -> Self {
        match msgtype {
            Some("m.image") => MessageKind::Image,
            Some("m.video") => MessageKind::Video,
            Some("m.audio") => MessageKind::Audio,
            Some("m.file") => MessageKind::File,
            // m.text, m.emote, m.notice, and anything unknown render as text.
            _ => MessageKind::Text,
        }
    }
}

/// Preview of the message a reply refers to. Best-effort: absence means the
/// target is not locally known, which is a normal state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplyPreview {
    pub sender_name: String,
    pub body: String,
}

/// One reaction key with its contributing senders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReactionSummary {
    pub key: String,
    pub count: usize,
    pub senders: Vec<UserId>,
}

/// Summary attached to a thread root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadSummary {
    pub reply_count: usize,
    pub last_reply_ts: DateTime<Utc>,
}

/// A projected timeline message. Identity is (room id, event id); the view
/// is mutated in place by identity when a replacement, redaction, or
/// relation-index change arrives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub event_id: EventId,
    pub room_id: RoomId,
    pub sender: UserId,
    pub sender_name: String,
    pub sender_avatar: Option<String>,
    pub body: String,
    pub formatted_body: Option<String>,
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
    pub edited: bool,
    pub redacted: bool,
    pub decryption_failed: bool,
    pub reply_preview: Option<ReplyPreview>,
    pub reactions: Vec<ReactionSummary>,
    /// Present when this message roots a thread.
    pub thread: Option<ThreadSummary>,
    /// Present when this message is a reply inside the thread rooted at the
    /// given event.
    pub thread_root: Option<EventId>,
    /// Users explicitly mentioned by the event, for notification policy.
    pub mentions: Vec<UserId>,
}

/// Project one event into its current [`Message`] view.
pub fn project_message(
    event: &SyncEvent,
    relations: &RoomRelations,
    timeline: &Timeline,
    state: &RoomState,
    config: &EngineConfig,
) -> Message {
    let target_relations = relations.get(&event.event_id);

    // Edit resolution: the most recently arrived replacement wins, its
    // m.new_content if declared, the original content otherwise.
    let latest_replacement = target_relations.and_then(|t| t.latest_replacement());
    let edited = latest_replacement.is_some();
    let effective: &Value = latest_replacement
        .and_then(|r| relations::new_content(&r.content))
        .unwrap_or(&event.content);

    // Redaction overrides edit resolution.
    let redacted = event.redacted_because.is_some() || relations.is_redacted(&event.event_id);
    let (body, formatted_body) = if redacted {
        (String::new(), None)
    } else {
        (
            effective
                .get("body")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            effective
                .get("formatted_body")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned),
        )
    };

    let kind = if event.decryption_failed {
        MessageKind::Undecryptable
    } else {
        MessageKind::from_msgtype(effective.get("msgtype").and_then(Value::as_str))
    };

    let reactions = target_relations
        .map(|t| {
            t.annotations
                .iter()
                .map(|group| ReactionSummary {
                    key: group.key.clone(),
                    count: group.senders.len(),
                    senders: group.senders.iter().map(|(_, s)| s.clone()).collect(),
                })
                .collect()
        })
        .unwrap_or_default();

    let thread = target_relations
        .filter(|t| !t.thread_replies.is_empty())
        .map(|t| ThreadSummary {
            reply_count: t.thread_replies.len(),
            last_reply_ts: t
                .thread_replies
                .last()
                .map(|e| e.origin_server_ts)
                .unwrap_or(event.origin_server_ts),
        });

    let thread_root = match Relation::parse(&event.content) {
        Some(Relation::ThreadReply { target }) => Some(target),
        _ => None,
    };

    // Reply preview, best-effort by id lookup; unknown targets silently
    // yield no preview.
    let reply_preview = relations::reply_target(&event.content)
        .and_then(|target| timeline.get(&target))
        .map(|quoted| ReplyPreview {
            sender_name: quoted.sender_name.clone(),
            body: truncate_preview(&quoted.body, config.preview_max_chars),
        });

    let profile = state.member(&event.sender);
    let sender_name = profile
        .and_then(|p| p.display_name.clone())
        .unwrap_or_else(|| event.sender.to_string());
    let sender_avatar = profile
        .and_then(|p| media::avatar_url(p.avatar_mxc.as_deref(), &config.homeserver_url));

    let mentions = event
        .content
        .get("m.mentions")
        .and_then(|m| m.get("user_ids"))
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .map(UserId::new)
                .collect()
        })
        .unwrap_or_default();

    Message {
        event_id: event.event_id.clone(),
        room_id: event.room_id.clone(),
        sender: event.sender.clone(),
        sender_name,
        sender_avatar,
        body,
        formatted_body,
        kind,
        timestamp: event.origin_server_ts,
        edited,
        redacted,
        decryption_failed: event.decryption_failed,
        reply_preview,
        reactions,
        thread,
        thread_root,
        mentions,
    }
}

/// Clip a body for reply previews and notification text.
pub(crate) fn truncate_preview(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        body.to_owned()
    } else {
        let mut clipped: String = body.chars().take(max_chars).collect();
        clipped.push_str("...");
        clipped
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use serde_json::json;

    pub fn minimal_raw(event_id: &str) -> SyncEvent {
        SyncEvent {
            event_id: EventId::new(event_id),
            room_id: RoomId::new("!room:hs"),
            event_type: "m.room.message".into(),
            sender: UserId::new("@alice:hs"),
            origin_server_ts: Utc::now(),
            state_key: None,
            content: json!({"msgtype": "m.text", "body": "x"}),
            decryption_failed: false,
            redacted_because: None,
        }
    }

    pub fn minimal_message(event_id: &str, body: &str) -> Message {
        Message {
            event_id: EventId::new(event_id),
            room_id: RoomId::new("!room:hs"),
            sender: UserId::new("@alice:hs"),
            sender_name: "Alice".into(),
            sender_avatar: None,
            body: body.to_owned(),
            formatted_body: None,
            kind: MessageKind::Text,
            timestamp: Utc::now(),
            edited: false,
            redacted: false,
            decryption_failed: false,
            reply_preview: None,
            reactions: Vec::new(),
            thread: None,
            thread_root: None,
            mentions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::room::RoomState;

    fn config() -> EngineConfig {
        EngineConfig::new(UserId::new("@me:hs"), "https://hs.example")
    }

    fn message_event(event_id: &str, body: &str) -> SyncEvent {
        SyncEvent {
            event_id: EventId::new(event_id),
            room_id: RoomId::new("!room:hs"),
            event_type: "m.room.message".into(),
            sender: UserId::new("@alice:hs"),
            origin_server_ts: Utc::now(),
            state_key: None,
            content: json!({"msgtype": "m.text", "body": body}),
            decryption_failed: false,
            redacted_because: None,
        }
    }

    fn replacement_event(event_id: &str, target: &str, new_body: &str) -> SyncEvent {
        let mut ev = message_event(event_id, &format!("* {new_body}"));
        ev.content = json!({
            "msgtype": "m.text",
            "body": format!("* {new_body}"),
            "m.relates_to": {"rel_type": "m.replace", "event_id": target},
            "m.new_content": {"msgtype": "m.text", "body": new_body}
        });
        ev
    }

    fn empty_room() -> RoomState {
        RoomState::new(RoomId::new("!room:hs"))
    }

    #[test]
    fn plain_text_projection() {
        let ev = message_event("$1", "hello");
        let msg = project_message(
            &ev,
            &RoomRelations::default(),
            &Timeline::new(),
            &empty_room(),
            &config(),
        );
        assert_eq!(msg.body, "hello");
        assert_eq!(msg.kind, MessageKind::Text);
        assert!(!msg.edited);
        assert!(!msg.redacted);
        // No profile known: sender name falls back to the id.
        assert_eq!(msg.sender_name, "@alice:hs");
    }

    #[test]
    fn latest_edit_wins() {
        let ev = message_event("$1", "helo");
        let mut relations = RoomRelations::default();
        relations.apply(&replacement_event("$e1", "$1", "hello"));
        relations.apply(&replacement_event("$e2", "$1", "hello!"));

        let msg = project_message(&ev, &relations, &Timeline::new(), &empty_room(), &config());
        assert_eq!(msg.body, "hello!");
        assert!(msg.edited);
    }

    #[test]
    fn redaction_overrides_edit() {
        let ev = message_event("$1", "original");
        let mut relations = RoomRelations::default();
        relations.apply(&replacement_event("$e1", "$1", "edited"));
        relations.apply_redaction(&EventId::new("$1"));

        let msg = project_message(&ev, &relations, &Timeline::new(), &empty_room(), &config());
        assert_eq!(msg.body, "");
        assert_eq!(msg.formatted_body, None);
        assert!(msg.redacted);
    }

    #[test]
    fn reaction_summary_counts_senders() {
        let ev = message_event("$1", "hi");
        let mut relations = RoomRelations::default();
        for (id, sender) in [("$a1", "@bob:hs"), ("$a2", "@carol:hs")] {
            let mut annotation = message_event(id, "");
            annotation.event_type = "m.reaction".into();
            annotation.sender = UserId::new(sender);
            annotation.content = json!({
                "m.relates_to": {"rel_type": "m.annotation", "event_id": "$1", "key": "👍"}
            });
            relations.apply(&annotation);
        }

        let msg = project_message(&ev, &relations, &Timeline::new(), &empty_room(), &config());
        assert_eq!(msg.reactions.len(), 1);
        assert_eq!(msg.reactions[0].key, "👍");
        assert_eq!(msg.reactions[0].count, 2);
    }

    #[test]
    fn unknown_reply_target_is_not_an_error() {
        let mut ev = message_event("$1", "replying");
        ev.content = json!({
            "msgtype": "m.text",
            "body": "replying",
            "m.relates_to": {"m.in_reply_to": {"event_id": "$nowhere"}}
        });

        let msg = project_message(
            &ev,
            &RoomRelations::default(),
            &Timeline::new(),
            &empty_room(),
            &config(),
        );
        assert_eq!(msg.reply_preview, None);
        assert_eq!(msg.body, "replying");
    }

    #[test]
    fn known_reply_target_gets_truncated_preview() {
        let mut timeline = Timeline::new();
        let quoted = message_event("$q", &"x".repeat(150));
        let projected = project_message(
            &quoted,
            &RoomRelations::default(),
            &Timeline::new(),
            &empty_room(),
            &config(),
        );
        timeline.upsert(projected, quoted);

        let mut ev = message_event("$1", "replying");
        ev.content = json!({
            "msgtype": "m.text",
            "body": "replying",
            "m.relates_to": {"m.in_reply_to": {"event_id": "$q"}}
        });

        let msg = project_message(
            &ev,
            &RoomRelations::default(),
            &timeline,
            &empty_room(),
            &config(),
        );
        let preview = msg.reply_preview.expect("preview resolves");
        assert_eq!(preview.body.chars().count(), 103);
        assert!(preview.body.ends_with("..."));
    }

    #[test]
    fn decryption_failure_is_a_kind_not_an_error() {
        let mut ev = message_event("$1", "");
        ev.event_type = "m.room.encrypted".into();
        ev.decryption_failed = true;
        ev.content = json!({});

        let msg = project_message(
            &ev,
            &RoomRelations::default(),
            &Timeline::new(),
            &empty_room(),
            &config(),
        );
        assert_eq!(msg.kind, MessageKind::Undecryptable);
        assert!(msg.decryption_failed);
    }

    #[test]
    fn thread_summary_on_root() {
        let ev = message_event("$root", "root");
        let mut relations = RoomRelations::default();
        let mut reply = message_event("$r1", "in thread");
        reply.content = json!({
            "msgtype": "m.text",
            "body": "in thread",
            "m.relates_to": {"rel_type": "m.thread", "event_id": "$root"}
        });
        relations.apply(&reply);

        let msg = project_message(&ev, &relations, &Timeline::new(), &empty_room(), &config());
        let thread = msg.thread.expect("root has a thread summary");
        assert_eq!(thread.reply_count, 1);

        let reply_msg =
            project_message(&reply, &relations, &Timeline::new(), &empty_room(), &config());
        assert_eq!(reply_msg.thread_root, Some(EventId::new("$root")));
        assert!(reply_msg.thread.is_none());
    }

    #[test]
    fn mentions_are_extracted() {
        let mut ev = message_event("$1", "hey");
        ev.content = json!({
            "msgtype": "m.text",
            "body": "hey",
            "m.mentions": {"user_ids": ["@me:hs", "@other:hs"]}
        });

        let msg = project_message(
            &ev,
            &RoomRelations::default(),
            &Timeline::new(),
            &empty_room(),
            &config(),
        );
        assert_eq!(
            msg.mentions,
            vec![UserId::new("@me:hs"), UserId::new("@other:hs")]
        );
    }
}
