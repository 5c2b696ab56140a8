//! Per-room index of relations targeting each event.
//!
//! The index is keyed by *target* event id, so relations arriving before
//! their target (common during backfill) are stored speculatively and
//! resolve correctly once the target shows up. Deltas report which targets
//! changed so only affected messages are re-projected.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use concorde_shared::event::SyncEvent;
use concorde_shared::relations::Relation;
use concorde_shared::types::{EventId, UserId};

/// Where an annotation event landed, recorded so a later redaction of the
/// annotation event itself can reverse the membership it added.
#[derive(Debug, Clone)]
struct AnnotationSource {
    target: EventId,
    key: String,
}

/// All annotations sharing one key on one target.
#[derive(Debug, Clone)]
pub struct AnnotationGroup {
    pub key: String,
    /// (annotation event id, sender) pairs. A sender holds at most one
    /// annotation per key per target; the first one observed wins.
    pub senders: Vec<(EventId, UserId)>,
}

/// Relations indexed against a single target event.
#[derive(Debug, Default)]
pub struct TargetRelations {
    /// Replacements in arrival order. Only the latest is authoritative.
    pub replacements: Vec<SyncEvent>,
    /// Annotation groups in first-seen key order, matching arrival
    /// semantics for display.
    pub annotations: Vec<AnnotationGroup>,
    /// Thread replies in arrival order (the target is the thread root).
    pub thread_replies: Vec<SyncEvent>,
}

impl TargetRelations {
    /// The replacement whose content currently supersedes the target.
    pub fn latest_replacement(&self) -> Option<&SyncEvent> {
        self.replacements.last()
    }
}

/// Which target event ids changed as a result of applying one event.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelationDelta {
    pub changed_targets: Vec<EventId>,
}

impl RelationDelta {
    fn one(target: EventId) -> Self {
        Self {
            changed_targets: vec![target],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changed_targets.is_empty()
    }
}

/// The relation index for one room.
#[derive(Debug, Default)]
pub struct RoomRelations {
    by_target: HashMap<EventId, TargetRelations>,
    annotation_sources: HashMap<EventId, AnnotationSource>,
    /// Targets whose content has been erased. A redaction may arrive before
    /// its target; membership here is all the projector needs.
    redacted: HashSet<EventId>,
}

impl RoomRelations {
    /// Index one event. Returns the targets whose projection is now stale.
    ///
    /// Events with no relation descriptor (or a reply-only descriptor,
    /// which is resolved at projection time) leave the index untouched.
    /// Re-applying an already-indexed event is a no-op, so duplicate
    /// delivery cannot double-count a reaction or duplicate an edit.
    pub fn apply(&mut self, event: &SyncEvent) -> RelationDelta {
        match Relation::parse(&event.content) {
            Some(Relation::Replacement { target }) => {
                let entry = self.by_target.entry(target.clone()).or_default();
                if entry
                    .replacements
                    .iter()
                    .any(|e| e.event_id == event.event_id)
                {
                    return RelationDelta::default();
                }
                entry.replacements.push(event.clone());
                RelationDelta::one(target)
            }

            Some(Relation::Annotation { target, key }) => {
                if self.annotation_sources.contains_key(&event.event_id) {
                    return RelationDelta::default();
                }
                let entry = self.by_target.entry(target.clone()).or_default();
                let index = match entry.annotations.iter().position(|g| g.key == key) {
                    Some(index) => index,
                    None => {
                        entry.annotations.push(AnnotationGroup {
                            key: key.clone(),
                            senders: Vec::new(),
                        });
                        entry.annotations.len() - 1
                    }
                };
                let group = &mut entry.annotations[index];
                if group.senders.iter().any(|(_, s)| *s == event.sender) {
                    // Same (target, key, sender) under a distinct event id.
                    // Keep the first.
                    debug!(
                        target_event = %target,
                        key = %key,
                        sender = %event.sender,
                        "Duplicate annotation from sender, keeping first"
                    );
                    return RelationDelta::default();
                }
                group
                    .senders
                    .push((event.event_id.clone(), event.sender.clone()));
                self.annotation_sources.insert(
                    event.event_id.clone(),
                    AnnotationSource {
                        target: target.clone(),
                        key,
                    },
                );
                RelationDelta::one(target)
            }

            Some(Relation::ThreadReply { target }) => {
                let entry = self.by_target.entry(target.clone()).or_default();
                if entry
                    .thread_replies
                    .iter()
                    .any(|e| e.event_id == event.event_id)
                {
                    return RelationDelta::default();
                }
                entry.thread_replies.push(event.clone());
                RelationDelta::one(target)
            }

            Some(Relation::Reply { .. }) | None => RelationDelta::default(),
        }
    }

    /// Apply a redaction of `redacted_id`.
    ///
    /// If the redacted event was an annotation, the membership it added is
    /// removed and the annotation's *target* is reported changed.
    /// Otherwise the id itself is marked content-erased.
    pub fn apply_redaction(&mut self, redacted_id: &EventId) -> RelationDelta {
        if let Some(source) = self.annotation_sources.remove(redacted_id) {
            if let Some(entry) = self.by_target.get_mut(&source.target) {
                if let Some(group) = entry
                    .annotations
                    .iter_mut()
                    .find(|g| g.key == source.key)
                {
                    group.senders.retain(|(id, _)| id != redacted_id);
                }
                entry.annotations.retain(|g| !g.senders.is_empty());
            }
            return RelationDelta::one(source.target);
        }

        if self.redacted.insert(redacted_id.clone()) {
            RelationDelta::one(redacted_id.clone())
        } else {
            RelationDelta::default()
        }
    }

    pub fn get(&self, target: &EventId) -> Option<&TargetRelations> {
        self.by_target.get(target)
    }

    pub fn is_redacted(&self, event_id: &EventId) -> bool {
        self.redacted.contains(event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    use concorde_shared::types::RoomId;

    fn annotation(event_id: &str, sender: &str, target: &str, key: &str) -> SyncEvent {
        SyncEvent {
            event_id: EventId::new(event_id),
            room_id: RoomId::new("!room:hs"),
            event_type: "m.reaction".into(),
            sender: UserId::new(sender),
            origin_server_ts: Utc::now(),
            state_key: None,
            content: json!({
                "m.relates_to": {"rel_type": "m.annotation", "event_id": target, "key": key}
            }),
            decryption_failed: false,
            redacted_because: None,
        }
    }

    fn replacement(event_id: &str, target: &str, new_body: &str) -> SyncEvent {
        SyncEvent {
            event_id: EventId::new(event_id),
            room_id: RoomId::new("!room:hs"),
            event_type: "m.room.message".into(),
            sender: UserId::new("@alice:hs"),
            origin_server_ts: Utc::now(),
            state_key: None,
            content: json!({
                "msgtype": "m.text",
                "body": format!("* {new_body}"),
                "m.relates_to": {"rel_type": "m.replace", "event_id": target},
                "m.new_content": {"msgtype": "m.text", "body": new_body}
            }),
            decryption_failed: false,
            redacted_because: None,
        }
    }

    #[test]
    fn speculative_annotation_before_target() {
        let mut index = RoomRelations::default();
        let delta = index.apply(&annotation("$a", "@bob:hs", "$target", "👍"));
        assert_eq!(delta.changed_targets, vec![EventId::new("$target")]);

        // Index content is there whenever the target materializes.
        let entry = index.get(&EventId::new("$target")).unwrap();
        assert_eq!(entry.annotations.len(), 1);
        assert_eq!(entry.annotations[0].senders.len(), 1);
    }

    #[test]
    fn duplicate_annotation_event_is_noop() {
        let mut index = RoomRelations::default();
        let ev = annotation("$a", "@bob:hs", "$target", "👍");
        assert!(!index.apply(&ev).is_empty());
        assert!(index.apply(&ev).is_empty());

        let entry = index.get(&EventId::new("$target")).unwrap();
        assert_eq!(entry.annotations[0].senders.len(), 1);
    }

    #[test]
    fn same_sender_same_key_different_event_keeps_first() {
        let mut index = RoomRelations::default();
        assert!(!index.apply(&annotation("$a1", "@bob:hs", "$t", "👍")).is_empty());
        assert!(index.apply(&annotation("$a2", "@bob:hs", "$t", "👍")).is_empty());

        let entry = index.get(&EventId::new("$t")).unwrap();
        assert_eq!(
            entry.annotations[0].senders,
            vec![(EventId::new("$a1"), UserId::new("@bob:hs"))]
        );
    }

    #[test]
    fn annotation_groups_keep_first_seen_key_order() {
        let mut index = RoomRelations::default();
        index.apply(&annotation("$a1", "@bob:hs", "$t", "🎉"));
        index.apply(&annotation("$a2", "@carol:hs", "$t", "👍"));
        index.apply(&annotation("$a3", "@dave:hs", "$t", "🎉"));

        let entry = index.get(&EventId::new("$t")).unwrap();
        let keys: Vec<&str> = entry.annotations.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["🎉", "👍"]);
        assert_eq!(entry.annotations[0].senders.len(), 2);
    }

    #[test]
    fn redacting_annotation_reverses_it() {
        let mut index = RoomRelations::default();
        index.apply(&annotation("$a1", "@bob:hs", "$t", "👍"));
        index.apply(&annotation("$a2", "@carol:hs", "$t", "👍"));

        let delta = index.apply_redaction(&EventId::new("$a1"));
        assert_eq!(delta.changed_targets, vec![EventId::new("$t")]);

        let entry = index.get(&EventId::new("$t")).unwrap();
        assert_eq!(entry.annotations[0].senders.len(), 1);
        assert_eq!(entry.annotations[0].senders[0].1, UserId::new("@carol:hs"));
        // The annotation event itself is not marked content-erased.
        assert!(!index.is_redacted(&EventId::new("$a1")));
    }

    #[test]
    fn redacting_last_annotation_drops_the_group() {
        let mut index = RoomRelations::default();
        index.apply(&annotation("$a1", "@bob:hs", "$t", "👍"));
        index.apply_redaction(&EventId::new("$a1"));

        let entry = index.get(&EventId::new("$t")).unwrap();
        assert!(entry.annotations.is_empty());
    }

    #[test]
    fn latest_replacement_by_arrival_wins() {
        let mut index = RoomRelations::default();
        index.apply(&replacement("$e1", "$t", "first edit"));
        index.apply(&replacement("$e2", "$t", "second edit"));

        let entry = index.get(&EventId::new("$t")).unwrap();
        let latest = entry.latest_replacement().unwrap();
        assert_eq!(latest.event_id, EventId::new("$e2"));
    }

    #[test]
    fn redaction_of_plain_event_marks_target() {
        let mut index = RoomRelations::default();
        let delta = index.apply_redaction(&EventId::new("$msg"));
        assert_eq!(delta.changed_targets, vec![EventId::new("$msg")]);
        assert!(index.is_redacted(&EventId::new("$msg")));

        // Duplicate redaction reports nothing new.
        assert!(index.apply_redaction(&EventId::new("$msg")).is_empty());
    }
}
