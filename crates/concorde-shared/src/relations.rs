//! Parsing of the `m.relates_to` relation descriptor.
//!
//! A relation is a declared reference from one event to another expressing
//! edit, reaction, thread-reply, or rich-reply semantics. Targets are ids,
//! never embedded copies — the referenced event may not exist locally, and
//! that is a normal state, not an error.

use serde_json::Value;

use crate::event::SyncEvent;
use crate::types::EventId;

/// A parsed relation descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// `rel_type: m.replace` — supersedes the target's content.
    Replacement { target: EventId },
    /// `rel_type: m.annotation` — additive, keyed by the literal
    /// annotation value (a reaction emoji in practice).
    Annotation { target: EventId, key: String },
    /// `rel_type: m.thread` — reply within the thread rooted at the target.
    ThreadReply { target: EventId },
    /// `m.in_reply_to` without a `rel_type` — a rich reply.
    Reply { target: EventId },
}

impl Relation {
    /// Parse the relation declared by an event's content, if any.
    ///
    /// `rel_type` takes precedence over the `m.in_reply_to` fallback that
    /// threaded events carry for older clients.
    pub fn parse(content: &Value) -> Option<Relation> {
        let relates = content.get("m.relates_to")?;

        let target = relates
            .get("event_id")
            .and_then(Value::as_str)
            .map(EventId::new);

        match relates.get("rel_type").and_then(Value::as_str) {
            Some("m.replace") => Some(Relation::Replacement { target: target? }),
            Some("m.annotation") => {
                let key = relates.get("key").and_then(Value::as_str)?;
                Some(Relation::Annotation {
                    target: target?,
                    key: key.to_owned(),
                })
            }
            Some("m.thread") => Some(Relation::ThreadReply { target: target? }),
            _ => {
                let reply_to = relates
                    .get("m.in_reply_to")?
                    .get("event_id")
                    .and_then(Value::as_str)?;
                Some(Relation::Reply {
                    target: EventId::new(reply_to),
                })
            }
        }
    }

    /// The event id this relation points at.
    pub fn target(&self) -> &EventId {
        match self {
            Relation::Replacement { target }
            | Relation::Annotation { target, .. }
            | Relation::ThreadReply { target }
            | Relation::Reply { target } => target,
        }
    }
}

/// The `m.new_content` sub-structure of a replacement event, when present.
pub fn new_content(content: &Value) -> Option<&Value> {
    content.get("m.new_content")
}

/// The target of a redaction event (`redacts` in content).
pub fn redaction_target(event: &SyncEvent) -> Option<EventId> {
    event.content_str("redacts").map(EventId::new)
}

/// The rich-reply target of an event, whether or not it also has a
/// `rel_type` (threaded replies carry both).
pub fn reply_target(content: &Value) -> Option<EventId> {
    let reply_to = content
        .get("m.relates_to")?
        .get("m.in_reply_to")?
        .get("event_id")
        .and_then(Value::as_str)?;
    Some(EventId::new(reply_to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_replacement() {
        let content = json!({
            "m.relates_to": {"rel_type": "m.replace", "event_id": "$orig"},
            "m.new_content": {"body": "fixed"}
        });
        assert_eq!(
            Relation::parse(&content),
            Some(Relation::Replacement {
                target: EventId::new("$orig")
            })
        );
        assert!(new_content(&content).is_some());
    }

    #[test]
    fn parses_annotation() {
        let content = json!({
            "m.relates_to": {"rel_type": "m.annotation", "event_id": "$msg", "key": "👍"}
        });
        assert_eq!(
            Relation::parse(&content),
            Some(Relation::Annotation {
                target: EventId::new("$msg"),
                key: "👍".into()
            })
        );
    }

    #[test]
    fn annotation_without_key_is_ignored() {
        let content = json!({
            "m.relates_to": {"rel_type": "m.annotation", "event_id": "$msg"}
        });
        assert_eq!(Relation::parse(&content), None);
    }

    #[test]
    fn thread_rel_type_wins_over_reply_fallback() {
        let content = json!({
            "m.relates_to": {
                "rel_type": "m.thread",
                "event_id": "$root",
                "m.in_reply_to": {"event_id": "$last"}
            }
        });
        assert_eq!(
            Relation::parse(&content),
            Some(Relation::ThreadReply {
                target: EventId::new("$root")
            })
        );
        // The reply fallback is still reachable for preview resolution.
        assert_eq!(reply_target(&content), Some(EventId::new("$last")));
    }

    #[test]
    fn plain_reply() {
        let content = json!({
            "m.relates_to": {"m.in_reply_to": {"event_id": "$quoted"}}
        });
        assert_eq!(
            Relation::parse(&content),
            Some(Relation::Reply {
                target: EventId::new("$quoted")
            })
        );
    }

    #[test]
    fn unknown_rel_type_without_reply_is_none() {
        let content = json!({
            "m.relates_to": {"rel_type": "m.unknown", "event_id": "$x"}
        });
        assert_eq!(Relation::parse(&content), None);
    }
}
