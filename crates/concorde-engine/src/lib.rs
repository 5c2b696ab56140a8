//! # concorde-engine
//!
//! Real-time projection engine for the Concorde client: ingests the
//! possibly out-of-order, possibly duplicated event stream delivered by
//! the sync transport and maintains consistent, queryable derived views —
//! per-room timelines, room summaries, member lists, call rosters, and
//! presence — for the rendering layer.
//!
//! The [`EventRouter`] is the single writer: it classifies each incoming
//! event, invokes the pure projectors, swaps whole snapshots per view, and
//! publishes change notifications on a per-topic update bus. No operation
//! here blocks on I/O, nothing is fatal — the worst outcome for a bad
//! event is one stale view, never a stopped stream.

pub mod call;
pub mod config;
pub mod history;
pub mod member;
pub mod message;
pub mod notify;
pub mod presence;
pub mod relation_index;
pub mod room;
pub mod router;
pub mod subscription;
pub mod timeline;

mod error;

pub use call::{CallParticipant, FeedUpdate};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use history::HistoryProvider;
pub use member::Member;
pub use message::{Message, MessageKind, ReactionSummary, ReplyPreview, ThreadSummary};
pub use notify::{NotificationEvent, NotificationSettings};
pub use presence::{PresenceRecord, PresenceStatus};
pub use room::{MembershipStatus, RoomKind, RoomSummary};
pub use router::{EventRouter, SyncDelivery, SyncPhase};
pub use subscription::{ViewKind, ViewUpdate};
