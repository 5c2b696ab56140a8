//! Explicit publish/subscribe for view updates.
//!
//! Replaces the implicit global-observable pattern: the router owns an
//! [`UpdateBus`], publication is an atomic snapshot swap followed by a
//! lightweight update on the matching topic, and consumers pull the new
//! snapshot through the read API. Topics are keyed by view kind and
//! optionally by room, so a consumer observing only room summaries is not
//! woken by chat traffic elsewhere. Unsubscribing is dropping the receiver.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::broadcast;

use concorde_shared::types::{RoomId, UserId};

use crate::notify::NotificationEvent;
use crate::router::SyncPhase;

const CHANNEL_CAPACITY: usize = 64;

/// The kinds of view a consumer can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    RoomList,
    Timeline,
    Members,
    Call,
    Typing,
    Presence,
    SyncPhase,
    Notification,
}

/// A change notification. Carries identities, not data — the current
/// snapshot is read through the router's read API.
#[derive(Debug, Clone)]
pub enum ViewUpdate {
    RoomList,
    Timeline(RoomId),
    Members(RoomId),
    Call(RoomId),
    Typing(RoomId),
    Presence(UserId),
    SyncPhase(SyncPhase),
    Notification(NotificationEvent),
}

impl ViewUpdate {
    pub fn kind(&self) -> ViewKind {
        match self {
            ViewUpdate::RoomList => ViewKind::RoomList,
            ViewUpdate::Timeline(_) => ViewKind::Timeline,
            ViewUpdate::Members(_) => ViewKind::Members,
            ViewUpdate::Call(_) => ViewKind::Call,
            ViewUpdate::Typing(_) => ViewKind::Typing,
            ViewUpdate::Presence(_) => ViewKind::Presence,
            ViewUpdate::SyncPhase(_) => ViewKind::SyncPhase,
            ViewUpdate::Notification(_) => ViewKind::Notification,
        }
    }

    fn room(&self) -> Option<&RoomId> {
        match self {
            ViewUpdate::Timeline(room)
            | ViewUpdate::Members(room)
            | ViewUpdate::Call(room)
            | ViewUpdate::Typing(room) => Some(room),
            ViewUpdate::Notification(n) => Some(&n.room_id),
            ViewUpdate::RoomList | ViewUpdate::Presence(_) | ViewUpdate::SyncPhase(_) => None,
        }
    }
}

type Topic = (ViewKind, Option<RoomId>);

/// Per-topic broadcast channels, created lazily on subscribe and pruned
/// once their last receiver is gone.
#[derive(Debug, Default)]
pub struct UpdateBus {
    topics: RwLock<HashMap<Topic, broadcast::Sender<ViewUpdate>>>,
}

impl UpdateBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a view kind, optionally scoped to one room. Room-less
    /// subscriptions receive every update of that kind.
    pub fn subscribe(
        &self,
        kind: ViewKind,
        room: Option<RoomId>,
    ) -> broadcast::Receiver<ViewUpdate> {
        let mut topics = self.topics.write().expect("bus lock poisoned");
        topics
            .entry((kind, room))
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish an update to its room-scoped topic and to the kind-wide one.
    pub fn publish(&self, update: ViewUpdate) {
        let kind = update.kind();
        let room = update.room().cloned();

        let mut topics = self.topics.write().expect("bus lock poisoned");
        let mut keys: Vec<Topic> = vec![(kind, None)];
        if room.is_some() {
            keys.push((kind, room));
        }
        for key in keys {
            if let Some(sender) = topics.get(&key) {
                if sender.receiver_count() == 0 {
                    topics.remove(&key);
                } else {
                    let _ = sender.send(update.clone());
                }
            }
        }
    }
}
