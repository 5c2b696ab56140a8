//! The event router: single writer over all projected state.
//!
//! Subscribes to the sync transport's delivery channel, classifies each
//! event, invokes the projectors, and publishes view updates on the
//! [`UpdateBus`]. All mutation funnels through here; consumers read
//! `Arc`-swapped snapshots through the read API, so a reader sees state
//! entirely before or entirely after an update, never mid-projection.
//! A malformed event is logged and dropped — prior state is preserved and
//! the stream keeps flowing.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use concorde_shared::constants::{
    EVENT_PRESENCE, EVENT_ROOM_ENCRYPTED, EVENT_ROOM_MESSAGE, EVENT_ROOM_REDACTION, EVENT_TYPING,
};
use concorde_shared::event::{Direction, SyncEvent};
use concorde_shared::relations::{self, Relation};
use concorde_shared::types::{EventId, RoomId, UserId};

use crate::call::{self, CallParticipant, FeedUpdate};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::history::HistoryProvider;
use crate::member::{self, Member};
use crate::message::{self, project_message, Message};
use crate::notify::{self, NotificationEvent, NotificationSettings};
use crate::presence::{self, PresenceRecord};
use crate::relation_index::RoomRelations;
use crate::room::{self, MembershipStatus, RoomState, RoomSummary};
use crate::subscription::{UpdateBus, ViewKind, ViewUpdate};
use crate::timeline::Timeline;

/// Lifecycle of the sync transport, mirrored for consumers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncPhase {
    Stopped,
    Syncing,
    Prepared,
    Error,
}

/// What the transport pushes into the router's delivery channel.
#[derive(Debug)]
pub enum SyncDelivery {
    Event {
        event: SyncEvent,
        direction: Direction,
    },
    Batch {
        events: Vec<SyncEvent>,
        direction: Direction,
    },
    Phase(SyncPhase),
}

/// Where the user's attention is, as reported by the shell. Read by the
/// notification policy and the unread counter.
#[derive(Debug, Clone, Default)]
struct FocusState {
    has_focus: bool,
    viewed_room: Option<RoomId>,
}

/// Everything the router owns for one room.
struct RoomEntry {
    state: RoomState,
    relations: RoomRelations,
    timeline: Timeline,
    summary: Arc<RoomSummary>,
    messages: Arc<Vec<Message>>,
    members: Arc<Vec<Member>>,
    call: Arc<Vec<CallParticipant>>,
    typing: Arc<Vec<UserId>>,
}

impl RoomEntry {
    fn new(room_id: RoomId, config: &EngineConfig) -> Self {
        let state = RoomState::new(room_id);
        let summary = Arc::new(room::project_room(&state, config));
        Self {
            state,
            relations: RoomRelations::default(),
            timeline: Timeline::new(),
            summary,
            messages: Arc::new(Vec::new()),
            members: Arc::new(Vec::new()),
            call: Arc::new(Vec::new()),
            typing: Arc::new(Vec::new()),
        }
    }
}

struct Shared {
    config: EngineConfig,
    settings: RwLock<NotificationSettings>,
    rooms: RwLock<BTreeMap<RoomId, RoomEntry>>,
    presence: RwLock<BTreeMap<UserId, Arc<PresenceRecord>>>,
    focus: RwLock<FocusState>,
    sync_phase: RwLock<SyncPhase>,
    /// Survives room teardown so an in-flight history load for a removed
    /// room can never apply its result.
    history_generations: RwLock<BTreeMap<RoomId, u64>>,
    bus: UpdateBus,
    attached: AtomicBool,
}

/// The projection engine's front door.
#[derive(Clone)]
pub struct EventRouter {
    shared: Arc<Shared>,
}

impl EventRouter {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                settings: RwLock::new(NotificationSettings::default()),
                rooms: RwLock::new(BTreeMap::new()),
                presence: RwLock::new(BTreeMap::new()),
                focus: RwLock::new(FocusState::default()),
                sync_phase: RwLock::new(SyncPhase::Stopped),
                history_generations: RwLock::new(BTreeMap::new()),
                bus: UpdateBus::new(),
                attached: AtomicBool::new(false),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Intake
    // ------------------------------------------------------------------

    /// Wire the router to the transport's delivery channel and spawn the
    /// intake task. Guarded against double registration: wiring the same
    /// router twice would duplicate every side effect, including
    /// notifications, so a second call fails.
    pub fn attach(&self, mut rx: mpsc::Receiver<SyncDelivery>) -> Result<JoinHandle<()>> {
        if self.shared.attached.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyAttached);
        }
        info!("Event router attached to delivery stream");

        let router = self.clone();
        Ok(tokio::spawn(async move {
            while let Some(delivery) = rx.recv().await {
                match delivery {
                    SyncDelivery::Event { event, direction } => {
                        router.handle_event_batch(&[event], direction);
                    }
                    SyncDelivery::Batch { events, direction } => {
                        router.handle_event_batch(&events, direction);
                    }
                    SyncDelivery::Phase(phase) => router.set_sync_phase(phase),
                }
            }
            debug!("Delivery stream closed");
        }))
    }

    /// Apply one forward-delivered event.
    pub fn handle_event(&self, event: &SyncEvent) {
        let updates = self.apply_forward(event);
        self.publish_all(updates);
    }

    /// Apply a batch. Forward batches behave as repeated [`handle_event`];
    /// backward batches are history backfill — prepended, applied as one
    /// unit per room, and never surfaced as notifications.
    ///
    /// [`handle_event`]: EventRouter::handle_event
    pub fn handle_event_batch(&self, events: &[SyncEvent], direction: Direction) {
        match direction {
            Direction::Forward => {
                for event in events {
                    self.handle_event(event);
                }
            }
            Direction::Backward => {
                let updates = self.apply_backfill(events);
                self.publish_all(updates);
            }
        }
    }

    // ------------------------------------------------------------------
    // Forward path
    // ------------------------------------------------------------------

    fn apply_forward(&self, event: &SyncEvent) -> Vec<ViewUpdate> {
        match event.event_type.as_str() {
            EVENT_TYPING => self.apply_typing(event),
            EVENT_PRESENCE => self.apply_presence(event),
            EVENT_ROOM_REDACTION => self.apply_redaction(event),
            _ if event.is_state() => self.apply_state_event(event),
            _ => self.apply_timeline_event(event),
        }
    }

    fn apply_typing(&self, event: &SyncEvent) -> Vec<ViewUpdate> {
        let users = match presence::parse_typing(event) {
            Ok(users) => users,
            Err(error) => {
                warn!(room = %event.room_id, %error, "Dropping malformed typing event");
                return Vec::new();
            }
        };

        let mut rooms = self.shared.rooms.write().expect("rooms lock poisoned");
        let (entry, created) = Self::entry_mut(&mut rooms, &event.room_id, &self.shared.config);
        entry.typing = Arc::new(users);

        let mut updates = vec![ViewUpdate::Typing(event.room_id.clone())];
        Self::note_created(&mut rooms, created, &mut updates);
        updates
    }

    fn apply_presence(&self, event: &SyncEvent) -> Vec<ViewUpdate> {
        match presence::project_presence(event) {
            Ok(record) => {
                let user = record.user_id.clone();
                self.shared
                    .presence
                    .write()
                    .expect("presence lock poisoned")
                    .insert(user.clone(), Arc::new(record));
                vec![ViewUpdate::Presence(user)]
            }
            Err(error) => {
                warn!(sender = %event.sender, %error, "Dropping malformed presence event");
                Vec::new()
            }
        }
    }

    fn apply_state_event(&self, event: &SyncEvent) -> Vec<ViewUpdate> {
        let config = &self.shared.config;
        let mut rooms = self.shared.rooms.write().expect("rooms lock poisoned");
        let mut updates = Vec::new();

        let created = !rooms.contains_key(&event.room_id);
        let impact = {
            let (entry, _) = Self::entry_mut(&mut rooms, &event.room_id, config);
            match entry.state.apply_state(event, &config.local_user_id) {
                Ok(impact) => {
                    if impact.members {
                        entry.members = Arc::new(member::project_members(&entry.state, config));
                        updates.push(ViewUpdate::Members(event.room_id.clone()));
                    }
                    if impact.call {
                        entry.call = Arc::new(call::reconcile_call_members(
                            &entry.state,
                            Utc::now(),
                            config,
                        ));
                        updates.push(ViewUpdate::Call(event.room_id.clone()));
                    }
                    if impact.summary || impact.hierarchy {
                        Self::rebuild_summary(entry, config);
                    }
                    Some(impact)
                }
                Err(error) => {
                    warn!(
                        room = %event.room_id,
                        event_type = %event.event_type,
                        %error,
                        "Dropping malformed state event"
                    );
                    None
                }
            }
        };

        let Some(impact) = impact else {
            // Nothing was applied; don't leave a shell room behind.
            if created {
                rooms.remove(&event.room_id);
            }
            return Vec::new();
        };

        // A new room may already be claimed by an existing space's edges.
        if impact.hierarchy || created {
            Self::resolve_hierarchy_locked(&mut rooms);
        }
        if impact.summary || impact.hierarchy || created {
            updates.push(ViewUpdate::RoomList);
        }
        updates
    }

    fn apply_redaction(&self, event: &SyncEvent) -> Vec<ViewUpdate> {
        let Some(target) = relations::redaction_target(event) else {
            warn!(room = %event.room_id, "Dropping redaction without a target");
            return Vec::new();
        };

        let config = &self.shared.config;
        let mut rooms = self.shared.rooms.write().expect("rooms lock poisoned");
        let (entry, created) = Self::entry_mut(&mut rooms, &event.room_id, config);

        let delta = entry.relations.apply_redaction(&target);
        let mut updates = Vec::new();
        if Self::reproject(entry, &delta.changed_targets, config) {
            entry.messages = Arc::new(entry.timeline.snapshot());
            updates.push(ViewUpdate::Timeline(event.room_id.clone()));
        }
        Self::note_created(&mut rooms, created, &mut updates);
        updates
    }

    fn apply_timeline_event(&self, event: &SyncEvent) -> Vec<ViewUpdate> {
        let config = &self.shared.config;
        let relation = Relation::parse(&event.content);
        let is_message = matches!(
            event.event_type.as_str(),
            EVENT_ROOM_MESSAGE | EVENT_ROOM_ENCRYPTED
        );
        if !is_message && relation.is_none() {
            debug!(event_type = %event.event_type, "Ignoring unsupported event type");
            return Vec::new();
        }
        // Replacements never stand alone in the timeline; they re-project
        // their target instead.
        let is_replacement = matches!(relation, Some(Relation::Replacement { .. }));

        let mut rooms = self.shared.rooms.write().expect("rooms lock poisoned");
        let mut updates = Vec::new();

        let created = {
            let (entry, created) = Self::entry_mut(&mut rooms, &event.room_id, config);
            let delta = entry.relations.apply(event);

            let mut timeline_changed = false;
            let mut inserted: Option<Message> = None;

            if is_message && !is_replacement {
                let projected =
                    project_message(event, &entry.relations, &entry.timeline, &entry.state, config);
                let appended = entry.timeline.upsert(projected.clone(), event.clone());
                timeline_changed = true;

                // Only a first-time insert moves counters or notifies —
                // duplicate delivery must leave every summary field
                // unchanged.
                if appended {
                    entry.state.last_activity_ts = Some(event.origin_server_ts);

                    let focus = self.shared.focus.read().expect("focus lock poisoned").clone();
                    let viewing = focus.viewed_room.as_ref() == Some(&event.room_id);
                    if event.sender != config.local_user_id && !viewing {
                        entry.state.unread_count += 1;
                    }

                    Self::rebuild_summary(entry, config);
                    updates.push(ViewUpdate::RoomList);
                    inserted = Some(projected);
                }
            }

            if !delta.is_empty() {
                timeline_changed |= Self::reproject(entry, &delta.changed_targets, config);
            }
            if timeline_changed {
                entry.messages = Arc::new(entry.timeline.snapshot());
                updates.insert(0, ViewUpdate::Timeline(event.room_id.clone()));
            }

            if let Some(projected) = inserted {
                let settings = self
                    .shared
                    .settings
                    .read()
                    .expect("settings lock poisoned")
                    .clone();
                let focus = self.shared.focus.read().expect("focus lock poisoned").clone();
                if notify::should_notify(
                    &projected,
                    &settings,
                    &config.local_user_id,
                    focus.has_focus,
                    focus.viewed_room.as_ref(),
                ) {
                    updates.push(ViewUpdate::Notification(NotificationEvent {
                        room_id: projected.room_id.clone(),
                        event_id: projected.event_id.clone(),
                        sender_name: projected.sender_name.clone(),
                        room_name: entry.summary.name.clone(),
                        body: message::truncate_preview(&projected.body, config.preview_max_chars),
                        play_sound: settings.sound,
                    }));
                }
            }

            created
        };

        Self::note_created(&mut rooms, created, &mut updates);
        updates
    }

    // ------------------------------------------------------------------
    // Backfill path
    // ------------------------------------------------------------------

    fn apply_backfill(&self, events: &[SyncEvent]) -> Vec<ViewUpdate> {
        let config = &self.shared.config;
        let mut rooms = self.shared.rooms.write().expect("rooms lock poisoned");

        let mut per_room_messages: BTreeMap<RoomId, Vec<SyncEvent>> = BTreeMap::new();
        let mut changed_targets: BTreeMap<RoomId, Vec<EventId>> = BTreeMap::new();
        let mut members_dirty: BTreeSet<RoomId> = BTreeSet::new();
        let mut call_dirty: BTreeSet<RoomId> = BTreeSet::new();
        let mut summary_dirty: BTreeSet<RoomId> = BTreeSet::new();
        let mut timeline_touched: BTreeSet<RoomId> = BTreeSet::new();
        let mut hierarchy_dirty = false;

        // First pass: state and relations, so a message later in the batch
        // projects against everything the batch brought with it.
        for event in events {
            match event.event_type.as_str() {
                // Ephemeral signals have no history.
                EVENT_TYPING | EVENT_PRESENCE => continue,

                EVENT_ROOM_REDACTION => {
                    let Some(target) = relations::redaction_target(event) else {
                        warn!(room = %event.room_id, "Dropping redaction without a target");
                        continue;
                    };
                    let (entry, created) = Self::entry_mut(&mut rooms, &event.room_id, config);
                    hierarchy_dirty |= created;
                    let delta = entry.relations.apply_redaction(&target);
                    changed_targets
                        .entry(event.room_id.clone())
                        .or_default()
                        .extend(delta.changed_targets);
                }

                _ if event.is_state() => {
                    let (entry, created) = Self::entry_mut(&mut rooms, &event.room_id, config);
                    hierarchy_dirty |= created;
                    match entry.state.apply_state(event, &config.local_user_id) {
                        Ok(impact) => {
                            if impact.members {
                                members_dirty.insert(event.room_id.clone());
                            }
                            if impact.call {
                                call_dirty.insert(event.room_id.clone());
                            }
                            if impact.summary {
                                summary_dirty.insert(event.room_id.clone());
                            }
                            hierarchy_dirty |= impact.hierarchy;
                        }
                        Err(error) => {
                            warn!(
                                room = %event.room_id,
                                event_type = %event.event_type,
                                %error,
                                "Dropping malformed state event in backfill"
                            );
                        }
                    }
                }

                _ => {
                    let (entry, created) = Self::entry_mut(&mut rooms, &event.room_id, config);
                    hierarchy_dirty |= created;
                    let delta = entry.relations.apply(event);
                    changed_targets
                        .entry(event.room_id.clone())
                        .or_default()
                        .extend(delta.changed_targets);

                    let is_message = matches!(
                        event.event_type.as_str(),
                        EVENT_ROOM_MESSAGE | EVENT_ROOM_ENCRYPTED
                    );
                    let is_replacement = matches!(
                        Relation::parse(&event.content),
                        Some(Relation::Replacement { .. })
                    );
                    if is_message && !is_replacement {
                        per_room_messages
                            .entry(event.room_id.clone())
                            .or_default()
                            .push(event.clone());
                    }
                }
            }
        }

        // Second pass: project and prepend each room's batch in delivered
        // (chronological) order, then re-project it once so replies quoting
        // events from the same batch resolve their previews.
        for (room_id, batch_events) in per_room_messages {
            let Some(entry) = rooms.get_mut(&room_id) else { continue };
            let mut batch = Vec::with_capacity(batch_events.len());
            for event in &batch_events {
                let projected =
                    project_message(event, &entry.relations, &entry.timeline, &entry.state, config);
                batch.push((projected, event.clone()));
            }
            entry.timeline.prepend(batch);

            let ids: Vec<EventId> = batch_events.iter().map(|e| e.event_id.clone()).collect();
            Self::reproject(entry, &ids, config);
            timeline_touched.insert(room_id);
        }

        // Third pass: re-project relation targets that already lived in the
        // timeline before this batch.
        for (room_id, targets) in changed_targets {
            let Some(entry) = rooms.get_mut(&room_id) else { continue };
            if Self::reproject(entry, &targets, config) {
                timeline_touched.insert(room_id);
            }
        }

        let mut updates = Vec::new();
        for room_id in &timeline_touched {
            if let Some(entry) = rooms.get_mut(room_id) {
                entry.messages = Arc::new(entry.timeline.snapshot());
                updates.push(ViewUpdate::Timeline(room_id.clone()));
            }
        }
        for room_id in &members_dirty {
            if let Some(entry) = rooms.get_mut(room_id) {
                entry.members = Arc::new(member::project_members(&entry.state, config));
                updates.push(ViewUpdate::Members(room_id.clone()));
            }
        }
        for room_id in &call_dirty {
            if let Some(entry) = rooms.get_mut(room_id) {
                entry.call = Arc::new(call::reconcile_call_members(
                    &entry.state,
                    Utc::now(),
                    config,
                ));
                updates.push(ViewUpdate::Call(room_id.clone()));
            }
        }
        for room_id in &summary_dirty {
            if let Some(entry) = rooms.get_mut(room_id) {
                Self::rebuild_summary(entry, config);
            }
        }
        if hierarchy_dirty {
            Self::resolve_hierarchy_locked(&mut rooms);
        }
        if hierarchy_dirty || !summary_dirty.is_empty() {
            updates.push(ViewUpdate::RoomList);
        }
        updates
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// Load one page of older history for a room through the transport's
    /// [`HistoryProvider`] and prepend it.
    ///
    /// The load is tagged with the room's current generation; if the room
    /// is torn down or rebuilt while the fetch is in flight, the result is
    /// discarded rather than applied to stale state. Transport failures
    /// surface to the caller and leave applied state untouched.
    pub async fn load_older<P: HistoryProvider>(
        &self,
        room_id: &RoomId,
        provider: &P,
    ) -> Result<usize> {
        let generation = self.generation(room_id);
        let before = {
            let rooms = self.shared.rooms.read().expect("rooms lock poisoned");
            rooms
                .get(room_id)
                .and_then(|entry| entry.timeline.messages().first())
                .map(|message| message.event_id.clone())
        };

        let events = provider
            .fetch_older(room_id, before.as_ref(), self.shared.config.history_page_size)
            .await?;

        if self.generation(room_id) != generation {
            debug!(room = %room_id, "Discarding history page for a stale generation");
            return Ok(0);
        }

        let count = events.len();
        let updates = self.apply_backfill(&events);
        self.publish_all(updates);
        Ok(count)
    }

    fn generation(&self, room_id: &RoomId) -> u64 {
        *self
            .shared
            .history_generations
            .read()
            .expect("generations lock poisoned")
            .get(room_id)
            .unwrap_or(&0)
    }

    fn bump_generation(&self, room_id: &RoomId) {
        *self
            .shared
            .history_generations
            .write()
            .expect("generations lock poisoned")
            .entry(room_id.clone())
            .or_insert(0) += 1;
    }

    // ------------------------------------------------------------------
    // Lifecycle & consumer inputs
    // ------------------------------------------------------------------

    /// Rebuild a room's message list from scratch (e.g. on re-sync). Keeps
    /// room state; drops the timeline and relation index, and invalidates
    /// in-flight history loads.
    pub fn reset_room(&self, room_id: &RoomId) {
        self.bump_generation(room_id);
        let mut rooms = self.shared.rooms.write().expect("rooms lock poisoned");
        if let Some(entry) = rooms.get_mut(room_id) {
            entry.timeline.clear();
            entry.relations = RoomRelations::default();
            entry.messages = Arc::new(Vec::new());
            drop(rooms);
            self.shared.bus.publish(ViewUpdate::Timeline(room_id.clone()));
        }
    }

    /// Forget a room entirely (left and forgotten).
    pub fn remove_room(&self, room_id: &RoomId) {
        self.bump_generation(room_id);
        let removed = self
            .shared
            .rooms
            .write()
            .expect("rooms lock poisoned")
            .remove(room_id)
            .is_some();
        if removed {
            self.shared.bus.publish(ViewUpdate::RoomList);
        }
    }

    /// Clear a room's unread counter.
    pub fn mark_room_read(&self, room_id: &RoomId) {
        let mut rooms = self.shared.rooms.write().expect("rooms lock poisoned");
        if let Some(entry) = rooms.get_mut(room_id) {
            if entry.state.unread_count != 0 {
                entry.state.unread_count = 0;
                Self::rebuild_summary(entry, &self.shared.config);
                drop(rooms);
                self.shared.bus.publish(ViewUpdate::RoomList);
            }
        }
    }

    /// Report where the user's attention is. Feeds the notification policy
    /// and the unread counter.
    pub fn set_focus(&self, has_focus: bool, viewed_room: Option<RoomId>) {
        *self.shared.focus.write().expect("focus lock poisoned") = FocusState {
            has_focus,
            viewed_room,
        };
    }

    /// Replace the notification settings snapshot.
    pub fn update_settings(&self, settings: NotificationSettings) {
        *self.shared.settings.write().expect("settings lock poisoned") = settings;
    }

    /// Record a transport phase change; published only when it changes.
    pub fn set_sync_phase(&self, phase: SyncPhase) {
        let mut current = self
            .shared
            .sync_phase
            .write()
            .expect("sync phase lock poisoned");
        if *current != phase {
            *current = phase;
            drop(current);
            self.shared.bus.publish(ViewUpdate::SyncPhase(phase));
        }
    }

    /// Merge a call-transport feed update (speaking, mute, feed handle)
    /// into the room's participant list.
    pub fn apply_call_feed_update(&self, room_id: &RoomId, user_id: &UserId, update: FeedUpdate) {
        let mut rooms = self.shared.rooms.write().expect("rooms lock poisoned");
        if let Some(entry) = rooms.get_mut(room_id) {
            let mut participants = (*entry.call).clone();
            if call::apply_feed_update(&mut participants, user_id, &update) {
                entry.call = Arc::new(participants);
                drop(rooms);
                self.shared.bus.publish(ViewUpdate::Call(room_id.clone()));
            }
        }
    }

    // ------------------------------------------------------------------
    // Read API
    // ------------------------------------------------------------------

    /// Subscribe to updates of one view kind, optionally scoped to a room.
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(
        &self,
        kind: ViewKind,
        room: Option<RoomId>,
    ) -> broadcast::Receiver<ViewUpdate> {
        self.shared.bus.subscribe(kind, room)
    }

    pub fn room_summaries(&self) -> Vec<Arc<RoomSummary>> {
        self.shared
            .rooms
            .read()
            .expect("rooms lock poisoned")
            .values()
            .map(|entry| entry.summary.clone())
            .collect()
    }

    pub fn room_summary(&self, room_id: &RoomId) -> Option<Arc<RoomSummary>> {
        self.shared
            .rooms
            .read()
            .expect("rooms lock poisoned")
            .get(room_id)
            .map(|entry| entry.summary.clone())
    }

    pub fn messages(&self, room_id: &RoomId) -> Arc<Vec<Message>> {
        self.shared
            .rooms
            .read()
            .expect("rooms lock poisoned")
            .get(room_id)
            .map(|entry| entry.messages.clone())
            .unwrap_or_default()
    }

    pub fn members(&self, room_id: &RoomId) -> Arc<Vec<Member>> {
        self.shared
            .rooms
            .read()
            .expect("rooms lock poisoned")
            .get(room_id)
            .map(|entry| entry.members.clone())
            .unwrap_or_default()
    }

    pub fn call_participants(&self, room_id: &RoomId) -> Arc<Vec<CallParticipant>> {
        self.shared
            .rooms
            .read()
            .expect("rooms lock poisoned")
            .get(room_id)
            .map(|entry| entry.call.clone())
            .unwrap_or_default()
    }

    pub fn typing_users(&self, room_id: &RoomId) -> Arc<Vec<UserId>> {
        self.shared
            .rooms
            .read()
            .expect("rooms lock poisoned")
            .get(room_id)
            .map(|entry| entry.typing.clone())
            .unwrap_or_default()
    }

    pub fn presence(&self, user_id: &UserId) -> Option<Arc<PresenceRecord>> {
        self.shared
            .presence
            .read()
            .expect("presence lock poisoned")
            .get(user_id)
            .cloned()
    }

    /// The replies in the thread rooted at `root`, in arrival order,
    /// restricted to replies whose message projection is locally known.
    pub fn thread_replies(&self, room_id: &RoomId, root: &EventId) -> Vec<Message> {
        let rooms = self.shared.rooms.read().expect("rooms lock poisoned");
        let Some(entry) = rooms.get(room_id) else {
            return Vec::new();
        };
        entry
            .relations
            .get(root)
            .map(|target| {
                target
                    .thread_replies
                    .iter()
                    .filter_map(|event| entry.timeline.get(&event.event_id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Sum of unread counters over joined rooms (window-title badge).
    pub fn total_unread(&self) -> u64 {
        self.shared
            .rooms
            .read()
            .expect("rooms lock poisoned")
            .values()
            .filter(|entry| entry.summary.membership == MembershipStatus::Joined)
            .map(|entry| entry.summary.unread_count)
            .sum()
    }

    pub fn sync_phase(&self) -> SyncPhase {
        *self
            .shared
            .sync_phase
            .read()
            .expect("sync phase lock poisoned")
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn publish_all(&self, updates: Vec<ViewUpdate>) {
        for update in updates {
            self.shared.bus.publish(update);
        }
    }

    fn entry_mut<'a>(
        rooms: &'a mut BTreeMap<RoomId, RoomEntry>,
        room_id: &RoomId,
        config: &EngineConfig,
    ) -> (&'a mut RoomEntry, bool) {
        let created = !rooms.contains_key(room_id);
        let entry = rooms
            .entry(room_id.clone())
            .or_insert_with(|| RoomEntry::new(room_id.clone(), config));
        (entry, created)
    }

    /// A room seen for the first time may already be claimed by an existing
    /// space's edges, so discovery re-runs hierarchy resolution.
    fn note_created(
        rooms: &mut BTreeMap<RoomId, RoomEntry>,
        created: bool,
        updates: &mut Vec<ViewUpdate>,
    ) {
        if !created {
            return;
        }
        Self::resolve_hierarchy_locked(rooms);
        if !updates.iter().any(|u| matches!(u, ViewUpdate::RoomList)) {
            updates.push(ViewUpdate::RoomList);
        }
    }

    /// Re-project the given targets in place. Targets not in the timeline
    /// (e.g. a reaction whose message never arrived) are skipped.
    fn reproject(entry: &mut RoomEntry, targets: &[EventId], config: &EngineConfig) -> bool {
        let mut changed = false;
        for target in targets {
            if let Some(raw) = entry.timeline.raw_event(target).cloned() {
                let projected =
                    project_message(&raw, &entry.relations, &entry.timeline, &entry.state, config);
                changed |= entry.timeline.replace_projection(projected);
            }
        }
        changed
    }

    /// Swap in a fresh summary, preserving the hierarchy-resolved parent.
    fn rebuild_summary(entry: &mut RoomEntry, config: &EngineConfig) {
        let parent = entry.summary.parent_space_id.clone();
        let mut summary = room::project_room(&entry.state, config);
        summary.parent_space_id = parent;
        entry.summary = Arc::new(summary);
    }

    /// Second pass over the whole room set: backfill `parent_space_id` from
    /// the edges declared in each space's state.
    fn resolve_hierarchy_locked(rooms: &mut BTreeMap<RoomId, RoomEntry>) {
        let edges: BTreeMap<RoomId, Vec<RoomId>> = rooms
            .iter()
            .filter(|(_, entry)| entry.state.is_space())
            .map(|(id, entry)| (id.clone(), entry.state.space_children.clone()))
            .collect();
        let parents = room::resolve_parents(&edges);

        for (room_id, entry) in rooms.iter_mut() {
            let parent = parents.get(room_id).cloned();
            if entry.summary.parent_space_id != parent {
                let mut summary = (*entry.summary).clone();
                summary.parent_space_id = parent;
                entry.summary = Arc::new(summary);
            }
        }
    }
}
