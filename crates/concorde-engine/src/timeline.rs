//! Per-room ordered message list.
//!
//! Messages are owned exclusively by this list and addressed by event id.
//! Upserts replace in place, so duplicate delivery never double-appends;
//! backfill batches are prepended ahead of existing entries. The raw event
//! behind each projection is retained so a message can be re-projected when
//! its relations change.

use std::collections::HashMap;

use concorde_shared::event::SyncEvent;
use concorde_shared::types::EventId;

use crate::message::Message;

#[derive(Debug, Default)]
pub struct Timeline {
    messages: Vec<Message>,
    index: HashMap<EventId, usize>,
    raw: HashMap<EventId, SyncEvent>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, event_id: &EventId) -> bool {
        self.index.contains_key(event_id)
    }

    pub fn get(&self, event_id: &EventId) -> Option<&Message> {
        self.index.get(event_id).map(|&i| &self.messages[i])
    }

    /// The raw event a projection was built from.
    pub fn raw_event(&self, event_id: &EventId) -> Option<&SyncEvent> {
        self.raw.get(event_id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Insert a message at the end, or replace it in place if its identity
    /// is already present. Returns `true` when a new entry was appended.
    pub fn upsert(&mut self, message: Message, raw: SyncEvent) -> bool {
        let id = message.event_id.clone();
        self.raw.insert(id.clone(), raw);
        match self.index.get(&id) {
            Some(&i) => {
                self.messages[i] = message;
                false
            }
            None => {
                self.index.insert(id, self.messages.len());
                self.messages.push(message);
                true
            }
        }
    }

    /// Replace an existing projection without touching position or raw
    /// event. Returns `false` if the message is not in the list.
    pub fn replace_projection(&mut self, message: Message) -> bool {
        match self.index.get(&message.event_id) {
            Some(&i) => {
                self.messages[i] = message;
                true
            }
            None => false,
        }
    }

    /// Prepend a backfill batch, given in chronological order. Entries whose
    /// identity is already present are skipped rather than duplicated.
    pub fn prepend(&mut self, batch: Vec<(Message, SyncEvent)>) {
        let fresh: Vec<(Message, SyncEvent)> = batch
            .into_iter()
            .filter(|(m, _)| !self.index.contains_key(&m.event_id))
            .collect();
        if fresh.is_empty() {
            return;
        }

        let mut merged = Vec::with_capacity(fresh.len() + self.messages.len());
        for (message, raw) in fresh {
            self.raw.insert(message.event_id.clone(), raw);
            merged.push(message);
        }
        merged.append(&mut self.messages);

        self.index.clear();
        for (i, message) in merged.iter().enumerate() {
            self.index.insert(message.event_id.clone(), i);
        }
        self.messages = merged;
    }

    /// Drop everything, e.g. ahead of a full re-sync rebuild.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.index.clear();
        self.raw.clear();
    }

    /// Owned copy of the current list, for snapshot publication.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }
}
