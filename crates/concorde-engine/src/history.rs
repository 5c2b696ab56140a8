//! History backfill boundary.
//!
//! Fetching older events is the transport's job; the engine only decides
//! where a page starts and whether the result is still wanted when it
//! lands. In-flight loads are tagged with a per-room generation counter —
//! if the room was torn down or rebuilt mid-fetch the generation moves and
//! the stale result is discarded instead of being applied.

use std::future::Future;

use concorde_shared::event::SyncEvent;
use concorde_shared::types::{EventId, RoomId};

use crate::error::Result;

/// Capability to fetch older history for a room, provided by the sync
/// transport.
pub trait HistoryProvider {
    /// Fetch up to `limit` events older than `before` (or the most recent
    /// page when `before` is `None`), returned in chronological order.
    ///
    /// Failures surface as [`EngineError::Transport`](crate::EngineError):
    /// recoverable, and the engine's applied state is untouched.
    fn fetch_older(
        &self,
        room_id: &RoomId,
        before: Option<&EventId>,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<SyncEvent>>> + Send;
}
