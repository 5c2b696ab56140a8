//! # concorde-shared
//!
//! Protocol-facing data model shared by the Concorde projection engine and
//! its hosts: identifier newtypes, the raw sync event type, relation
//! descriptor parsing, media URI resolution, and power-level role tiers.
//!
//! Everything in this crate is pure data — no I/O, no locks, no logging.

pub mod constants;
pub mod event;
pub mod media;
pub mod relations;
pub mod roles;
pub mod types;

pub use event::{Direction, SyncEvent};
pub use relations::Relation;
pub use types::{EventId, RoomId, UserId};
