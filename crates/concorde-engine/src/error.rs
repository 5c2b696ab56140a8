use thiserror::Error;

/// Errors produced by the projection engine.
///
/// Nothing here is fatal to the process. Malformed events are dropped and
/// logged inside the router, never surfaced to `handle_event` callers;
/// unresolved relations are a normal state, not an error; this type covers
/// the few operations with a caller who can meaningfully react.
#[derive(Error, Debug)]
pub enum EngineError {
    /// An event was missing a field its type requires.
    #[error("Malformed event: missing {0}")]
    Malformed(&'static str),

    /// A history fetch failed at the transport. Already-applied state is
    /// untouched; the caller may retry.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The router was already wired to a delivery stream. A second
    /// registration would duplicate every side effect, so it is refused.
    #[error("Router is already attached to a delivery stream")]
    AlreadyAttached,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
