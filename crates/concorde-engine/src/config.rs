use concorde_shared::constants::PREVIEW_MAX_CHARS;
use concorde_shared::types::UserId;

/// Static configuration for an [`EventRouter`](crate::router::EventRouter).
///
/// Holds the local user's identity (needed for unread counting, own-message
/// suppression, and mention detection) and the homeserver base URL used to
/// resolve media URIs into avatar thumbnails.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// The logged-in user. Messages from this sender never notify and never
    /// count as unread.
    pub local_user_id: UserId,

    /// Base URL of the homeserver's media endpoint, e.g. `https://hs.example`.
    pub homeserver_url: String,

    /// Reply previews and notification bodies are clipped to this many
    /// characters.
    pub preview_max_chars: usize,

    /// How many events a single history page requests.
    pub history_page_size: u32,
}

impl EngineConfig {
    pub fn new(local_user_id: UserId, homeserver_url: impl Into<String>) -> Self {
        Self {
            local_user_id,
            homeserver_url: homeserver_url.into(),
            preview_max_chars: PREVIEW_MAX_CHARS,
            history_page_size: 30,
        }
    }
}
