/// Application name
pub const APP_NAME: &str = "Concorde";

/// Timeline message event type
pub const EVENT_ROOM_MESSAGE: &str = "m.room.message";

/// Encrypted timeline event type (payload replaced by the crypto layer)
pub const EVENT_ROOM_ENCRYPTED: &str = "m.room.encrypted";

/// Redaction event type
pub const EVENT_ROOM_REDACTION: &str = "m.room.redaction";

/// Reaction (annotation) event type
pub const EVENT_REACTION: &str = "m.reaction";

/// Room state event types
pub const EVENT_ROOM_CREATE: &str = "m.room.create";
pub const EVENT_ROOM_NAME: &str = "m.room.name";
pub const EVENT_ROOM_TOPIC: &str = "m.room.topic";
pub const EVENT_ROOM_AVATAR: &str = "m.room.avatar";
pub const EVENT_ROOM_MEMBER: &str = "m.room.member";
pub const EVENT_ROOM_POWER_LEVELS: &str = "m.room.power_levels";
pub const EVENT_ROOM_PINNED: &str = "m.room.pinned_events";

/// Space hierarchy edge, lives in the *parent* space's state
pub const EVENT_SPACE_CHILD: &str = "m.space.child";

/// Custom state event carrying the minimum power level required to view a
/// room. Content: `{"min_power_level": N}`.
pub const EVENT_ROOM_ACCESS: &str = "app.concorde.room_access";

/// Call membership state event types, oldest wire format first
pub const EVENT_CALL_MEMBER_LEGACY: &str = "org.matrix.msc3401.call.member";
pub const EVENT_CALL_MEMBER: &str = "m.call.member";

/// Ephemeral event types
pub const EVENT_TYPING: &str = "m.typing";
pub const EVENT_PRESENCE: &str = "m.presence";

/// Room create content `type` value marking a space
pub const ROOM_TYPE_SPACE: &str = "m.space";

/// Reply previews and notification bodies are clipped to this many characters
pub const PREVIEW_MAX_CHARS: usize = 100;

/// Default avatar thumbnail edge length in pixels
pub const AVATAR_THUMBNAIL_PX: u32 = 40;
