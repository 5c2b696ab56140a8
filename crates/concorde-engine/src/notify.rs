//! Notification policy.
//!
//! A pure decision function, deliberately separated from the act of
//! displaying anything — the desktop shell owns that. The router invokes it
//! for forward-delivered messages only; backfill never notifies.

use serde::{Deserialize, Serialize};

use concorde_shared::types::{EventId, RoomId, UserId};

use crate::message::Message;

/// User settings the policy and the outbound-signal gates read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub sound: bool,
    pub mentions_only: bool,
    /// Gates whether read receipts are emitted. Read-only here; outbound
    /// signalling lives outside the engine.
    pub send_read_receipts: bool,
    /// Gates whether typing indicators are emitted. Read-only here.
    pub send_typing_indicators: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            sound: true,
            mentions_only: false,
            send_read_receipts: true,
            send_typing_indicators: true,
        }
    }
}

/// A notification the router decided to surface. Display is up to the
/// consumer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationEvent {
    pub room_id: RoomId,
    pub event_id: EventId,
    pub sender_name: String,
    pub room_name: String,
    /// Already clipped for display.
    pub body: String,
    pub play_sound: bool,
}

fn mentions_user(message: &Message, user: &UserId) -> bool {
    message.mentions.contains(user) || message.body.contains(user.as_str())
}

/// Decide whether a freshly projected message should surface an alert.
pub fn should_notify(
    message: &Message,
    settings: &NotificationSettings,
    local_user: &UserId,
    has_focus: bool,
    viewed_room: Option<&RoomId>,
) -> bool {
    if message.sender == *local_user {
        return false;
    }
    if !settings.enabled {
        return false;
    }
    if settings.mentions_only && !mentions_user(message, local_user) {
        return false;
    }
    if has_focus && viewed_room == Some(&message.room_id) {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::test_support::minimal_message;

    fn local() -> UserId {
        UserId::new("@me:hs")
    }

    #[test]
    fn own_messages_never_notify() {
        let mut message = minimal_message("$1", "hi");
        message.sender = local();
        assert!(!should_notify(
            &message,
            &NotificationSettings::default(),
            &local(),
            false,
            None
        ));
    }

    #[test]
    fn other_sender_notifies_when_unfocused_elsewhere() {
        let message = minimal_message("$1", "hi");
        assert!(should_notify(
            &message,
            &NotificationSettings::default(),
            &local(),
            true,
            Some(&RoomId::new("!other:hs"))
        ));
    }

    #[test]
    fn disabled_settings_suppress() {
        let message = minimal_message("$1", "hi");
        let settings = NotificationSettings {
            enabled: false,
            ..Default::default()
        };
        assert!(!should_notify(&message, &settings, &local(), false, None));
    }

    #[test]
    fn mentions_only_requires_a_mention() {
        let settings = NotificationSettings {
            mentions_only: true,
            ..Default::default()
        };

        let plain = minimal_message("$1", "nothing for you");
        assert!(!should_notify(&plain, &settings, &local(), false, None));

        let by_body = minimal_message("$2", "hey @me:hs, look at this");
        assert!(should_notify(&by_body, &settings, &local(), false, None));

        let mut by_field = minimal_message("$3", "explicit");
        by_field.mentions = vec![local()];
        assert!(should_notify(&by_field, &settings, &local(), false, None));
    }

    #[test]
    fn focused_on_the_same_room_suppresses() {
        let message = minimal_message("$1", "hi");
        let room = message.room_id.clone();
        assert!(!should_notify(
            &message,
            &NotificationSettings::default(),
            &local(),
            true,
            Some(&room)
        ));
        // Same room but unfocused still notifies.
        assert!(should_notify(
            &message,
            &NotificationSettings::default(),
            &local(),
            false,
            Some(&room)
        ));
    }
}
