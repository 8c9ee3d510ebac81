//! JSON wire frames for the presence and inbox channels
//!
//! All frames are JSON text. Inbound inbox frames decode into an internally
//! tagged enum with an explicit `Unknown` catch-all so unrecognized frame
//! types are dropped instead of failing the whole stream. Field names are
//! camelCase on the wire.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::inbox::{ConversationSummary, UnreadState};
use crate::presence::RosterEntry;

// ----------------------------------------------------------------------------
// Presence Frames
// ----------------------------------------------------------------------------

/// Inbound presence payload
///
/// Either field may be absent; each present field replaces its side of the
/// snapshot wholesale. Server heartbeat frames carry neither and decode to a
/// no-op. Anonymous viewers only ever receive `guests`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PresenceUpdate {
    #[serde(default)]
    pub online: Option<Vec<RosterEntry>>,
    #[serde(default)]
    pub guests: Option<u64>,
}

impl PresenceUpdate {
    /// Whether this payload carries any snapshot data
    pub fn is_empty(&self) -> bool {
        self.online.is_none() && self.guests.is_none()
    }
}

/// Outbound presence frames
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresenceCommand {
    /// Heartbeat confirming the connection is alive
    Ping { ts: u64 },
}

// ----------------------------------------------------------------------------
// Unread Snapshot
// ----------------------------------------------------------------------------

/// Authoritative unread snapshot as sent by the server
///
/// `counts` wins when present; a slugs-only payload implies one unread
/// message per slug, matching the server's own normalization of legacy
/// cache entries.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UnreadSnapshot {
    #[serde(default)]
    pub dialogs: Option<u64>,
    #[serde(default)]
    pub slugs: Vec<String>,
    #[serde(default)]
    pub counts: HashMap<String, u32>,
}

impl UnreadSnapshot {
    /// Normalize into the local unread representation
    pub fn normalize(self) -> UnreadState {
        let per_conversation: HashMap<String, u32> = if !self.counts.is_empty() {
            self.counts
                .into_iter()
                .filter(|(slug, count)| !slug.is_empty() && *count > 0)
                .collect()
        } else {
            self.slugs
                .into_iter()
                .filter(|slug| !slug.is_empty())
                .map(|slug| (slug, 1))
                .collect()
        };
        let dialogs = self
            .dialogs
            .unwrap_or_else(|| per_conversation.values().filter(|c| **c > 0).count() as u64);
        UnreadState {
            dialogs,
            per_conversation,
        }
    }
}

// ----------------------------------------------------------------------------
// Inbox Frames
// ----------------------------------------------------------------------------

/// Inbound inbox frames, keyed by the `type` discriminator
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboxServerFrame {
    /// Wholesale replacement of the unread counters
    UnreadState { unread: UnreadSnapshot },
    /// Upsert of one conversation, with an authoritative unread snapshot
    InboxItem {
        item: ConversationSummary,
        unread: UnreadSnapshot,
    },
    /// Server confirmation of a mark-read command
    MarkReadAck {
        #[serde(rename = "roomSlug")]
        room_slug: String,
        unread: UnreadSnapshot,
    },
    /// Server heartbeat; no state change
    Ping,
    /// Server-side rejection of a command
    Error { code: String },
    /// Unrecognized frame type; ignored
    #[serde(other)]
    Unknown,
}

/// Outbound inbox commands
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboxCommand {
    /// Clear the unread counter for one conversation
    MarkRead {
        #[serde(rename = "roomSlug")]
        room_slug: String,
    },
    /// Declare which conversation is currently open (None clears it)
    SetActiveRoom {
        #[serde(rename = "roomSlug")]
        room_slug: Option<String>,
    },
    /// Client heartbeat keeping the active-room lease alive
    Ping,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_update_roster_and_guests() {
        let update: PresenceUpdate = serde_json::from_str(
            r#"{"online":[{"username":"alice","profileImage":null}],"guests":3}"#,
        )
        .unwrap();

        let online = update.online.unwrap();
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].username, "alice");
        assert_eq!(online[0].profile_image, None);
        assert_eq!(update.guests, Some(3));
    }

    #[test]
    fn test_presence_update_guests_only() {
        let update: PresenceUpdate = serde_json::from_str(r#"{"guests":7}"#).unwrap();
        assert!(update.online.is_none());
        assert_eq!(update.guests, Some(7));
    }

    #[test]
    fn test_presence_server_ping_is_empty_update() {
        let update: PresenceUpdate = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(update.is_empty());
    }

    #[test]
    fn test_presence_ping_serialization() {
        let frame = serde_json::to_string(&PresenceCommand::Ping { ts: 12345 }).unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "ping");
        assert_eq!(value["ts"], 12345);
    }

    #[test]
    fn test_unread_snapshot_counts_win() {
        let snapshot: UnreadSnapshot = serde_json::from_str(
            r#"{"dialogs":2,"slugs":["dm_a","dm_b"],"counts":{"dm_a":4,"dm_b":1}}"#,
        )
        .unwrap();
        let unread = snapshot.normalize();
        assert_eq!(unread.dialogs, 2);
        assert_eq!(unread.per_conversation.get("dm_a"), Some(&4));
        assert_eq!(unread.per_conversation.get("dm_b"), Some(&1));
    }

    #[test]
    fn test_unread_snapshot_slugs_only_implies_one_each() {
        let snapshot: UnreadSnapshot =
            serde_json::from_str(r#"{"slugs":["dm_a","dm_b"]}"#).unwrap();
        let unread = snapshot.normalize();
        assert_eq!(unread.dialogs, 2);
        assert_eq!(unread.per_conversation.get("dm_a"), Some(&1));
        assert_eq!(unread.per_conversation.get("dm_b"), Some(&1));
    }

    #[test]
    fn test_inbox_frame_unread_state() {
        let frame: InboxServerFrame = serde_json::from_str(
            r#"{"type":"unread_state","unread":{"dialogs":1,"slugs":["dm_x"],"counts":{"dm_x":2}}}"#,
        )
        .unwrap();
        match frame {
            InboxServerFrame::UnreadState { unread } => {
                assert_eq!(unread.dialogs, Some(1));
                assert_eq!(unread.counts.get("dm_x"), Some(&2));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_inbox_frame_item() {
        let frame: InboxServerFrame = serde_json::from_str(
            r#"{
                "type": "inbox_item",
                "item": {
                    "slug": "dm_alice",
                    "peer": {"username": "alice", "profileImage": "/media/alice.png"},
                    "lastMessage": "hi",
                    "lastMessageAt": "2024-05-01T12:00:00+00:00"
                },
                "unread": {"dialogs": 1, "slugs": ["dm_alice"], "counts": {"dm_alice": 1}}
            }"#,
        )
        .unwrap();
        match frame {
            InboxServerFrame::InboxItem { item, .. } => {
                assert_eq!(item.slug, "dm_alice");
                assert_eq!(item.peer.username, "alice");
                assert_eq!(item.last_message, "hi");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_inbox_frame_unknown_type_is_ignored() {
        let frame: InboxServerFrame =
            serde_json::from_str(r#"{"type":"totally_new_thing","payload":{}}"#).unwrap();
        assert!(matches!(frame, InboxServerFrame::Unknown));
    }

    #[test]
    fn test_inbox_command_serialization() {
        let frame = serde_json::to_string(&InboxCommand::MarkRead {
            room_slug: "dm_alice".to_string(),
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "mark_read");
        assert_eq!(value["roomSlug"], "dm_alice");

        let frame =
            serde_json::to_string(&InboxCommand::SetActiveRoom { room_slug: None }).unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "set_active_room");
        assert!(value["roomSlug"].is_null());
    }
}
