//! Direct-message inbox state
//!
//! Ordered conversation list, unread counters and active-room tracking,
//! reconciling one bulk fetch with incremental push events. Inbound events
//! carry full-replace/upsert semantics: re-applying an event is a no-op
//! beyond re-setting the same values.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Conversation Types
// ----------------------------------------------------------------------------

/// The other participant of a direct conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRef {
    pub username: String,
    #[serde(rename = "profileImage")]
    pub profile_image: Option<String>,
}

/// One direct conversation as listed in the inbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub slug: String,
    pub peer: PeerRef,
    #[serde(rename = "lastMessage")]
    pub last_message: String,
    /// Server-issued ISO 8601 timestamp of the last message
    #[serde(rename = "lastMessageAt")]
    pub last_message_at: String,
}

// ----------------------------------------------------------------------------
// Unread State
// ----------------------------------------------------------------------------

/// Unread counters: aggregate dialog count plus per-conversation counts
///
/// Invariant: `dialogs` equals the number of entries in `per_conversation`
/// with a value above zero, unless an authoritative server snapshot said
/// otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnreadState {
    pub dialogs: u64,
    pub per_conversation: HashMap<String, u32>,
}

impl UnreadState {
    /// Unread count for one conversation
    pub fn count_for(&self, slug: &str) -> u32 {
        self.per_conversation.get(slug).copied().unwrap_or(0)
    }

    /// Recompute the aggregate from the per-conversation map
    fn recompute_dialogs(&mut self) {
        self.dialogs = self.per_conversation.values().filter(|c| **c > 0).count() as u64;
    }
}

// ----------------------------------------------------------------------------
// Inbox State
// ----------------------------------------------------------------------------

/// Synchronizer-owned inbox state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboxState {
    /// Conversations ordered most-recent-first
    pub conversations: Vec<ConversationSummary>,
    pub unread: UnreadState,
    /// Conversation currently open in the UI, if any
    pub active_room: Option<String>,
}

impl InboxState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the ordered list from the initial bulk fetch
    ///
    /// The fetch result is already ordered most-recent-first; duplicate
    /// slugs keep their first (most recent) occurrence.
    pub fn seed(&mut self, list: Vec<ConversationSummary>) {
        let mut seen = std::collections::HashSet::new();
        self.conversations = list
            .into_iter()
            .filter(|item| seen.insert(item.slug.clone()))
            .collect();
    }

    /// Replace the unread counters wholesale with an authoritative snapshot
    pub fn apply_unread(&mut self, unread: UnreadState) {
        self.unread = unread;
        self.pin_active_room();
    }

    /// Upsert one conversation and move it to the front of the order
    ///
    /// A slug not seen before inserts a new entry at the front rather than
    /// being dropped, so brand-new conversations are never lost. Keyed by
    /// slug identity only; entries are never duplicated.
    pub fn upsert_item(&mut self, item: ConversationSummary, unread: UnreadState) {
        if let Some(position) = self
            .conversations
            .iter()
            .position(|existing| existing.slug == item.slug)
        {
            self.conversations.remove(position);
        }
        self.conversations.insert(0, item);
        self.apply_unread(unread);
    }

    /// Apply the authoritative snapshot carried by a mark-read ack
    pub fn apply_mark_read_ack(&mut self, unread: UnreadState) {
        self.apply_unread(unread);
    }

    /// Optimistically zero the unread count for one conversation
    ///
    /// Applied synchronously before any ack arrives; the ack's authoritative
    /// snapshot reconciles later. Returns whether anything changed.
    pub fn mark_read_local(&mut self, slug: &str) -> bool {
        match self.unread.per_conversation.remove(slug) {
            Some(count) if count > 0 => {
                self.unread.recompute_dialogs();
                true
            }
            Some(_) => false,
            None => false,
        }
    }

    /// Track which conversation is currently open
    ///
    /// While a room is active its unread count is pinned at zero.
    pub fn set_active_room(&mut self, slug: Option<String>) {
        self.active_room = slug;
        self.pin_active_room();
    }

    /// Reset to empty (ready flag went false)
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Enforce the active-room pin after any unread change
    fn pin_active_room(&mut self) {
        let Some(active) = self.active_room.clone() else {
            return;
        };
        if matches!(self.unread.per_conversation.remove(&active), Some(count) if count > 0) {
            self.unread.dialogs = self.unread.dialogs.saturating_sub(1);
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(slug: &str, last_message: &str, at: &str) -> ConversationSummary {
        ConversationSummary {
            slug: slug.to_string(),
            peer: PeerRef {
                username: format!("peer_of_{slug}"),
                profile_image: None,
            },
            last_message: last_message.to_string(),
            last_message_at: at.to_string(),
        }
    }

    fn unread(entries: &[(&str, u32)]) -> UnreadState {
        let per_conversation: HashMap<String, u32> = entries
            .iter()
            .map(|(slug, count)| (slug.to_string(), *count))
            .collect();
        let dialogs = per_conversation.values().filter(|c| **c > 0).count() as u64;
        UnreadState {
            dialogs,
            per_conversation,
        }
    }

    fn slugs(state: &InboxState) -> Vec<&str> {
        state
            .conversations
            .iter()
            .map(|c| c.slug.as_str())
            .collect()
    }

    #[test]
    fn test_seed_preserves_order_and_dedupes() {
        let mut state = InboxState::new();
        state.seed(vec![
            summary("dm_new", "later", "11:00"),
            summary("dm_old", "earlier", "10:00"),
            summary("dm_new", "duplicate", "09:00"),
        ]);
        assert_eq!(slugs(&state), vec!["dm_new", "dm_old"]);
        assert_eq!(state.conversations[0].last_message, "later");
    }

    #[test]
    fn test_existing_item_moves_to_front() {
        let mut state = InboxState::new();
        state.seed(vec![
            summary("dm_new", "later", "11:00"),
            summary("dm_old", "earlier", "10:00"),
        ]);

        state.upsert_item(summary("dm_old", "fresh reply", "12:00"), unread(&[]));
        assert_eq!(slugs(&state), vec!["dm_old", "dm_new"]);
        assert_eq!(state.conversations[0].last_message, "fresh reply");
    }

    #[test]
    fn test_unseen_slug_inserts_at_front() {
        // A push for a conversation the bulk fetch never listed creates a
        // new entry instead of being dropped.
        let mut state = InboxState::new();
        state.seed(vec![summary("dm_old", "earlier", "10:00")]);

        state.upsert_item(
            summary("dm_brand_new", "hello", "12:00"),
            unread(&[("dm_brand_new", 1)]),
        );
        assert_eq!(slugs(&state), vec!["dm_brand_new", "dm_old"]);
        assert_eq!(state.unread.count_for("dm_brand_new"), 1);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let mut state = InboxState::new();
        state.seed(vec![summary("dm_a", "one", "10:00")]);

        let item = summary("dm_b", "two", "11:00");
        let counts = unread(&[("dm_b", 1)]);
        state.upsert_item(item.clone(), counts.clone());
        let once = state.clone();
        state.upsert_item(item, counts);

        assert_eq!(state, once);
        assert_eq!(state.conversations.len(), 2);
    }

    #[test]
    fn test_unread_replaced_wholesale() {
        let mut state = InboxState::new();
        state.apply_unread(unread(&[("dm_a", 3), ("dm_b", 1)]));
        assert_eq!(state.unread.dialogs, 2);

        state.apply_unread(unread(&[("dm_c", 2)]));
        assert_eq!(state.unread.dialogs, 1);
        assert_eq!(state.unread.count_for("dm_a"), 0);
        assert_eq!(state.unread.count_for("dm_c"), 2);
    }

    #[test]
    fn test_mark_read_local_is_synchronous() {
        let mut state = InboxState::new();
        state.apply_unread(unread(&[("dm_a", 3), ("dm_b", 1)]));

        assert!(state.mark_read_local("dm_a"));
        assert_eq!(state.unread.count_for("dm_a"), 0);
        assert_eq!(state.unread.dialogs, 1);

        // Second application changes nothing.
        assert!(!state.mark_read_local("dm_a"));
        assert_eq!(state.unread.dialogs, 1);
    }

    #[test]
    fn test_ack_snapshot_reconciles_after_optimistic_read() {
        let mut state = InboxState::new();
        state.apply_unread(unread(&[("dm_a", 3), ("dm_b", 1)]));
        state.mark_read_local("dm_a");

        // Server ack arrives with the authoritative result.
        state.apply_mark_read_ack(unread(&[("dm_b", 1)]));
        assert_eq!(state.unread.dialogs, 1);
        assert_eq!(state.unread.count_for("dm_b"), 1);
    }

    #[test]
    fn test_active_room_pins_unread_at_zero() {
        let mut state = InboxState::new();
        state.set_active_room(Some("dm_a".to_string()));

        // Authoritative snapshot racing the active-room declaration still
        // ends with the open conversation at zero.
        state.apply_unread(unread(&[("dm_a", 2), ("dm_b", 1)]));
        assert_eq!(state.unread.count_for("dm_a"), 0);
        assert_eq!(state.unread.count_for("dm_b"), 1);
        assert_eq!(state.unread.dialogs, 1);
    }

    #[test]
    fn test_clearing_active_room_stops_pinning() {
        let mut state = InboxState::new();
        state.set_active_room(Some("dm_a".to_string()));
        state.set_active_room(None);

        state.apply_unread(unread(&[("dm_a", 2)]));
        assert_eq!(state.unread.count_for("dm_a"), 2);
        assert_eq!(state.unread.dialogs, 1);
    }

    #[test]
    fn test_reordering_never_drops_entries() {
        let mut state = InboxState::new();
        state.seed(vec![
            summary("dm_a", "a", "10:00"),
            summary("dm_b", "b", "09:00"),
            summary("dm_c", "c", "08:00"),
        ]);

        state.upsert_item(summary("dm_c", "c2", "11:00"), unread(&[]));
        state.upsert_item(summary("dm_b", "b2", "12:00"), unread(&[]));
        assert_eq!(slugs(&state), vec!["dm_b", "dm_c", "dm_a"]);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut state = InboxState::new();
        state.seed(vec![summary("dm_a", "a", "10:00")]);
        state.apply_unread(unread(&[("dm_a", 1)]));
        state.set_active_room(Some("dm_a".to_string()));

        state.reset();
        assert_eq!(state, InboxState::default());
    }
}
