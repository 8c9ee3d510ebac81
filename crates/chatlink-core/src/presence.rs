//! Presence roster state
//!
//! Best-effort view of online users and the anonymous guest counter.
//! Inbound payloads are snapshots, never deltas: a payload carrying an
//! `online` list replaces the roster wholesale, a payload carrying `guests`
//! replaces the counter the same way.

use serde::{Deserialize, Serialize};

use crate::wire::PresenceUpdate;

// ----------------------------------------------------------------------------
// Roster Types
// ----------------------------------------------------------------------------

/// One online user as broadcast by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub username: String,
    #[serde(rename = "profileImage")]
    pub profile_image: Option<String>,
}

/// Snapshot of who is online, replaced wholesale on each update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceSnapshot {
    pub online: Vec<RosterEntry>,
    pub guest_count: u64,
}

impl PresenceSnapshot {
    /// Whether a given user appears in the roster
    pub fn contains(&self, username: &str) -> bool {
        self.online.iter().any(|entry| entry.username == username)
    }
}

/// Who is looking at the presence roster
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viewer {
    /// Logged-in user; receives the full roster
    Authenticated { username: String },
    /// Guest session; receives the guest counter only
    Anonymous,
}

// ----------------------------------------------------------------------------
// Presence State
// ----------------------------------------------------------------------------

/// Tracker-owned presence state
///
/// While the owning application is not ready (auth bootstrap in flight) the
/// snapshot is forced empty and inbound updates are discarded.
#[derive(Debug, Clone, Default)]
pub struct PresenceState {
    snapshot: PresenceSnapshot,
    ready: bool,
}

impl PresenceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot (empty until ready)
    pub fn snapshot(&self) -> &PresenceSnapshot {
        &self.snapshot
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Flip readiness; going not-ready resets the snapshot to empty
    pub fn set_ready(&mut self, ready: bool) {
        if self.ready && !ready {
            self.snapshot = PresenceSnapshot::default();
        }
        self.ready = ready;
    }

    /// Apply an inbound payload, replacing whichever sides it carries
    ///
    /// For an authenticated viewer with a locally known avatar, their own
    /// roster entry is overridden with that avatar so a stale broadcast
    /// cannot outlive a just-made profile edit.
    pub fn apply(&mut self, update: PresenceUpdate, viewer: &Viewer, local_avatar: Option<&str>) {
        if !self.ready {
            return;
        }

        if let Some(mut online) = update.online {
            if let (Viewer::Authenticated { username }, Some(avatar)) = (viewer, local_avatar) {
                for entry in &mut online {
                    if entry.username == *username {
                        entry.profile_image = Some(avatar.to_string());
                    }
                }
            }
            self.snapshot.online = online;
        }

        if let Some(guests) = update.guests {
            self.snapshot.guest_count = guests;
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
