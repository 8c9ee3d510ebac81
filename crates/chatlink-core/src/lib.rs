//! Chatlink core protocol state
//!
//! This crate contains the pure, IO-free half of the chatlink realtime
//! layer:
//! - The reconnecting-connection state machine (`connection`)
//! - Presence roster state (`presence`)
//! - Direct-message inbox state (`inbox`)
//! - JSON wire frames for both channels (`wire`)
//!
//! The companion `chatlink-runtime` crate drives these state machines with
//! real transports and timers. Everything here is deterministic and
//! unit-testable without a network or an async runtime.

pub mod config;
pub mod connection;
pub mod errors;
pub mod inbox;
pub mod presence;
pub mod types;
pub mod wire;

pub use config::{ChannelConfig, HeartbeatConfig, ReconnectConfig};
pub use connection::{
    is_normal_close, ConnectionEffect, ConnectionEvent, ConnectionState, ConnectionStatus,
    StateTransition,
};
pub use errors::{ChatlinkError, ChatlinkResult, ErrorKind};
pub use inbox::{ConversationSummary, InboxState, PeerRef, UnreadState};
pub use presence::{PresenceSnapshot, PresenceState, RosterEntry, Viewer};
pub use types::{SystemTimeSource, TimeSource, Timestamp};
pub use wire::{InboxCommand, InboxServerFrame, PresenceCommand, PresenceUpdate, UnreadSnapshot};
