//! Chatlink tokio runtime
//!
//! Drives the pure state machines from `chatlink-core` with real IO: a
//! WebSocket transport, backoff and heartbeat timers, and host connectivity
//! reports. Each consumer owns one actor task:
//!
//! - [`ConnectionManager`] runs one reconnecting logical connection
//! - [`PresenceTracker`] keeps the online roster and guest counter current
//! - [`DirectInboxSynchronizer`] reconciles the direct-message inbox
//!
//! Handles communicate with their actor over channels only; state flows
//! back on watch channels, so UI layers can poll or subscribe without
//! touching the actors.

pub mod inbox;
pub mod manager;
pub mod network;
pub mod presence;
pub mod transport;

pub use inbox::{ConversationDirectory, DirectInboxSynchronizer, InboxConfig, InboxHandle, InboxView};
pub use manager::{ConnectionHandle, ConnectionManager};
pub use network::NetworkMonitor;
pub use presence::{
    AvatarSource, GuestSession, PresenceConfig, PresenceHandle, PresenceTracker, PresenceView,
};
pub use transport::{Transport, TransportEvent, TransportEvents, TransportSink, WebSocketTransport};
