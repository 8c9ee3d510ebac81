//! Reconnecting connection state machine
//!
//! Pure state transitions for one logical streaming connection. The runtime
//! feeds transport and timer events in, executes the returned effects (open
//! a transport, arm a backoff timer, tear down), and publishes the resulting
//! state to consumers. Transitions are total: an event that does not apply
//! to the current status leaves the state unchanged with no effects.

use serde::{Deserialize, Serialize};

use crate::config::ReconnectConfig;
use crate::errors::ErrorKind;

// ----------------------------------------------------------------------------
// Connection State Types
// ----------------------------------------------------------------------------

/// Lifecycle status of the logical connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// No URL configured; no transport object exists
    Idle,
    /// A transport open is in flight
    Connecting,
    /// Transport is open; `send` is permitted
    Online,
    /// Host reports no network connectivity; waiting for it to resume
    Offline,
    /// Transport closed; a reconnect may be pending
    Closed,
    /// Terminal failure; no further automatic attempts
    Error,
}

impl core::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConnectionStatus::Idle => write!(f, "Idle"),
            ConnectionStatus::Connecting => write!(f, "Connecting"),
            ConnectionStatus::Online => write!(f, "Online"),
            ConnectionStatus::Offline => write!(f, "Offline"),
            ConnectionStatus::Closed => write!(f, "Closed"),
            ConnectionStatus::Error => write!(f, "Error"),
        }
    }
}

/// Observable state of one logical connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub last_error: Option<ErrorKind>,
    pub retry_count: u32,
}

impl ConnectionState {
    /// Initial state before a URL is configured
    pub fn new_idle() -> Self {
        Self {
            status: ConnectionStatus::Idle,
            last_error: None,
            retry_count: 0,
        }
    }

    /// Whether outbound payloads are accepted right now
    pub fn can_send(&self) -> bool {
        self.status == ConnectionStatus::Online
    }

    /// Whether the connection is terminally failed
    pub fn is_terminal(&self) -> bool {
        self.status == ConnectionStatus::Error
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new_idle()
    }
}

// ----------------------------------------------------------------------------
// State Transition Events
// ----------------------------------------------------------------------------

/// Events that drive connection state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A (new) non-null URL was supplied; `network_up` is the host's current
    /// connectivity report
    UrlConfigured { network_up: bool },
    /// The URL was cleared; the connection returns to Idle
    UrlCleared,
    /// Host connectivity resumed
    NetworkUp,
    /// Host connectivity was lost
    NetworkDown,
    /// The transport open completed
    TransportOpened,
    /// The transport closed with the given close code (None when the stream
    /// ended without a close frame)
    TransportClosed { code: Option<u16> },
    /// The transport reported an error; a close event follows
    TransportError,
    /// The backoff timer fired
    RetryElapsed,
    /// The owning consumer is going away
    Teardown,
}

/// Side effects the runtime must execute after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEffect {
    /// Open a fresh transport toward the configured URL
    OpenTransport,
    /// Close the live transport with a normal code, if one exists
    CloseTransport,
    /// Arm the backoff timer for the given attempt number
    ScheduleRetry { attempt: u32 },
    /// Cancel a pending backoff timer, if one is armed
    CancelRetry,
}

/// Result of a state transition
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub new_state: ConnectionState,
    pub effects: Vec<ConnectionEffect>,
}

// ----------------------------------------------------------------------------
// Close Code Classification
// ----------------------------------------------------------------------------

/// Whether a close code signifies intentional shutdown (no reconnect)
///
/// 1000 (normal) and 1001 (going away) are the only graceful codes; the
/// server's private idle/unauthorized codes count as abnormal and reconnect.
pub fn is_normal_close(code: u16) -> bool {
    matches!(code, 1000 | 1001)
}

// ----------------------------------------------------------------------------
// State Machine Implementation
// ----------------------------------------------------------------------------

impl ConnectionState {
    /// Process an event and transition to a new state (consumes self)
    pub fn transition(self, event: ConnectionEvent, config: &ReconnectConfig) -> StateTransition {
        use ConnectionStatus::*;

        let (new_state, effects) = match (self.status, event) {
            // A fresh URL always restarts the cycle, including out of the
            // terminal Error state.
            (_, ConnectionEvent::UrlConfigured { network_up }) => {
                if network_up {
                    (
                        ConnectionState {
                            status: Connecting,
                            last_error: None,
                            retry_count: 0,
                        },
                        vec![
                            ConnectionEffect::CancelRetry,
                            ConnectionEffect::CloseTransport,
                            ConnectionEffect::OpenTransport,
                        ],
                    )
                } else {
                    (
                        ConnectionState {
                            status: Offline,
                            last_error: None,
                            retry_count: 0,
                        },
                        vec![
                            ConnectionEffect::CancelRetry,
                            ConnectionEffect::CloseTransport,
                        ],
                    )
                }
            }

            (_, ConnectionEvent::UrlCleared) => (
                ConnectionState::new_idle(),
                vec![
                    ConnectionEffect::CancelRetry,
                    ConnectionEffect::CloseTransport,
                ],
            ),

            (_, ConnectionEvent::Teardown) => (
                ConnectionState {
                    status: Closed,
                    ..self
                },
                vec![
                    ConnectionEffect::CancelRetry,
                    ConnectionEffect::CloseTransport,
                ],
            ),

            // Connectivity loss pre-empts whatever the transport was doing;
            // Idle, Closed and Error are unaffected.
            (Connecting | Online, ConnectionEvent::NetworkDown) => (
                ConnectionState {
                    status: Offline,
                    ..self
                },
                vec![
                    ConnectionEffect::CancelRetry,
                    ConnectionEffect::CloseTransport,
                ],
            ),
            (Closed, ConnectionEvent::NetworkDown) => (
                ConnectionState {
                    status: Offline,
                    ..self
                },
                vec![ConnectionEffect::CancelRetry],
            ),

            (Offline, ConnectionEvent::NetworkUp) => (
                ConnectionState {
                    status: Connecting,
                    ..self
                },
                vec![ConnectionEffect::OpenTransport],
            ),

            (Connecting, ConnectionEvent::TransportOpened) => (
                ConnectionState {
                    status: Online,
                    last_error: None,
                    retry_count: 0,
                },
                Vec::new(),
            ),

            (Connecting | Online, ConnectionEvent::TransportClosed { code }) => {
                match code {
                    Some(code) if is_normal_close(code) => (
                        ConnectionState {
                            status: Closed,
                            ..self
                        },
                        Vec::new(),
                    ),
                    // Abnormal close: another failed attempt.
                    _ => self.fail_attempt(config),
                }
            }

            (Connecting | Online, ConnectionEvent::TransportError) => (
                ConnectionState {
                    last_error: Some(ErrorKind::ConnectionError),
                    ..self
                },
                Vec::new(),
            ),

            (Closed, ConnectionEvent::RetryElapsed) => (
                ConnectionState {
                    status: Connecting,
                    ..self
                },
                vec![ConnectionEffect::OpenTransport],
            ),

            // Anything else does not apply to the current status.
            (_, _) => (self, Vec::new()),
        };

        StateTransition { new_state, effects }
    }

    /// Record a failed attempt: schedule a reconnect or go terminal
    fn fail_attempt(self, config: &ReconnectConfig) -> (ConnectionState, Vec<ConnectionEffect>) {
        if self.retry_count >= config.max_retries {
            (
                ConnectionState {
                    status: ConnectionStatus::Error,
                    last_error: Some(ErrorKind::ReconnectLimit),
                    retry_count: self.retry_count,
                },
                Vec::new(),
            )
        } else {
            (
                ConnectionState {
                    status: ConnectionStatus::Closed,
                    last_error: Some(ErrorKind::ConnectionError),
                    retry_count: self.retry_count + 1,
                },
                vec![ConnectionEffect::ScheduleRetry {
                    attempt: self.retry_count,
                }],
            )
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
