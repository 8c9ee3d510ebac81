//! Presence tracker actor
//!
//! Owns one connection manager pointed at the presence endpoint and keeps a
//! [`PresenceView`] up to date from inbound roster payloads. While Online it
//! heartbeats on a fixed cadence, starting with an immediate ping on every
//! transition into Online.
//!
//! Anonymous viewers may need a guest identity before the endpoint accepts
//! them: when a [`GuestSession`] collaborator is supplied, the URL is
//! withheld from the manager until the handshake resolves, so no connect is
//! attempted with missing credentials.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use url::Url;

use chatlink_core::{
    ChannelConfig, ChatlinkResult, ConnectionState, HeartbeatConfig, PresenceCommand,
    PresenceSnapshot, PresenceState, PresenceUpdate, ReconnectConfig, TimeSource, Viewer,
};

use crate::manager::{next_frame, ConnectionHandle, ConnectionManager};
use crate::transport::Transport;

// ----------------------------------------------------------------------------
// Collaborators
// ----------------------------------------------------------------------------

/// Establishes a guest identity before an anonymous viewer connects
///
/// Implementations must be idempotent: the tracker calls this once per
/// spawn, but a remount calls it again.
#[async_trait]
pub trait GuestSession: Send + Sync + 'static {
    async fn establish(&self) -> ChatlinkResult<()>;
}

/// Locally known avatar for the signed-in user
///
/// When this returns `Some`, the viewer's own roster entry is overridden
/// with it so a just-made profile edit wins over stale broadcasts.
pub trait AvatarSource: Send + Sync + 'static {
    fn current_avatar(&self) -> Option<String>;
}

// ----------------------------------------------------------------------------
// Configuration and View
// ----------------------------------------------------------------------------

/// Presence tracker configuration
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// Presence endpoint; None keeps the tracker idle until set
    pub url: Option<Url>,
    pub viewer: Viewer,
    pub reconnect: ReconnectConfig,
    pub heartbeat: HeartbeatConfig,
    pub channels: ChannelConfig,
}

impl PresenceConfig {
    pub fn new(url: Option<Url>, viewer: Viewer) -> Self {
        Self {
            url,
            viewer,
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            channels: ChannelConfig::default(),
        }
    }
}

/// UI-facing presence state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceView {
    pub snapshot: PresenceSnapshot,
    /// Local failure (guest handshake) that did not stop the tracker
    pub error: Option<String>,
}

// ----------------------------------------------------------------------------
// Handle
// ----------------------------------------------------------------------------

#[derive(Debug)]
enum TrackerCommand {
    SetReady(bool),
    Shutdown,
}

/// Caller-facing handle to a running presence tracker
#[derive(Debug)]
pub struct PresenceHandle {
    view_rx: watch::Receiver<PresenceView>,
    state_rx: watch::Receiver<ConnectionState>,
    command_tx: mpsc::Sender<TrackerCommand>,
}

impl PresenceHandle {
    /// Current view
    pub fn view(&self) -> PresenceView {
        self.view_rx.borrow().clone()
    }

    /// Watch channel publishing every view change
    pub fn watch_view(&self) -> watch::Receiver<PresenceView> {
        self.view_rx.clone()
    }

    /// Current connection state of the underlying manager
    pub fn connection(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch channel publishing every connection state change
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Flip application readiness; not-ready forces an empty snapshot
    pub fn set_ready(&self, ready: bool) {
        if self
            .command_tx
            .try_send(TrackerCommand::SetReady(ready))
            .is_err()
        {
            debug!("tracker gone, set_ready dropped");
        }
    }

    /// Stop the tracker and tear down its connection
    pub fn shutdown(&self) {
        if self.command_tx.try_send(TrackerCommand::Shutdown).is_err() {
            debug!("tracker gone, shutdown dropped");
        }
    }
}

// ----------------------------------------------------------------------------
// Actor
// ----------------------------------------------------------------------------

/// The presence tracker actor; constructed and consumed by [`spawn`]
///
/// [`spawn`]: PresenceTracker::spawn
pub struct PresenceTracker<T: TimeSource> {
    viewer: Viewer,
    state: PresenceState,
    error: Option<String>,
    avatars: Option<Arc<dyn AvatarSource>>,
    time: T,
    connection: ConnectionHandle,
    view_tx: watch::Sender<PresenceView>,
    command_rx: mpsc::Receiver<TrackerCommand>,
    /// URL withheld until the guest handshake resolves
    deferred_url: Option<Url>,
    handshake_rx: Option<oneshot::Receiver<ChatlinkResult<()>>>,
    was_online: bool,
}

impl<T: TimeSource + Send + 'static> PresenceTracker<T> {
    /// Start a tracker task and return its handle
    pub fn spawn(
        config: PresenceConfig,
        transport: Arc<dyn Transport>,
        network_rx: watch::Receiver<bool>,
        session: Option<Arc<dyn GuestSession>>,
        avatars: Option<Arc<dyn AvatarSource>>,
        time: T,
    ) -> PresenceHandle {
        // Anonymous viewers with a session collaborator must not connect
        // before the handshake grants them an identity.
        let handshake_session = match (&config.viewer, &config.url) {
            (Viewer::Anonymous, Some(_)) => session,
            _ => None,
        };
        let manager_url = if handshake_session.is_some() {
            None
        } else {
            config.url.clone()
        };
        let deferred_url = if handshake_session.is_some() {
            config.url.clone()
        } else {
            None
        };

        let mut connection = ConnectionManager::spawn(
            manager_url,
            transport,
            network_rx,
            config.reconnect,
            config.channels,
        );
        let inbound = connection.take_inbound();
        let state_rx = connection.watch_state();

        let handshake_rx = handshake_session.map(|session| {
            let (tx, rx) = oneshot::channel();
            tokio::spawn(async move {
                let _ = tx.send(session.establish().await);
            });
            rx
        });

        let (view_tx, view_rx) = watch::channel(PresenceView::default());
        let (command_tx, command_rx) = mpsc::channel(config.channels.command_buffer_size);

        let mut actor = PresenceTracker {
            viewer: config.viewer,
            state: PresenceState::new(),
            error: None,
            avatars,
            time,
            connection,
            view_tx,
            command_rx,
            deferred_url,
            handshake_rx,
            was_online: false,
        };
        let heartbeat = config.heartbeat;
        tokio::spawn(async move { actor.run(inbound, heartbeat).await });

        PresenceHandle {
            view_rx,
            state_rx,
            command_tx,
        }
    }

    async fn run(&mut self, mut inbound: Option<mpsc::Receiver<String>>, heartbeat: HeartbeatConfig) {
        let mut conn_rx = self.connection.watch_state();
        let mut ticker = tokio::time::interval(heartbeat.interval);

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(TrackerCommand::SetReady(ready)) => {
                        self.state.set_ready(ready);
                        self.publish();
                    }
                    Some(TrackerCommand::Shutdown) | None => break,
                },

                changed = conn_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = conn_rx.borrow_and_update().can_send();
                    if online && !self.was_online {
                        // Immediate heartbeat on every entry into Online,
                        // then the fixed cadence.
                        self.send_ping();
                        ticker.reset();
                    }
                    self.was_online = online;
                },

                frame = next_frame(&mut inbound) => match frame {
                    Some(text) => self.handle_frame(&text),
                    None => break,
                },

                _ = ticker.tick() => {
                    if self.was_online {
                        self.send_ping();
                    }
                },

                result = handshake_done(&mut self.handshake_rx) => {
                    self.handshake_rx = None;
                    self.handle_handshake(result);
                },
            }
        }

        self.connection.shutdown();
        info!("presence tracker stopped");
    }

    fn handle_frame(&mut self, text: &str) {
        let update: PresenceUpdate = match serde_json::from_str(text) {
            Ok(update) => update,
            Err(error) => {
                warn!(%error, "malformed presence payload dropped");
                return;
            }
        };
        if update.is_empty() {
            // Server heartbeat.
            return;
        }
        let avatar = self.avatars.as_ref().and_then(|a| a.current_avatar());
        self.state.apply(update, &self.viewer, avatar.as_deref());
        self.publish();
    }

    fn handle_handshake(&mut self, result: ChatlinkResult<()>) {
        match result {
            Ok(()) => {
                debug!("guest session established");
                self.error = None;
                self.connection.set_url(self.deferred_url.take());
            }
            Err(error) => {
                warn!(%error, "guest session handshake failed");
                self.error = Some(error.to_string());
            }
        }
        self.publish();
    }

    fn send_ping(&self) {
        let ping = PresenceCommand::Ping {
            ts: self.time.now().as_millis(),
        };
        match serde_json::to_string(&ping) {
            Ok(payload) => {
                if !self.connection.send(&payload) {
                    debug!("heartbeat skipped, connection not online");
                }
            }
            Err(error) => warn!(%error, "heartbeat serialization failed"),
        }
    }

    fn publish(&self) {
        self.view_tx.send_replace(PresenceView {
            snapshot: self.state.snapshot().clone(),
            error: self.error.clone(),
        });
    }
}

/// Resolution of the guest handshake; pends forever while none is in flight
async fn handshake_done(
    rx: &mut Option<oneshot::Receiver<ChatlinkResult<()>>>,
) -> ChatlinkResult<()> {
    match rx {
        Some(rx) => match rx.await {
            Ok(result) => result,
            Err(_) => Err(chatlink_core::ChatlinkError::ChannelClosed {
                context: "guest handshake",
            }),
        },
        None => std::future::pending().await,
    }
}
