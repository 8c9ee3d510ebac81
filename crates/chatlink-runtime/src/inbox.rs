//! Direct-inbox synchronizer actor
//!
//! Owns one connection manager pointed at the inbox endpoint and reconciles
//! three inputs into an [`InboxView`]: the initial conversation fetch from a
//! [`ConversationDirectory`], push frames from the server, and local user
//! actions (mark-read, active-room changes).
//!
//! Fetches run as detached tasks tagged with a generation counter; a result
//! arriving after the ready flag flipped or a newer refresh started is
//! discarded instead of clobbering fresher state.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use url::Url;

use chatlink_core::{
    ChannelConfig, ChatlinkResult, ConnectionState, ConversationSummary, HeartbeatConfig,
    InboxCommand, InboxServerFrame, InboxState, ReconnectConfig,
};

use crate::manager::{next_frame, ConnectionHandle, ConnectionManager};
use crate::transport::Transport;

// ----------------------------------------------------------------------------
// Collaborators
// ----------------------------------------------------------------------------

/// Source of the initial conversation list, ordered most-recent-first
#[async_trait]
pub trait ConversationDirectory: Send + Sync + 'static {
    async fn list_conversations(&self) -> ChatlinkResult<Vec<ConversationSummary>>;
}

// ----------------------------------------------------------------------------
// Configuration and View
// ----------------------------------------------------------------------------

/// Inbox synchronizer configuration
#[derive(Debug, Clone)]
pub struct InboxConfig {
    /// Inbox endpoint; None keeps the synchronizer idle until set
    pub url: Option<Url>,
    pub reconnect: ReconnectConfig,
    pub heartbeat: HeartbeatConfig,
    pub channels: ChannelConfig,
}

impl InboxConfig {
    pub fn new(url: Option<Url>) -> Self {
        Self {
            url,
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            channels: ChannelConfig::default(),
        }
    }
}

/// UI-facing inbox state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboxView {
    pub inbox: InboxState,
    /// Local failure (fetch, server rejection) that did not stop the actor
    pub error: Option<String>,
}

// ----------------------------------------------------------------------------
// Handle
// ----------------------------------------------------------------------------

#[derive(Debug)]
enum SyncCommand {
    SetReady(bool),
    MarkRead(String),
    SetActiveRoom(Option<String>),
    Refresh,
    Shutdown,
}

/// Caller-facing handle to a running inbox synchronizer
#[derive(Debug)]
pub struct InboxHandle {
    view_rx: watch::Receiver<InboxView>,
    state_rx: watch::Receiver<ConnectionState>,
    command_tx: mpsc::Sender<SyncCommand>,
}

impl InboxHandle {
    /// Current view
    pub fn view(&self) -> InboxView {
        self.view_rx.borrow().clone()
    }

    /// Watch channel publishing every view change
    pub fn watch_view(&self) -> watch::Receiver<InboxView> {
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

    /// Flip application readiness; true triggers the initial fetch,
    /// false resets the inbox to empty
    pub fn set_ready(&self, ready: bool) {
        self.command(SyncCommand::SetReady(ready));
    }

    /// Zero the unread count for a conversation, optimistically local-first
    pub fn mark_read(&self, slug: impl Into<String>) {
        self.command(SyncCommand::MarkRead(slug.into()));
    }

    /// Declare which conversation is open in the UI (None clears it)
    pub fn set_active_room(&self, slug: Option<String>) {
        self.command(SyncCommand::SetActiveRoom(slug));
    }

    /// Re-run the conversation fetch
    pub fn refresh(&self) {
        self.command(SyncCommand::Refresh);
    }

    /// Stop the synchronizer and tear down its connection
    pub fn shutdown(&self) {
        self.command(SyncCommand::Shutdown);
    }

    fn command(&self, command: SyncCommand) {
        if self.command_tx.try_send(command).is_err() {
            debug!("synchronizer gone, command dropped");
        }
    }
}

// ----------------------------------------------------------------------------
// Actor
// ----------------------------------------------------------------------------

type FetchOutcome = (u64, ChatlinkResult<Vec<ConversationSummary>>);

/// The inbox synchronizer actor; constructed and consumed by [`spawn`]
///
/// [`spawn`]: DirectInboxSynchronizer::spawn
pub struct DirectInboxSynchronizer {
    inbox: InboxState,
    error: Option<String>,
    ready: bool,
    directory: Arc<dyn ConversationDirectory>,
    connection: ConnectionHandle,
    view_tx: watch::Sender<InboxView>,
    command_rx: mpsc::Receiver<SyncCommand>,
    fetch_tx: mpsc::Sender<FetchOutcome>,
    fetch_rx: mpsc::Receiver<FetchOutcome>,
    /// Invalidates fetches outlived by a reset or a newer refresh
    generation: u64,
    was_online: bool,
}

impl DirectInboxSynchronizer {
    /// Start a synchronizer task and return its handle
    pub fn spawn(
        config: InboxConfig,
        transport: Arc<dyn Transport>,
        network_rx: watch::Receiver<bool>,
        directory: Arc<dyn ConversationDirectory>,
    ) -> InboxHandle {
        let mut connection = ConnectionManager::spawn(
            config.url,
            transport,
            network_rx,
            config.reconnect,
            config.channels,
        );
        let inbound = connection.take_inbound();
        let state_rx = connection.watch_state();

        let (view_tx, view_rx) = watch::channel(InboxView::default());
        let (command_tx, command_rx) = mpsc::channel(config.channels.command_buffer_size);
        let (fetch_tx, fetch_rx) = mpsc::channel(1);

        let mut actor = DirectInboxSynchronizer {
            inbox: InboxState::new(),
            error: None,
            ready: false,
            directory,
            connection,
            view_tx,
            command_rx,
            fetch_tx,
            fetch_rx,
            generation: 0,
            was_online: false,
        };
        let heartbeat = config.heartbeat;
        tokio::spawn(async move { actor.run(inbound, heartbeat).await });

        InboxHandle {
            view_rx,
            state_rx,
            command_tx,
        }
    }

    async fn run(
        &mut self,
        mut inbound: Option<mpsc::Receiver<String>>,
        heartbeat: HeartbeatConfig,
    ) {
        let mut conn_rx = self.connection.watch_state();
        let mut ticker = tokio::time::interval(heartbeat.interval);

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    None => break,
                },

                changed = conn_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = conn_rx.borrow_and_update().can_send();
                    if online && !self.was_online {
                        // The server's active-room lease does not survive a
                        // reconnect; re-declare it once per Online entry.
                        self.send_command(&InboxCommand::SetActiveRoom {
                            room_slug: self.inbox.active_room.clone(),
                        });
                        ticker.reset();
                    }
                    self.was_online = online;
                },

                Some((generation, outcome)) = self.fetch_rx.recv() => {
                    self.handle_fetched(generation, outcome);
                },

                frame = next_frame(&mut inbound) => match frame {
                    Some(text) => self.handle_frame(&text),
                    None => break,
                },

                _ = ticker.tick() => {
                    if self.was_online {
                        self.send_command(&InboxCommand::Ping);
                    }
                },
            }
        }

        self.connection.shutdown();
        info!("inbox synchronizer stopped");
    }

    /// Returns false when the actor should stop
    fn handle_command(&mut self, command: SyncCommand) -> bool {
        match command {
            SyncCommand::SetReady(true) => {
                if !self.ready {
                    self.ready = true;
                    self.start_fetch();
                }
            }
            SyncCommand::SetReady(false) => {
                self.ready = false;
                self.generation += 1;
                self.inbox.reset();
                self.error = None;
                self.publish();
            }
            SyncCommand::MarkRead(slug) => {
                // Local-first: the counter zeroes immediately, the server
                // ack reconciles later.
                if self.inbox.mark_read_local(&slug) {
                    self.publish();
                }
                self.send_command(&InboxCommand::MarkRead { room_slug: slug });
            }
            SyncCommand::SetActiveRoom(slug) => {
                self.inbox.set_active_room(slug.clone());
                self.publish();
                self.send_command(&InboxCommand::SetActiveRoom { room_slug: slug });
            }
            SyncCommand::Refresh => {
                if self.ready {
                    self.start_fetch();
                }
            }
            SyncCommand::Shutdown => return false,
        }
        true
    }

    /// Kick off the conversation fetch as a detached task
    fn start_fetch(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        let directory = Arc::clone(&self.directory);
        let fetch_tx = self.fetch_tx.clone();
        tokio::spawn(async move {
            let outcome = directory.list_conversations().await;
            let _ = fetch_tx.send((generation, outcome)).await;
        });
    }

    fn handle_fetched(
        &mut self,
        generation: u64,
        outcome: ChatlinkResult<Vec<ConversationSummary>>,
    ) {
        if generation != self.generation {
            debug!(generation, current = self.generation, "stale fetch discarded");
            return;
        }
        match outcome {
            Ok(list) => {
                debug!(count = list.len(), "conversation list seeded");
                self.inbox.seed(list);
                self.error = None;
            }
            Err(error) => {
                warn!(%error, "conversation fetch failed");
                self.error = Some(error.to_string());
            }
        }
        self.publish();
    }

    fn handle_frame(&mut self, text: &str) {
        if !self.ready {
            debug!("frame before ready dropped");
            return;
        }
        let frame: InboxServerFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%error, "malformed inbox frame dropped");
                return;
            }
        };
        match frame {
            InboxServerFrame::UnreadState { unread } => {
                self.inbox.apply_unread(unread.normalize());
                self.publish();
            }
            InboxServerFrame::InboxItem { item, unread } => {
                self.inbox.upsert_item(item, unread.normalize());
                self.publish();
            }
            InboxServerFrame::MarkReadAck { room_slug, unread } => {
                debug!(%room_slug, "mark-read acknowledged");
                self.inbox.apply_mark_read_ack(unread.normalize());
                self.publish();
            }
            InboxServerFrame::Ping => {}
            InboxServerFrame::Error { code } => {
                warn!(%code, "server rejected a command");
                self.error = Some(code);
                self.publish();
            }
            InboxServerFrame::Unknown => debug!("unknown frame type dropped"),
        }
    }

    fn send_command(&self, command: &InboxCommand) {
        match serde_json::to_string(command) {
            Ok(payload) => {
                if !self.connection.send(&payload) {
                    debug!("command skipped, connection not online");
                }
            }
            Err(error) => warn!(%error, "command serialization failed"),
        }
    }

    fn publish(&self) {
        self.view_tx.send_replace(InboxView {
            inbox: self.inbox.clone(),
            error: self.error.clone(),
        });
    }
}
