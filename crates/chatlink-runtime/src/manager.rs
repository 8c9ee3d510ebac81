//! Connection manager actor
//!
//! One tokio task owning one logical connection. The pure state machine in
//! `chatlink_core::connection` decides every transition; this actor feeds it
//! transport events, timer ticks and handle commands, executes the returned
//! effects, and publishes the resulting state on a watch channel.
//!
//! Transport opens run as detached tasks tagged with a generation counter so
//! a connect that resolves after the URL changed (or the link was torn down)
//! is discarded instead of resurrecting a dead cycle.

use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::Sleep;
use tracing::{debug, info, warn};
use url::Url;

use chatlink_core::{
    ChannelConfig, ChatlinkResult, ConnectionEffect, ConnectionEvent, ConnectionState,
    ReconnectConfig,
};

use crate::transport::{Transport, TransportEvent, TransportEvents, TransportSink};

// ----------------------------------------------------------------------------
// Handle
// ----------------------------------------------------------------------------

/// Commands a handle can send to its manager actor
#[derive(Debug)]
enum ManagerCommand {
    SetUrl(Option<Url>),
    Send(String),
    Shutdown,
}

/// Caller-facing handle to a running connection manager
///
/// Cloning is deliberately not offered for the inbound stream: wire frames
/// are consumed by exactly one owner via [`ConnectionHandle::take_inbound`].
#[derive(Debug)]
pub struct ConnectionHandle {
    state_rx: watch::Receiver<ConnectionState>,
    command_tx: mpsc::Sender<ManagerCommand>,
    inbound_rx: Option<mpsc::Receiver<String>>,
}

impl ConnectionHandle {
    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch channel publishing every state change
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Take the inbound frame stream; yields `None` after the first call
    pub fn take_inbound(&mut self) -> Option<mpsc::Receiver<String>> {
        self.inbound_rx.take()
    }

    /// Hand a text payload to the live transport
    ///
    /// Returns false without buffering when the connection is not Online;
    /// callers that need delivery guarantees must queue on their side. A
    /// true return means the payload was accepted, not that it reached the
    /// peer: the link can still drop it mid-flight.
    pub fn send(&self, payload: &str) -> bool {
        if !self.state_rx.borrow().can_send() {
            return false;
        }
        self.command_tx
            .try_send(ManagerCommand::Send(payload.to_string()))
            .is_ok()
    }

    /// Configure a new target URL (None disconnects and idles)
    pub fn set_url(&self, url: Option<Url>) {
        if self.command_tx.try_send(ManagerCommand::SetUrl(url)).is_err() {
            debug!("manager gone, set_url dropped");
        }
    }

    /// Tear the connection down and stop the actor
    pub fn shutdown(&self) {
        if self.command_tx.try_send(ManagerCommand::Shutdown).is_err() {
            debug!("manager gone, shutdown dropped");
        }
    }
}

// ----------------------------------------------------------------------------
// Actor
// ----------------------------------------------------------------------------

type LinkParts = (Box<dyn TransportSink>, TransportEvents);
type ConnectOutcome = (u64, ChatlinkResult<LinkParts>);

/// The connection manager actor; constructed and consumed by [`spawn`]
///
/// [`spawn`]: ConnectionManager::spawn
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    config: ReconnectConfig,
    url: Option<Url>,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    command_rx: mpsc::Receiver<ManagerCommand>,
    inbound_tx: mpsc::Sender<String>,
    network_rx: watch::Receiver<bool>,
    network_alive: bool,
    connect_tx: mpsc::Sender<ConnectOutcome>,
    connect_rx: mpsc::Receiver<ConnectOutcome>,
    /// Invalidates in-flight connects and stale link events
    generation: u64,
    sink: Option<Box<dyn TransportSink>>,
    events: Option<TransportEvents>,
    retry: Option<Pin<Box<Sleep>>>,
}

impl ConnectionManager {
    /// Start a manager task and return its handle
    pub fn spawn(
        url: Option<Url>,
        transport: Arc<dyn Transport>,
        network_rx: watch::Receiver<bool>,
        config: ReconnectConfig,
        channels: ChannelConfig,
    ) -> ConnectionHandle {
        let (state_tx, state_rx) = watch::channel(ConnectionState::new_idle());
        let (command_tx, command_rx) = mpsc::channel(channels.command_buffer_size);
        let (inbound_tx, inbound_rx) = mpsc::channel(channels.inbound_buffer_size);
        let (connect_tx, connect_rx) = mpsc::channel(1);

        let mut actor = ConnectionManager {
            transport,
            config,
            url: None,
            state: ConnectionState::new_idle(),
            state_tx,
            command_rx,
            inbound_tx,
            network_rx,
            network_alive: true,
            connect_tx,
            connect_rx,
            generation: 0,
            sink: None,
            events: None,
            retry: None,
        };
        tokio::spawn(async move { actor.run(url).await });

        ConnectionHandle {
            state_rx,
            command_tx,
            inbound_rx: Some(inbound_rx),
        }
    }

    async fn run(&mut self, initial_url: Option<Url>) {
        if initial_url.is_some() {
            self.handle_set_url(initial_url).await;
        }

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(ManagerCommand::SetUrl(url)) => self.handle_set_url(url).await,
                    Some(ManagerCommand::Send(payload)) => self.handle_send(&payload).await,
                    // All handles dropped counts as shutdown.
                    Some(ManagerCommand::Shutdown) | None => break,
                },

                changed = self.network_rx.changed(), if self.network_alive => {
                    match changed {
                        Ok(()) => {
                            let up = *self.network_rx.borrow_and_update();
                            let event = if up {
                                ConnectionEvent::NetworkUp
                            } else {
                                ConnectionEvent::NetworkDown
                            };
                            self.apply(event).await;
                        }
                        // Monitor dropped: connectivity stays at its last
                        // reported value.
                        Err(_) => self.network_alive = false,
                    }
                },

                Some((generation, outcome)) = self.connect_rx.recv() => {
                    self.handle_connected(generation, outcome).await;
                },

                event = next_link_event(&mut self.events) => {
                    self.handle_link_event(event).await;
                },

                () = retry_elapsed(&mut self.retry) => {
                    self.retry = None;
                    self.apply(ConnectionEvent::RetryElapsed).await;
                },
            }
        }

        self.apply(ConnectionEvent::Teardown).await;
        info!("connection manager stopped");
    }

    /// Feed one event through the state machine and execute its effects
    async fn apply(&mut self, event: ConnectionEvent) {
        let transition = self.state.transition(event, &self.config);
        if transition.new_state != self.state {
            debug!(from = %self.state.status, to = %transition.new_state.status, "state change");
        }
        self.state = transition.new_state;
        self.state_tx.send_replace(self.state);
        for effect in transition.effects {
            self.run_effect(effect).await;
        }
    }

    async fn run_effect(&mut self, effect: ConnectionEffect) {
        match effect {
            ConnectionEffect::OpenTransport => self.open_transport(),
            ConnectionEffect::CloseTransport => self.close_transport().await,
            ConnectionEffect::ScheduleRetry { attempt } => {
                let delay = self
                    .config
                    .jittered_delay(attempt, &mut rand::thread_rng());
                debug!(attempt, ?delay, "reconnect scheduled");
                self.retry = Some(Box::pin(tokio::time::sleep(delay)));
            }
            ConnectionEffect::CancelRetry => self.retry = None,
        }
    }

    /// Kick off a transport open as a detached task
    fn open_transport(&mut self) {
        let Some(url) = self.url.clone() else {
            // Unreachable through the state machine: OpenTransport only
            // fires with a configured URL.
            warn!("open requested without a URL");
            return;
        };
        self.generation += 1;
        let generation = self.generation;
        let transport = Arc::clone(&self.transport);
        let connect_tx = self.connect_tx.clone();
        tokio::spawn(async move {
            let outcome = transport.connect(&url).await;
            let _ = connect_tx.send((generation, outcome)).await;
        });
    }

    /// Drop the live link and invalidate anything still in flight for it
    async fn close_transport(&mut self) {
        self.generation += 1;
        self.events = None;
        if let Some(mut sink) = self.sink.take() {
            sink.close().await;
        }
    }

    async fn handle_set_url(&mut self, url: Option<Url>) {
        self.url = url.clone();
        match url {
            Some(url) => {
                info!(%url, "url configured");
                let network_up = *self.network_rx.borrow();
                self.apply(ConnectionEvent::UrlConfigured { network_up }).await;
            }
            None => {
                info!("url cleared");
                self.apply(ConnectionEvent::UrlCleared).await;
            }
        }
    }

    async fn handle_send(&mut self, payload: &str) {
        // Raced a disconnect: the handle's Online check passed but the link
        // is gone. The payload is dropped, as documented on `send`.
        if !self.state.can_send() {
            debug!("send raced a disconnect, payload dropped");
            return;
        }
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        if let Err(error) = sink.send_text(payload).await {
            warn!(%error, "send failed");
            self.apply(ConnectionEvent::TransportError).await;
        }
    }

    async fn handle_connected(&mut self, generation: u64, outcome: ChatlinkResult<LinkParts>) {
        if generation != self.generation {
            debug!(generation, current = self.generation, "stale connect discarded");
            return;
        }
        match outcome {
            Ok((sink, events)) => {
                self.sink = Some(sink);
                self.events = Some(events);
                self.apply(ConnectionEvent::TransportOpened).await;
            }
            Err(error) => {
                warn!(%error, "transport open failed");
                self.apply(ConnectionEvent::TransportError).await;
                self.apply(ConnectionEvent::TransportClosed { code: None }).await;
            }
        }
    }

    async fn handle_link_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Message(text)) => {
                // Preserves wire order; a full buffer backpressures the
                // link rather than dropping frames.
                if self.inbound_tx.send(text).await.is_err() {
                    debug!("inbound consumer gone, frame dropped");
                }
            }
            Some(TransportEvent::Error(reason)) => {
                warn!(%reason, "transport error");
                self.apply(ConnectionEvent::TransportError).await;
            }
            Some(TransportEvent::Closed { code }) => {
                debug!(?code, "transport closed");
                self.drop_link();
                self.apply(ConnectionEvent::TransportClosed { code }).await;
            }
            // The reader ended without a close frame.
            None => {
                self.drop_link();
                self.apply(ConnectionEvent::TransportClosed { code: None }).await;
            }
        }
    }

    fn drop_link(&mut self) {
        self.generation += 1;
        self.events = None;
        self.sink = None;
    }
}

/// Next inbound frame from a taken stream; pends forever when absent
///
/// A fresh handle always yields its inbound stream, so consumer actors use
/// this to keep their select loops total without unwrapping.
pub(crate) async fn next_frame(inbound: &mut Option<mpsc::Receiver<String>>) -> Option<String> {
    match inbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Next event from the live link; pends forever while no link exists
async fn next_link_event(events: &mut Option<TransportEvents>) -> Option<TransportEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Completion of the armed backoff timer; pends forever while none is armed
async fn retry_elapsed(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
