//! Host connectivity reporting
//!
//! The connection manager reacts to connectivity changes through a watch
//! channel. The embedding application feeds it from whatever platform signal
//! it has (browser online/offline events, NetworkManager, a reachability
//! probe). Without such a signal, the default monitor reports always-up and
//! the state machine simply never enters Offline.

use tokio::sync::watch;

/// Publisher side of the host connectivity signal
#[derive(Debug)]
pub struct NetworkMonitor {
    tx: watch::Sender<bool>,
}

impl NetworkMonitor {
    /// New monitor with the given initial connectivity
    pub fn new(up: bool) -> Self {
        let (tx, _rx) = watch::channel(up);
        Self { tx }
    }

    /// Report a connectivity change; redundant reports are fine
    pub fn set_up(&self, up: bool) {
        self.tx.send_replace(up);
    }

    /// Current connectivity
    pub fn is_up(&self) -> bool {
        *self.tx.borrow()
    }

    /// Subscriber handle for a connection manager
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for NetworkMonitor {
    /// Starts up; suits hosts with no connectivity signal
    fn default() -> Self {
        Self::new(true)
    }
}
