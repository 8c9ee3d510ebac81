//! Shared test doubles: a scripted in-memory transport, a scripted
//! conversation directory, and watch-channel wait helpers.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use url::Url;

use chatlink_core::{ChatlinkError, ChatlinkResult, ConversationSummary, PeerRef};
use chatlink_runtime::transport::{Transport, TransportEvent, TransportEvents, TransportSink};

// ----------------------------------------------------------------------------
// Mock Transport
// ----------------------------------------------------------------------------

#[derive(Default)]
struct Inner {
    connects: usize,
    fail_next: usize,
    current: Option<mpsc::Sender<TransportEvent>>,
    sent: Vec<String>,
    last_closed: Option<Arc<AtomicBool>>,
}

/// In-memory transport the tests drive frame by frame
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        })
    }

    /// Make the next `count` connect attempts fail
    pub fn fail_next_connects(&self, count: usize) {
        self.inner.lock().unwrap().fail_next = count;
    }

    pub fn connect_count(&self) -> usize {
        self.inner.lock().unwrap().connects
    }

    pub fn has_live_link(&self) -> bool {
        self.inner.lock().unwrap().current.is_some()
    }

    /// Everything sent across all links, in order
    pub fn sent(&self) -> Vec<String> {
        self.inner.lock().unwrap().sent.clone()
    }

    /// How many sent payloads contain the given fragment
    pub fn sent_matching(&self, fragment: &str) -> usize {
        self.sent().iter().filter(|s| s.contains(fragment)).count()
    }

    /// Deliver one inbound text frame on the live link
    pub fn push_frame(&self, frame: &str) {
        let tx = self
            .inner
            .lock()
            .unwrap()
            .current
            .clone()
            .expect("no live link");
        tx.try_send(TransportEvent::Message(frame.to_string()))
            .expect("link buffer full");
    }

    /// Fail the live link, then close it without a code
    pub fn error_current(&self, reason: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(tx) = inner.current.take() {
            let _ = tx.try_send(TransportEvent::Error(reason.to_string()));
            let _ = tx.try_send(TransportEvent::Closed { code: None });
        }
    }

    /// Close the live link with the given close code
    pub fn close_current(&self, code: Option<u16>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(tx) = inner.current.take() {
            let _ = tx.try_send(TransportEvent::Closed { code });
        }
    }

    /// Whether the most recent link's sink saw a close call
    pub fn last_link_closed(&self) -> bool {
        self.inner
            .lock()
            .unwrap()
            .last_closed
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        _url: &Url,
    ) -> ChatlinkResult<(Box<dyn TransportSink>, TransportEvents)> {
        let mut inner = self.inner.lock().unwrap();
        inner.connects += 1;
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Err(ChatlinkError::transport("scripted connect failure"));
        }
        let (event_tx, event_rx) = mpsc::channel(32);
        let closed = Arc::new(AtomicBool::new(false));
        inner.current = Some(event_tx);
        inner.last_closed = Some(Arc::clone(&closed));
        Ok((
            Box::new(MockSink {
                inner: Arc::clone(&self.inner),
                closed,
            }),
            event_rx,
        ))
    }
}

struct MockSink {
    inner: Arc<Mutex<Inner>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl TransportSink for MockSink {
    async fn send_text(&mut self, text: &str) -> ChatlinkResult<()> {
        self.inner.lock().unwrap().sent.push(text.to_string());
        Ok(())
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ----------------------------------------------------------------------------
// Mock Conversation Directory
// ----------------------------------------------------------------------------

/// Scripted directory: each call pops the next (delay, outcome) response
pub struct MockDirectory {
    responses: Mutex<VecDeque<(Duration, ChatlinkResult<Vec<ConversationSummary>>)>>,
}

impl MockDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
        })
    }

    pub fn respond_with(&self, list: Vec<ConversationSummary>) {
        self.respond_after(Duration::ZERO, Ok(list));
    }

    pub fn respond_after(
        &self,
        delay: Duration,
        outcome: ChatlinkResult<Vec<ConversationSummary>>,
    ) {
        self.responses.lock().unwrap().push_back((delay, outcome));
    }
}

#[async_trait]
impl chatlink_runtime::ConversationDirectory for MockDirectory {
    async fn list_conversations(&self) -> ChatlinkResult<Vec<ConversationSummary>> {
        let scripted = self.responses.lock().unwrap().pop_front();
        match scripted {
            Some((delay, outcome)) => {
                tokio::time::sleep(delay).await;
                outcome
            }
            None => Err(ChatlinkError::fetch("no scripted response")),
        }
    }
}

/// Conversation list entry for tests
pub fn summary(slug: &str, last_message: &str) -> ConversationSummary {
    ConversationSummary {
        slug: slug.to_string(),
        peer: PeerRef {
            username: format!("peer_of_{slug}"),
            profile_image: None,
        },
        last_message: last_message.to_string(),
        last_message_at: "2024-05-01T12:00:00+00:00".to_string(),
    }
}

// ----------------------------------------------------------------------------
// Wait Helpers
// ----------------------------------------------------------------------------

/// Route actor logs through the test harness; safe to call repeatedly
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn test_url() -> Url {
    Url::parse("ws://127.0.0.1:9/ws/test/").expect("static url")
}

/// Wait until a watch channel publishes a value matching the predicate
pub async fn wait_for<T>(rx: &mut watch::Receiver<T>, pred: impl Fn(&T) -> bool) {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            if pred(&*rx.borrow_and_update()) {
                return;
            }
            if rx.changed().await.is_err() {
                panic!("watch publisher dropped before the condition held");
            }
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Let spawned tasks settle without asserting on timing
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}
