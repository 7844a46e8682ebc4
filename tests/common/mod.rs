//! Shared fixtures for the integration tests
//!
//! `ScriptedTransport` stands in for the upstream service: every stream
//! call plays the next queued script. `RecordingConnection` stands in for
//! a client's WebSocket and records what the relay writes to it.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::watch;

use ventas_relay::config::UpstreamTarget;
use ventas_relay::relay::{Relay, SessionConnection};
use ventas_relay::upstream::{ChannelManager, SaleStream, UpstreamTransport};
use ventas_relay::{CloseStatus, Frame, RelayError, Result, SaleEvent};

pub const WAIT: Duration = Duration::from_secs(2);

pub fn sale(id: i64) -> SaleEvent {
    SaleEvent {
        id,
        email: format!("cliente{id}@empresa.cl"),
        company_name: format!("Empresa {id}"),
        sent_date: "2024-05-01T12:00:00Z".to_string(),
    }
}

pub enum Ending {
    Complete,
    Error(tonic::Status),
    /// Stay open after the events until cancelled
    Hang,
}

pub struct Script {
    pub events: Vec<SaleEvent>,
    pub ending: Ending,
}

impl Script {
    pub fn complete(events: Vec<SaleEvent>) -> Self {
        Self {
            events,
            ending: Ending::Complete,
        }
    }

    pub fn error(events: Vec<SaleEvent>, status: tonic::Status) -> Self {
        Self {
            events,
            ending: Ending::Error(status),
        }
    }

    pub fn hang(events: Vec<SaleEvent>) -> Self {
        Self {
            events,
            ending: Ending::Hang,
        }
    }
}

#[derive(Default)]
struct ScriptedInner {
    unreachable: AtomicBool,
    connects: AtomicUsize,
    live_streams: Arc<AtomicUsize>,
    scripts: Mutex<VecDeque<Script>>,
}

/// Upstream that plays queued scripts, one per stream call
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<ScriptedInner>,
}

impl ScriptedTransport {
    pub fn push(&self, script: Script) {
        self.inner.scripts.lock().push_back(script);
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.inner.unreachable.store(!reachable, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn live_streams(&self) -> usize {
        self.inner.live_streams.load(Ordering::SeqCst)
    }
}

struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl UpstreamTransport for ScriptedTransport {
    type Channel = ();

    async fn connect(&self, target: &UpstreamTarget) -> Result<()> {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        if self.inner.unreachable.load(Ordering::SeqCst) {
            return Err(RelayError::ChannelUnavailable {
                target: target.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    async fn stream_sales(&self, _channel: ()) -> std::result::Result<SaleStream, tonic::Status> {
        let script = self
            .inner
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| Script::hang(vec![]));

        let items = futures::stream::iter(script.events.into_iter().map(Ok));
        let stream: SaleStream = match script.ending {
            Ending::Complete => items.boxed(),
            Ending::Error(status) => items
                .chain(futures::stream::once(async move { Err(status) }))
                .boxed(),
            Ending::Hang => items.chain(futures::stream::pending()).boxed(),
        };

        // Counts streams until the relay drops them.
        let guard = LiveGuard::new(Arc::clone(&self.inner.live_streams));
        Ok(stream
            .map(move |item| {
                let _live = &guard;
                item
            })
            .boxed())
    }
}

/// Client connection that records frames and the close status
pub struct RecordingConnection {
    sent: Mutex<Vec<String>>,
    closed: watch::Sender<Option<CloseStatus>>,
    frames_seen: watch::Sender<usize>,
}

impl RecordingConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            closed: watch::channel(None).0,
            frames_seen: watch::channel(0).0,
        })
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.sent
            .lock()
            .iter()
            .map(|text| Frame::decode(text).expect("relay sent an undecodable frame"))
            .collect()
    }

    pub fn data_ids(&self) -> Vec<i64> {
        self.frames()
            .into_iter()
            .filter_map(|frame| match frame {
                Frame::Data(event) => Some(event.id),
                Frame::Error(_) => None,
            })
            .collect()
    }

    pub fn close_status(&self) -> Option<CloseStatus> {
        *self.closed.borrow()
    }

    pub async fn wait_closed(&self) -> CloseStatus {
        let mut rx = self.closed.subscribe();
        let status = tokio::time::timeout(WAIT, rx.wait_for(Option::is_some))
            .await
            .expect("session was not closed in time")
            .expect("close channel dropped");
        let status = *status;
        status.expect("close status present")
    }

    pub async fn wait_frames(&self, count: usize) {
        let mut rx = self.frames_seen.subscribe();
        tokio::time::timeout(WAIT, rx.wait_for(|seen| *seen >= count))
            .await
            .expect("frames did not arrive in time")
            .expect("frame channel dropped");
    }
}

#[async_trait]
impl SessionConnection for RecordingConnection {
    async fn send_text(&self, text: String) -> Result<()> {
        if self.closed.borrow().is_some() {
            return Err(RelayError::Delivery("connection closed".to_string()));
        }
        let count = {
            let mut sent = self.sent.lock();
            sent.push(text);
            sent.len()
        };
        self.frames_seen.send_replace(count);
        Ok(())
    }

    async fn close(&self, status: CloseStatus) -> Result<()> {
        self.closed.send_replace(Some(status));
        Ok(())
    }
}

pub fn relay(transport: &ScriptedTransport) -> Relay<ScriptedTransport> {
    let target = UpstreamTarget::new("ventas.internal", 9090, false).unwrap();
    let channels = Arc::new(ChannelManager::new(target, transport.clone()));
    Relay::new(channels).with_error_grace(Duration::from_millis(5))
}
