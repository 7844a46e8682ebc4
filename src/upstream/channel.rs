//! Shared upstream channel with an explicit lifecycle

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::AbortHandle;

use super::{StreamSink, UpstreamTransport};
use crate::config::UpstreamTarget;
use crate::error::{RelayError, Result};

/// Lifecycle of the shared channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Uninitialized,
    Ready,
    ShuttingDown,
    Terminated,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChannelState::Uninitialized => "uninitialized",
            ChannelState::Ready => "ready",
            ChannelState::ShuttingDown => "shutting_down",
            ChannelState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Local health snapshot; no round-trip to the upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelHealth {
    pub healthy: bool,
    pub connection: String,
}

/// Handle to one running upstream stream call
#[derive(Debug)]
pub struct StreamHandle {
    task: AbortHandle,
}

impl StreamHandle {
    /// Stop the upstream call. The sink receives no further signals.
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

struct Inner<C> {
    state: ChannelState,
    channel: Option<C>,
}

/// Owns the single channel to the upstream service
pub struct ChannelManager<T: UpstreamTransport> {
    target: UpstreamTarget,
    transport: Arc<T>,
    inner: RwLock<Inner<T::Channel>>,
    /// Serializes (re)connection attempts
    connect_lock: tokio::sync::Mutex<()>,
}

impl<T: UpstreamTransport> ChannelManager<T> {
    pub fn new(target: UpstreamTarget, transport: T) -> Self {
        Self {
            target,
            transport: Arc::new(transport),
            inner: RwLock::new(Inner {
                state: ChannelState::Uninitialized,
                channel: None,
            }),
            connect_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn target(&self) -> &UpstreamTarget {
        &self.target
    }

    pub fn state(&self) -> ChannelState {
        self.inner.read().state
    }

    fn ready_channel(&self) -> Option<T::Channel> {
        let inner = self.inner.read();
        match inner.state {
            ChannelState::Ready => inner.channel.clone(),
            _ => None,
        }
    }

    /// Return the channel if ready, otherwise make exactly one connection attempt
    pub async fn ensure_ready(&self) -> Result<T::Channel> {
        if let Some(channel) = self.ready_channel() {
            return Ok(channel);
        }

        let _guard = self.connect_lock.lock().await;
        // Another session may have reconnected while we waited.
        if let Some(channel) = self.ready_channel() {
            return Ok(channel);
        }

        tracing::warn!(
            upstream = %self.target,
            state = %self.state(),
            "Upstream channel not ready, connecting"
        );

        match self.transport.connect(&self.target).await {
            Ok(channel) => {
                let mut inner = self.inner.write();
                inner.state = ChannelState::Ready;
                inner.channel = Some(channel.clone());
                tracing::info!(
                    upstream = %self.target,
                    tls = self.target.tls,
                    "Upstream channel ready"
                );
                Ok(channel)
            }
            Err(e) => {
                tracing::error!(upstream = %self.target, error = %e, "Upstream connection failed");
                Err(match e {
                    RelayError::ChannelUnavailable { .. } => e,
                    other => RelayError::ChannelUnavailable {
                        target: self.target.to_string(),
                        reason: other.to_string(),
                    },
                })
            }
        }
    }

    /// Start a new stream call bound to `sink`.
    ///
    /// A channel that cannot be made ready is reported here, synchronously.
    /// Everything that fails after the call is issued goes to `sink.on_error`.
    pub async fn start_stream(&self, sink: Arc<dyn StreamSink>) -> Result<StreamHandle> {
        let channel = self.ensure_ready().await?;
        let transport = Arc::clone(&self.transport);

        tracing::debug!(upstream = %self.target, "Starting upstream sales stream");
        let task = tokio::spawn(drive_stream(transport, channel, sink));

        Ok(StreamHandle {
            task: task.abort_handle(),
        })
    }

    /// Release the channel. Idempotent; a later `ensure_ready` reconnects.
    pub fn shutdown(&self) {
        let channel = {
            let mut inner = self.inner.write();
            if inner.state != ChannelState::Ready {
                return;
            }
            inner.state = ChannelState::ShuttingDown;
            inner.channel.take()
        };

        // Streams already running hold their own clones and finish on their own.
        drop(channel);

        let mut inner = self.inner.write();
        if inner.state == ChannelState::ShuttingDown {
            inner.state = ChannelState::Terminated;
        }
        tracing::info!(upstream = %self.target, "Upstream channel shut down");
    }

    pub fn health_status(&self) -> ChannelHealth {
        let state = self.state();
        ChannelHealth {
            healthy: state == ChannelState::Ready,
            connection: format!("gRPC connection to {} (state: {})", self.target, state),
        }
    }
}

/// Pump one stream call into its sink, one signal at a time
async fn drive_stream<T: UpstreamTransport>(
    transport: Arc<T>,
    channel: T::Channel,
    sink: Arc<dyn StreamSink>,
) {
    let mut stream = match transport.stream_sales(channel).await {
        Ok(stream) => stream,
        Err(status) => {
            sink.on_error(status).await;
            return;
        }
    };

    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => sink.on_next(event).await,
            Err(status) => {
                sink.on_error(status).await;
                return;
            }
        }
    }

    sink.on_completed().await;
}
