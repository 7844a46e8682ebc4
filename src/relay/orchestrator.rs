//! Wires sessions, subscriptions and upstream streams together

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use super::registry::SessionRegistry;
use super::session::{Session, SessionConnection};
use super::subscription::{Subscription, DEFAULT_ERROR_GRACE};
use crate::error::Result;
use crate::types::{CloseStatus, SessionId};
use crate::upstream::{ChannelManager, UpstreamTransport};

/// Health snapshot exposed to collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayHealth {
    pub healthy: bool,
    pub connection: String,
    pub sessions: usize,
}

/// Reacts to connection lifecycle events from the downstream server
pub struct Relay<T: UpstreamTransport> {
    channels: Arc<ChannelManager<T>>,
    registry: Arc<SessionRegistry>,
    error_grace: Duration,
}

impl<T: UpstreamTransport> Relay<T> {
    pub fn new(channels: Arc<ChannelManager<T>>) -> Self {
        Self {
            channels,
            registry: Arc::new(SessionRegistry::new()),
            error_grace: DEFAULT_ERROR_GRACE,
        }
    }

    pub fn with_error_grace(mut self, grace: Duration) -> Self {
        self.error_grace = grace;
        self
    }

    pub fn channels(&self) -> &Arc<ChannelManager<T>> {
        &self.channels
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// A client connected: register it and bind it to a fresh upstream stream.
    ///
    /// If the upstream cannot be reached the connection is closed with
    /// SERVER_ERROR and the error is returned.
    pub async fn on_connect(&self, connection: Arc<dyn SessionConnection>) -> Result<SessionId> {
        let session = Arc::new(Session::new(connection));
        let id = session.id().clone();
        self.registry.register_session(Arc::clone(&session));

        let subscription = Arc::new(Subscription::new(&session, self.error_grace));
        self.registry.register_subscription(&id, Arc::clone(&subscription));

        tracing::info!(session_id = %id, "Session connected");

        match self.channels.start_stream(subscription).await {
            Ok(stream) => {
                self.registry.attach_stream(&id, stream);
                tracing::info!(
                    session_id = %id,
                    upstream = %self.channels.target(),
                    "Upstream stream started"
                );
                Ok(id)
            }
            Err(e) => {
                tracing::error!(session_id = %id, error = %e, "Failed to start upstream stream");
                let closed = session.connection().close(CloseStatus::ServerError).await;
                if let Err(close_err) = closed {
                    tracing::error!(session_id = %id, error = %close_err, "Failed to close session");
                }
                self.registry.unregister(&id);
                Err(e)
            }
        }
    }

    /// The client's connection closed; drop its bookkeeping and cancel its stream
    pub fn on_disconnect(&self, id: &str) {
        match self.registry.unregister(id) {
            Some(session) => {
                let lifetime = Utc::now() - session.created_at();
                tracing::info!(
                    session_id = %id,
                    lifetime_ms = lifetime.num_milliseconds(),
                    "Session disconnected"
                );
            }
            None => tracing::debug!(session_id = %id, "Disconnect for unknown session"),
        }
    }

    /// Inbound client messages are accepted and ignored
    pub fn on_message(&self, id: &str, text: &str) {
        tracing::debug!(session_id = %id, message = %text, "Ignoring client message");
    }

    pub fn health(&self) -> RelayHealth {
        let channel = self.channels.health_status();
        RelayHealth {
            healthy: channel.healthy,
            connection: channel.connection,
            sessions: self.registry.len(),
        }
    }
}

impl<T: UpstreamTransport> Clone for Relay<T> {
    fn clone(&self) -> Self {
        Self {
            channels: self.channels.clone(),
            registry: self.registry.clone(),
            error_grace: self.error_grace,
        }
    }
}
