//! Per-session stream sink
//!
//! A [`Subscription`] binds one session to one upstream stream call and
//! turns the call's signals into frames on that session's connection:
//!
//! ```text
//! Open --data--> Open
//! Open --error--> Erroring --grace--> Closed   (error frame, POLICY_VIOLATION)
//! Open --complete--> Closed                    (NORMAL)
//! ```
//!
//! Frames are written inside the callback that produced them, so the
//! session sees them in upstream emission order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;

use super::session::{Session, SessionConnection};
use crate::types::{CloseStatus, ErrorFrame, Frame, SaleEvent, SessionId};
use crate::upstream::StreamSink;

/// Default pause between the error frame and the close
pub const DEFAULT_ERROR_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    Open,
    Erroring,
    Closed,
}

pub struct Subscription {
    session_id: SessionId,
    connection: Arc<dyn SessionConnection>,
    state: Mutex<SubscriptionState>,
    error_grace: Duration,
}

impl Subscription {
    pub fn new(session: &Session, error_grace: Duration) -> Self {
        Self {
            session_id: session.id().clone(),
            connection: Arc::clone(session.connection()),
            state: Mutex::new(SubscriptionState::Open),
            error_grace,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state.lock()
    }

    /// The connection went away underneath us; ignore anything the stream still says
    pub fn detach(&self) {
        *self.state.lock() = SubscriptionState::Closed;
    }

    fn transition(&self, from: SubscriptionState, to: SubscriptionState) -> bool {
        let mut state = self.state.lock();
        if *state != from {
            return false;
        }
        *state = to;
        true
    }

    async fn send_frame(&self, frame: &Frame) -> bool {
        let text = match frame.encode() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(session_id = %self.session_id, error = %e, "Failed to encode frame");
                return false;
            }
        };

        match self.connection.send_text(text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "Dropped frame");
                false
            }
        }
    }

    async fn close(&self, status: CloseStatus) {
        if let Err(e) = self.connection.close(status).await {
            tracing::error!(
                session_id = %self.session_id,
                status = %status,
                error = %e,
                "Failed to close session"
            );
        }
    }
}

#[async_trait]
impl StreamSink for Subscription {
    async fn on_next(&self, event: SaleEvent) {
        if self.state() != SubscriptionState::Open {
            tracing::debug!(
                session_id = %self.session_id,
                id = event.id,
                "Ignoring sale after close"
            );
            return;
        }

        tracing::debug!(
            session_id = %self.session_id,
            id = event.id,
            email = %event.email,
            company = %event.company_name,
            "Relaying sale"
        );
        // At-most-once: a failed write is not retried.
        self.send_frame(&Frame::Data(event)).await;
    }

    async fn on_error(&self, status: tonic::Status) {
        if !self.transition(SubscriptionState::Open, SubscriptionState::Erroring) {
            return;
        }

        tracing::error!(
            session_id = %self.session_id,
            code = ?status.code(),
            message = %status.message(),
            "Upstream stream error"
        );

        let frame = ErrorFrame::new(
            format!("gRPC server unavailable: {}", status.message()),
            Utc::now(),
        );
        self.send_frame(&Frame::Error(frame)).await;

        // Let the error frame flush before the close frame follows it.
        tokio::time::sleep(self.error_grace).await;

        if self.transition(SubscriptionState::Erroring, SubscriptionState::Closed) {
            self.close(CloseStatus::PolicyViolation).await;
        }
    }

    async fn on_completed(&self) {
        if !self.transition(SubscriptionState::Open, SubscriptionState::Closed) {
            return;
        }

        tracing::info!(session_id = %self.session_id, "Upstream stream completed");
        self.close(CloseStatus::Normal).await;
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
