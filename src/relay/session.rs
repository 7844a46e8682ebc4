//! Downstream sessions and the connection seam they write through

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{new_session_id, CloseStatus, SessionId};

/// Write side of one client's message-oriented connection
#[async_trait]
pub trait SessionConnection: Send + Sync + 'static {
    /// Deliver one text message
    async fn send_text(&self, text: String) -> Result<()>;

    /// Close the connection with the given status
    async fn close(&self, status: CloseStatus) -> Result<()>;
}

/// One connected client
pub struct Session {
    id: SessionId,
    connection: Arc<dyn SessionConnection>,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(connection: Arc<dyn SessionConnection>) -> Self {
        Self {
            id: new_session_id(),
            connection,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn connection(&self) -> &Arc<dyn SessionConnection> {
        &self.connection
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
