//! Core types for the sales relay

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Unique identifier for a downstream session
pub type SessionId = String;

/// Allocate a fresh session identifier
pub fn new_session_id() -> SessionId {
    Uuid::new_v4().to_string()
}

/// A sale pushed by the upstream stream.
///
/// The serde names are the downstream data frame's field names, so the
/// struct serializes directly into a data frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleEvent {
    pub id: i64,
    pub email: String,
    #[serde(rename = "nombre_empresa")]
    pub company_name: String,
    #[serde(rename = "fecha_envio")]
    pub sent_date: String,
}

/// Discriminator carried by non-data frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    Error,
}

/// Terminal error notice sent once before a policy-violation close
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    pub message: String,
    /// Epoch milliseconds
    pub timestamp: i64,
}

impl ErrorFrame {
    pub fn new(message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            kind: FrameKind::Error,
            message: message.into(),
            timestamp: at.timestamp_millis(),
        }
    }
}

/// One JSON text message on a session's connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    // Error must be tried first when decoding: it is the only tagged shape.
    Error(ErrorFrame),
    Data(SaleEvent),
}

impl Frame {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error(_))
    }
}

impl From<SaleEvent> for Frame {
    fn from(event: SaleEvent) -> Self {
        Frame::Data(event)
    }
}

/// Status used when the relay closes a session's connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseStatus {
    /// Upstream completed gracefully
    Normal,
    /// Upstream failed mid-stream
    PolicyViolation,
    /// Setup failed before any stream started
    ServerError,
}

impl CloseStatus {
    /// WebSocket close code (RFC 6455 §7.4.1)
    pub fn code(&self) -> u16 {
        match self {
            CloseStatus::Normal => 1000,
            CloseStatus::PolicyViolation => 1008,
            CloseStatus::ServerError => 1011,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            CloseStatus::Normal => "stream completed",
            CloseStatus::PolicyViolation => "upstream stream error",
            CloseStatus::ServerError => "upstream unavailable",
        }
    }
}

impl std::fmt::Display for CloseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code(), self.reason())
    }
}
