//! Real-time relay of upstream sales to WebSocket sessions
//!
//! Every connected session gets its own upstream stream call; frames are
//! never shared between sessions.

mod orchestrator;
mod registry;
mod server;
mod session;
mod subscription;

pub use orchestrator::{Relay, RelayHealth};
pub use registry::SessionRegistry;
pub use server::{OriginPolicy, RelayServer, WsConnection, WS_PATH};
pub use session::{Session, SessionConnection};
pub use subscription::{Subscription, SubscriptionState, DEFAULT_ERROR_GRACE};
