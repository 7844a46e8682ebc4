//! Upstream side of the relay
//!
//! One shared channel to the sales streaming service, plus the seams the
//! rest of the relay talks through: [`UpstreamTransport`] for how a channel
//! is opened and [`StreamSink`] for who receives a stream's signals.

mod channel;
mod grpc;

pub use channel::{ChannelHealth, ChannelManager, ChannelState, StreamHandle};
pub use grpc::GrpcTransport;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::UpstreamTarget;
use crate::error::Result;
use crate::types::SaleEvent;

/// Items yielded by one upstream stream call
pub type SaleStream = BoxStream<'static, std::result::Result<SaleEvent, tonic::Status>>;

/// How the channel is established and how a stream is opened on it
#[async_trait]
pub trait UpstreamTransport: Send + Sync + 'static {
    /// Connected channel; cloned for every stream call
    type Channel: Clone + Send + Sync + 'static;

    /// One connection attempt. Implementations must not retry.
    async fn connect(&self, target: &UpstreamTarget) -> Result<Self::Channel>;

    /// Issue the stateless streaming request
    async fn stream_sales(
        &self,
        channel: Self::Channel,
    ) -> std::result::Result<SaleStream, tonic::Status>;
}

/// Receiver of one stream call's data, error and completion signals.
///
/// Calls for the same stream never overlap and arrive in emission order.
/// Exactly one of `on_error`/`on_completed` ends a stream.
#[async_trait]
pub trait StreamSink: Send + Sync + 'static {
    async fn on_next(&self, event: SaleEvent);
    async fn on_error(&self, status: tonic::Status);
    async fn on_completed(&self);
}
