//! tonic-backed transport for the sales streaming service

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

use super::{SaleStream, UpstreamTransport};
use crate::config::UpstreamTarget;
use crate::error::{RelayError, Result};
use crate::proto::{VentasRequest, VentasServiceClient};
use crate::types::SaleEvent;

/// Production transport: eager tonic channel, plaintext or TLS
#[derive(Debug, Clone)]
pub struct GrpcTransport {
    connect_timeout: Duration,
}

impl GrpcTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Build the endpoint without connecting; fails only on bad addresses
    pub fn endpoint(&self, target: &UpstreamTarget) -> Result<Endpoint> {
        let endpoint = Endpoint::from_shared(target.uri())
            .map_err(|e| {
                RelayError::Config(format!("invalid upstream address {}: {}", target.uri(), e))
            })?
            .connect_timeout(self.connect_timeout);

        if !target.tls {
            return Ok(endpoint);
        }

        let tls = ClientTlsConfig::new()
            .with_webpki_roots()
            .domain_name(target.host.clone());
        endpoint
            .tls_config(tls)
            .map_err(|e| RelayError::Config(format!("invalid TLS settings for {}: {}", target, e)))
    }
}

impl Default for GrpcTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl UpstreamTransport for GrpcTransport {
    type Channel = Channel;

    async fn connect(&self, target: &UpstreamTarget) -> Result<Channel> {
        let endpoint = self.endpoint(target)?;
        endpoint
            .connect()
            .await
            .map_err(|e| RelayError::ChannelUnavailable {
                target: target.to_string(),
                reason: error_chain(&e),
            })
    }

    async fn stream_sales(
        &self,
        channel: Channel,
    ) -> std::result::Result<SaleStream, tonic::Status> {
        let response = VentasServiceClient::new(channel)
            .stream_ventas(VentasRequest {})
            .await?;
        Ok(response
            .into_inner()
            .map(|item| item.map(SaleEvent::from))
            .boxed())
    }
}

// tonic's transport error only says "transport error"; the cause is in the chain.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
