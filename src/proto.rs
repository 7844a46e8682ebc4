//! Upstream wire contract for `ventas.VentasService` (see `proto/ventas.proto`)
//!
//! Messages and the client stub are kept in-tree instead of generated at
//! build time, so building the relay does not need `protoc`.

use tonic::codec::{ProstCodec, Streaming};
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;

use crate::types::SaleEvent;

/// Full gRPC path of the streaming method
pub const STREAM_VENTAS_PATH: &str = "/ventas.VentasService/StreamVentas";

/// Stateless request; the upstream pushes every sale it produces
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct VentasRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VentasResponse {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(string, tag = "2")]
    pub email: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub nombre_empresa: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub fecha_envio: ::prost::alloc::string::String,
}

impl From<VentasResponse> for SaleEvent {
    fn from(msg: VentasResponse) -> Self {
        Self {
            id: msg.id,
            email: msg.email,
            company_name: msg.nombre_empresa,
            sent_date: msg.fecha_envio,
        }
    }
}

/// Client for the sales streaming service
#[derive(Debug, Clone)]
pub struct VentasServiceClient {
    inner: tonic::client::Grpc<Channel>,
}

impl VentasServiceClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    /// Open the server-streaming call
    pub async fn stream_ventas(
        &mut self,
        request: VentasRequest,
    ) -> Result<tonic::Response<Streaming<VentasResponse>>, tonic::Status> {
        self.inner.ready().await.map_err(|e| {
            tonic::Status::unavailable(format!("Service was not ready: {}", e))
        })?;
        let codec = ProstCodec::<VentasRequest, VentasResponse>::default();
        let path = PathAndQuery::from_static(STREAM_VENTAS_PATH);
        self.inner
            .server_streaming(tonic::Request::new(request), path, codec)
            .await
    }
}
