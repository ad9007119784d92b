use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Endpoint;
use tracing::{debug, instrument};
use wirebind::MethodDescriptor;

use super::{ByteStream, Channel};
use crate::codec::RawCodec;
use crate::config::ChannelConfig;
use crate::credentials::CallCredentials;
use crate::error::{RpcError, TransportErrorKind};

/// gRPC over HTTP/2 using tonic's transport.
///
/// Credentials are fixed when the channel is built. All calls multiplex over the
/// same connection, which is re-established on demand after failures.
#[derive(Debug, Clone)]
pub struct Http2Channel {
    target: String,
    inner: tonic::transport::Channel,
    call_credentials: CallCredentials,
    timeout: Duration,
}

impl Http2Channel {
    /// Builds a lazily connected channel; the connection is made on the first call.
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ChannelConfig) -> Result<Self, RpcError> {
        let endpoint = Self::endpoint(&config)?;
        let inner = endpoint.connect_lazy();
        Ok(Self::from_parts(config, inner))
    }

    /// Builds a channel and connects before returning.
    pub async fn connect(config: ChannelConfig) -> Result<Self, RpcError> {
        let endpoint = Self::endpoint(&config)?;
        let inner = endpoint
            .connect()
            .await
            .map_err(|e| RpcError::from_transport_error(e, "channel connect"))?;
        Ok(Self::from_parts(config, inner))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn from_parts(config: ChannelConfig, inner: tonic::transport::Channel) -> Self {
        Self {
            target: config.target,
            inner,
            call_credentials: config.credentials.call,
            timeout: config.timeout,
        }
    }

    fn endpoint(config: &ChannelConfig) -> Result<Endpoint, RpcError> {
        config.validate().map_err(|e| {
            RpcError::transport(TransportErrorKind::InvalidEndpoint, "channel config", e)
        })?;

        let mut endpoint = Endpoint::from_shared(config.target.clone()).map_err(|e| {
            RpcError::transport(TransportErrorKind::InvalidEndpoint, "channel target", e)
        })?;
        if let Some(connect_timeout) = config.connect_timeout {
            endpoint = endpoint.connect_timeout(connect_timeout);
        }
        if let Some(tls) = config.credentials.channel.client_tls_config() {
            endpoint = endpoint.tls_config(tls).map_err(|e| {
                RpcError::transport(TransportErrorKind::InvalidEndpoint, "TLS configuration", e)
            })?;
        }
        Ok(endpoint)
    }

    fn request(&self, payload: Bytes, deadline: bool) -> Result<tonic::Request<Bytes>, RpcError> {
        let mut request = tonic::Request::new(payload);
        if deadline {
            request.set_timeout(self.timeout);
        }
        self.call_credentials.apply(request.metadata_mut())?;
        Ok(request)
    }

    fn timed_out(&self, context: &str) -> RpcError {
        RpcError::transport(
            TransportErrorKind::Timeout,
            context,
            format!("no reply within {} ms", self.timeout.as_millis()),
        )
    }
}

fn method_path(method: &MethodDescriptor) -> Result<PathAndQuery, RpcError> {
    PathAndQuery::try_from(method.path())
        .map_err(|e| RpcError::transport(TransportErrorKind::InvalidEndpoint, "method path", e))
}

#[async_trait]
impl Channel for Http2Channel {
    fn target(&self) -> &str {
        &self.target
    }

    #[instrument(level = "debug", skip(self, payload), fields(target = %self.target, method = method.name))]
    async fn call(
        &self,
        method: &'static MethodDescriptor,
        payload: Bytes,
    ) -> Result<Bytes, RpcError> {
        let path = method_path(method)?;
        let request = self.request(payload, true)?;
        let mut grpc = tonic::client::Grpc::new(self.inner.clone());

        let exchange = async move {
            grpc.ready()
                .await
                .map_err(|e| RpcError::from_transport_error(e, "unary call"))?;
            let response = grpc
                .unary(request, path, RawCodec)
                .await
                .map_err(|status| RpcError::from_status(status, "unary call"))?;
            Ok(response.into_inner())
        };

        let reply = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| self.timed_out("unary call"))??;
        debug!(bytes = reply.len(), "Received reply");
        Ok(reply)
    }

    #[instrument(level = "debug", skip(self, payload), fields(target = %self.target, method = method.name))]
    async fn server_stream(
        &self,
        method: &'static MethodDescriptor,
        payload: Bytes,
    ) -> Result<ByteStream, RpcError> {
        let path = method_path(method)?;
        let request = self.request(payload, false)?;
        let mut grpc = tonic::client::Grpc::new(self.inner.clone());

        let open = async move {
            grpc.ready()
                .await
                .map_err(|e| RpcError::from_transport_error(e, "server stream"))?;
            grpc.server_streaming(request, path, RawCodec)
                .await
                .map_err(|status| RpcError::from_status(status, "server stream"))
        };

        let response = tokio::time::timeout(self.timeout, open)
            .await
            .map_err(|_| self.timed_out("server stream"))??;
        let stream = response
            .into_inner()
            .map(|item| item.map_err(|status| RpcError::from_status(status, "server stream")));
        Ok(stream.boxed())
    }
}
