//! Transports that carry serialized requests to a service and bring back replies.
//!
//! A channel is shared by any number of clients. Calls made through one channel are
//! independent: each runs on its own HTTP/2 stream (or task, for [`LocalChannel`]).

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use wirebind::MethodDescriptor;

use crate::error::RpcError;

pub mod http2;
pub mod local;

pub use http2::Http2Channel;
pub use local::LocalChannel;

/// Reply frames of a server-streaming call.
pub type ByteStream = BoxStream<'static, Result<Bytes, RpcError>>;

pub type SharedChannel = Arc<dyn Channel>;

#[async_trait]
pub trait Channel: Send + Sync + fmt::Debug {
    fn target(&self) -> &str;

    /// Sends one request and waits for its single reply, applying the channel's
    /// call credentials and deadline.
    async fn call(&self, method: &'static MethodDescriptor, payload: Bytes)
    -> Result<Bytes, RpcError>;

    /// Opens a server-streaming call. The deadline bounds only the wait for the
    /// response headers.
    async fn server_stream(
        &self,
        method: &'static MethodDescriptor,
        payload: Bytes,
    ) -> Result<ByteStream, RpcError>;
}
