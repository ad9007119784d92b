//! Synchronous front end over [`Client`], for callers without an async runtime.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::runtime::{Builder, Runtime};
use wirebind::{DynamicMessage, MethodDescriptor, ServiceDescriptor};

use crate::channel::Http2Channel;
use crate::client::Client;
use crate::config::ChannelConfig;
use crate::error::RpcError;

/// Owns a multi-threaded Tokio runtime and blocks the calling thread on each call.
///
/// Must not be used from inside another Tokio runtime.
#[derive(Debug)]
pub struct BlockingClient {
    runtime: Runtime,
    client: Client,
}

impl BlockingClient {
    pub fn new(service: &'static ServiceDescriptor, config: ChannelConfig) -> Result<Self, RpcError> {
        let runtime = Builder::new_multi_thread()
            .enable_all()
            .thread_name("wirebind-blocking")
            .build()
            .map_err(|e| RpcError::from_internal_error(e, "blocking client runtime"))?;

        let channel = {
            let _guard = runtime.enter();
            Http2Channel::new(config)?
        };
        Ok(Self::from_parts(runtime, Client::with_channel(service, Arc::new(channel))))
    }

    pub fn from_parts(runtime: Runtime, client: Client) -> Self {
        Self { runtime, client }
    }

    /// The async client; usable from tasks spawned on [`Self::runtime`].
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn call(&self, name: &str, request: &DynamicMessage) -> Result<DynamicMessage, RpcError> {
        self.runtime.block_on(self.client.call(name, request))
    }

    pub fn invoke(
        &self,
        method: &'static MethodDescriptor,
        request: &DynamicMessage,
    ) -> Result<DynamicMessage, RpcError> {
        self.runtime.block_on(self.client.invoke(method, request))
    }

    pub fn call_into(
        &self,
        name: &str,
        request: &DynamicMessage,
        reply: &mut DynamicMessage,
    ) -> Result<(), RpcError> {
        self.runtime
            .block_on(self.client.call_into(name, request, reply))
    }

    /// Runs a server-streaming call to completion and returns every reply. Stops
    /// at the first failure.
    pub fn server_stream(
        &self,
        name: &str,
        request: &DynamicMessage,
    ) -> Result<Vec<DynamicMessage>, RpcError> {
        self.runtime.block_on(async {
            let mut subscription = self.client.server_stream(name, request).await?;
            let mut replies = Vec::new();
            while let Some(reply) = subscription.next().await {
                replies.push(reply?);
            }
            Ok(replies)
        })
    }
}
