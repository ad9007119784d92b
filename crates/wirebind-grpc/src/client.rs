//! Typed front end for one service: checks requests against method descriptors,
//! serializes them, sends them through the attached channel and decodes replies.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{Instrument, debug, debug_span, warn};
use wirebind::{DynamicMessage, MethodDescriptor, MethodKind, ServiceDescriptor};

use crate::channel::SharedChannel;
use crate::error::RpcError;
use crate::reply::{CallHandle, Subscription};

const ERROR_BUFFER: usize = 64;

/// Identifies one call in logs and traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(u64);

impl CallId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call-{}", self.0)
    }
}

/// Client for a single service.
///
/// Clones share the attached channel, the call counter and the error feed. Any
/// number of calls may be in flight at once; replies are matched to their calls by
/// the transport, never by arrival order.
#[derive(Clone)]
pub struct Client {
    service: &'static ServiceDescriptor,
    channel: Arc<RwLock<Option<SharedChannel>>>,
    next_call: Arc<AtomicU64>,
    errors: broadcast::Sender<RpcError>,
}

impl Client {
    pub fn new(service: &'static ServiceDescriptor) -> Self {
        let (errors, _) = broadcast::channel(ERROR_BUFFER);
        Self {
            service,
            channel: Arc::new(RwLock::new(None)),
            next_call: Arc::new(AtomicU64::new(1)),
            errors,
        }
    }

    pub fn with_channel(service: &'static ServiceDescriptor, channel: SharedChannel) -> Self {
        let client = Self::new(service);
        client.attach_channel(channel);
        client
    }

    /// Replaces the channel used by calls started from now on.
    pub fn attach_channel(&self, channel: SharedChannel) {
        debug!(service = self.service.full_name, target = channel.target(), "Attached channel");
        *self.channel.write() = Some(channel);
    }

    pub fn channel(&self) -> Option<SharedChannel> {
        self.channel.read().clone()
    }

    pub fn service(&self) -> &'static ServiceDescriptor {
        self.service
    }

    /// Every failed call is also published here, cancellations excepted.
    pub fn errors(&self) -> broadcast::Receiver<RpcError> {
        self.errors.subscribe()
    }

    pub fn method(&self, name: &str) -> Result<&'static MethodDescriptor, RpcError> {
        self.service
            .method(name)
            .ok_or_else(|| RpcError::UnknownMethod {
                service: self.service.full_name,
                method: name.to_string(),
            })
    }

    /// Unary call by method name.
    pub async fn call(&self, name: &str, request: &DynamicMessage) -> Result<DynamicMessage, RpcError> {
        let method = self.method(name).inspect_err(|e| self.report(e))?;
        self.invoke(method, request).await
    }

    /// Unary call that writes the reply into `reply`. On failure `reply` is left
    /// untouched.
    pub async fn call_into(
        &self,
        name: &str,
        request: &DynamicMessage,
        reply: &mut DynamicMessage,
    ) -> Result<(), RpcError> {
        let method = self.method(name).inspect_err(|e| self.report(e))?;
        if reply.descriptor() != method.output {
            let error = RpcError::TypeMismatch {
                method: method.path(),
                expected: method.output.full_name,
                found: reply.descriptor().full_name,
            };
            self.report(&error);
            return Err(error);
        }
        *reply = self.invoke(method, request).await?;
        Ok(())
    }

    /// Starts a unary call in the background and returns a cancellable handle.
    /// Must be called from within a Tokio runtime.
    pub fn call_async(&self, name: &str, request: &DynamicMessage) -> CallHandle {
        let client = self.clone();
        let name = name.to_string();
        let request = request.clone();
        CallHandle::spawn(async move { client.call(&name, &request).await })
    }

    pub async fn invoke(
        &self,
        method: &'static MethodDescriptor,
        request: &DynamicMessage,
    ) -> Result<DynamicMessage, RpcError> {
        let id = self.next_id();
        let span = debug_span!("call", id = %id, method = %method.path());
        let result = async {
            let channel = self.prepare(method, MethodKind::Unary, request)?;
            let reply = channel.call(method, request.serialize()).await?;
            DynamicMessage::decode(method.output, &reply).map_err(|error| RpcError::Decode {
                method: method.path(),
                error,
            })
        }
        .instrument(span)
        .await;

        if let Err(error) = &result {
            self.report(error);
        }
        result
    }

    /// Opens a server-streaming call by method name.
    pub async fn server_stream(
        &self,
        name: &str,
        request: &DynamicMessage,
    ) -> Result<Subscription, RpcError> {
        let method = self.method(name).inspect_err(|e| self.report(e))?;
        self.subscribe(method, request).await
    }

    pub async fn subscribe(
        &self,
        method: &'static MethodDescriptor,
        request: &DynamicMessage,
    ) -> Result<Subscription, RpcError> {
        let id = self.next_id();
        let span = debug_span!("stream", id = %id, method = %method.path());
        let result = async {
            let channel = self.prepare(method, MethodKind::ServerStreaming, request)?;
            let frames = channel.server_stream(method, request.serialize()).await?;
            Ok::<_, RpcError>(Subscription::spawn(method, frames))
        }
        .instrument(span)
        .await;

        if let Err(error) = &result {
            self.report(error);
        }
        result
    }

    fn prepare(
        &self,
        method: &'static MethodDescriptor,
        kind: MethodKind,
        request: &DynamicMessage,
    ) -> Result<SharedChannel, RpcError> {
        if !self.service.owns(method) {
            return Err(RpcError::UnknownMethod {
                service: self.service.full_name,
                method: method.name.to_string(),
            });
        }
        if method.kind != kind {
            return Err(RpcError::Unsupported {
                method: method.path(),
                kind: method.kind,
            });
        }
        if request.descriptor() != method.input {
            return Err(RpcError::TypeMismatch {
                method: method.path(),
                expected: method.input.full_name,
                found: request.descriptor().full_name,
            });
        }
        self.channel().ok_or(RpcError::NoChannel)
    }

    fn next_id(&self) -> CallId {
        CallId(self.next_call.fetch_add(1, Ordering::Relaxed))
    }

    fn report(&self, error: &RpcError) {
        if error.is_cancelled() {
            return;
        }
        warn!(service = self.service.full_name, error = %error, "Call failed");
        // No receivers is fine; nobody is watching the feed.
        let _ = self.errors.send(error.clone());
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("service", &self.service.full_name)
            .field("channel", &self.channel())
            .finish()
    }
}
