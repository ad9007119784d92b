//! Serving dynamic messages: a handler registry keyed by method path and its
//! adapter onto tonic's server.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::BoxFuture;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::codegen::{Body, StdError, empty_body, http};
use tonic::metadata::MetadataMap;
use tonic::server::{NamedService, ServerStreamingService, UnaryService};
use tonic::transport::{Server, ServerTlsConfig};
use tonic::{Request, Status};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument, warn};
use wirebind::{DynamicMessage, MessageDescriptor, MethodDescriptor, MethodKind, ServiceDescriptor};

use crate::codec::RawCodec;
use crate::error::RegistrationError;

/// Replies of a server-streaming handler.
pub type MessageStream = BoxStream<'static, Result<DynamicMessage, Status>>;

type UnaryHandler =
    Arc<dyn Fn(Request<DynamicMessage>) -> BoxFuture<'static, Result<DynamicMessage, Status>> + Send + Sync>;
type StreamHandler =
    Arc<dyn Fn(Request<DynamicMessage>) -> BoxFuture<'static, Result<MessageStream, Status>> + Send + Sync>;

enum Handler {
    Unary(UnaryHandler),
    ServerStreaming(StreamHandler),
}

struct Route {
    method: &'static MethodDescriptor,
    handler: Handler,
}

/// Handlers keyed by `/package.Service/Method`.
///
/// Handlers are shared immutable closures; each call is an independent invocation,
/// so a slow handler never holds up other calls.
#[derive(Default)]
pub struct ServiceRouter {
    routes: DashMap<String, Arc<Route>>,
}

impl ServiceRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_unary<F, Fut>(
        &self,
        method: &'static MethodDescriptor,
        handler: F,
    ) -> Result<(), RegistrationError>
    where
        F: Fn(Request<DynamicMessage>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<DynamicMessage, Status>> + Send + 'static,
    {
        let handler: UnaryHandler = Arc::new(move |request| Box::pin(handler(request)));
        self.register(method, MethodKind::Unary, Handler::Unary(handler))
    }

    pub fn add_server_stream<F, Fut, S>(
        &self,
        method: &'static MethodDescriptor,
        handler: F,
    ) -> Result<(), RegistrationError>
    where
        F: Fn(Request<DynamicMessage>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S, Status>> + Send + 'static,
        S: Stream<Item = Result<DynamicMessage, Status>> + Send + 'static,
    {
        let handler: StreamHandler = Arc::new(move |request| {
            let opened = handler(request);
            Box::pin(async move { opened.await.map(|stream| stream.boxed()) })
        });
        self.register(
            method,
            MethodKind::ServerStreaming,
            Handler::ServerStreaming(handler),
        )
    }

    fn register(
        &self,
        method: &'static MethodDescriptor,
        expected: MethodKind,
        handler: Handler,
    ) -> Result<(), RegistrationError> {
        let path = method.path();
        if method.kind != expected {
            return Err(RegistrationError::KindMismatch {
                path,
                expected,
                found: method.kind,
            });
        }
        for descriptor in [method.input, method.output] {
            descriptor
                .validate()
                .map_err(|error| RegistrationError::InvalidDescriptor {
                    path: path.clone(),
                    error,
                })?;
        }

        match self.routes.entry(path) {
            Entry::Occupied(entry) => Err(RegistrationError::Duplicate {
                path: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                debug!(path = %entry.key(), kind = ?expected, "Registered handler");
                entry.insert(Arc::new(Route { method, handler }));
                Ok(())
            }
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.routes.contains_key(path)
    }

    pub fn method(&self, path: &str) -> Option<&'static MethodDescriptor> {
        self.routes.get(path).map(|route| route.method)
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.routes.iter().map(|entry| entry.key().clone()).collect();
        paths.sort();
        paths
    }

    /// True when every method of `service` has a handler.
    pub fn serves(&self, service: &ServiceDescriptor) -> bool {
        service
            .methods
            .iter()
            .all(|method| self.contains(&method.path()))
    }

    fn route(&self, path: &str) -> Result<Arc<Route>, Status> {
        self.routes
            .get(path)
            .map(|route| Arc::clone(route.value()))
            .ok_or_else(|| Status::unimplemented(format!("Method {path} is not implemented")))
    }

    #[instrument(level = "debug", skip(self, metadata, payload), fields(bytes = payload.len()))]
    pub async fn dispatch_unary(
        &self,
        path: &str,
        metadata: MetadataMap,
        payload: Bytes,
    ) -> Result<Bytes, Status> {
        let route = self.route(path)?;
        let Handler::Unary(handler) = &route.handler else {
            return Err(Status::unimplemented(format!(
                "Method {path} is not a unary method"
            )));
        };

        let request = decode_request(route.method, metadata, &payload)?;
        let reply = handler(request).await?;
        encode_reply(route.method, &reply)
    }

    #[instrument(level = "debug", skip(self, metadata, payload), fields(bytes = payload.len()))]
    pub async fn dispatch_server_stream(
        &self,
        path: &str,
        metadata: MetadataMap,
        payload: Bytes,
    ) -> Result<BoxStream<'static, Result<Bytes, Status>>, Status> {
        let route = self.route(path)?;
        let Handler::ServerStreaming(handler) = &route.handler else {
            return Err(Status::unimplemented(format!(
                "Method {path} is not a server-streaming method"
            )));
        };

        let request = decode_request(route.method, metadata, &payload)?;
        let replies = handler(request).await?;
        let method = route.method;
        Ok(replies
            .map(move |item| item.and_then(|reply| encode_reply(method, &reply)))
            .boxed())
    }

    fn kind_of(&self, path: &str) -> Option<MethodKind> {
        self.routes.get(path).map(|route| route.method.kind)
    }
}

fn decode_request(
    method: &'static MethodDescriptor,
    metadata: MetadataMap,
    payload: &[u8],
) -> Result<Request<DynamicMessage>, Status> {
    let message = DynamicMessage::decode(method.input, payload).map_err(|e| {
        warn!(path = %method.path(), error = %e, "Rejected undecodable request");
        Status::invalid_argument(format!("Unable to decode request: {e}"))
    })?;
    let mut request = Request::new(message);
    *request.metadata_mut() = metadata;
    Ok(request)
}

fn encode_reply(method: &MethodDescriptor, reply: &DynamicMessage) -> Result<Bytes, Status> {
    if !same_type(reply.descriptor(), method.output) {
        return Err(Status::internal(format!(
            "Handler for {} replied with '{}', expected '{}'",
            method.path(),
            reply.descriptor().full_name,
            method.output.full_name
        )));
    }
    Ok(reply.serialize())
}

fn same_type(a: &MessageDescriptor, b: &MessageDescriptor) -> bool {
    a.full_name == b.full_name
}

impl fmt::Debug for ServiceRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRouter")
            .field("paths", &self.paths())
            .finish()
    }
}

/// A statically named service whose methods a [`ServiceRouter`] serves.
pub trait ServiceDefinition: Send + Sync + 'static {
    /// Fully qualified name, e.g. `wirebind.tests.TestService`.
    const NAME: &'static str;

    fn descriptor() -> &'static ServiceDescriptor;
}

/// Tonic service that routes requests for `D` into a [`ServiceRouter`].
pub struct GrpcService<D> {
    router: Arc<ServiceRouter>,
    _definition: PhantomData<fn() -> D>,
}

impl<D> GrpcService<D> {
    pub fn new(router: Arc<ServiceRouter>) -> Self {
        Self {
            router,
            _definition: PhantomData,
        }
    }
}

impl<D> Clone for GrpcService<D> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.router))
    }
}

impl<D> fmt::Debug for GrpcService<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrpcService")
            .field("router", &self.router)
            .finish()
    }
}

impl<D: ServiceDefinition> NamedService for GrpcService<D> {
    const NAME: &'static str = D::NAME;
}

struct UnaryDispatch {
    router: Arc<ServiceRouter>,
    path: String,
}

impl UnaryService<Bytes> for UnaryDispatch {
    type Response = Bytes;
    type Future = BoxFuture<'static, Result<tonic::Response<Bytes>, Status>>;

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let router = Arc::clone(&self.router);
        let path = self.path.clone();
        Box::pin(async move {
            let (metadata, _, payload) = request.into_parts();
            router
                .dispatch_unary(&path, metadata, payload)
                .await
                .map(tonic::Response::new)
        })
    }
}

struct StreamDispatch {
    router: Arc<ServiceRouter>,
    path: String,
}

impl ServerStreamingService<Bytes> for StreamDispatch {
    type Response = Bytes;
    type ResponseStream = BoxStream<'static, Result<Bytes, Status>>;
    type Future = BoxFuture<'static, Result<tonic::Response<Self::ResponseStream>, Status>>;

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let router = Arc::clone(&self.router);
        let path = self.path.clone();
        Box::pin(async move {
            let (metadata, _, payload) = request.into_parts();
            router
                .dispatch_server_stream(&path, metadata, payload)
                .await
                .map(tonic::Response::new)
        })
    }
}

impl<D, B> tonic::codegen::Service<http::Request<B>> for GrpcService<D>
where
    D: ServiceDefinition,
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<tonic::body::BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let path = req.uri().path().to_string();
        let router = Arc::clone(&self.router);

        match router.kind_of(&path) {
            Some(MethodKind::Unary) => Box::pin(async move {
                let mut grpc = tonic::server::Grpc::new(RawCodec);
                Ok(grpc.unary(UnaryDispatch { router, path }, req).await)
            }),
            Some(MethodKind::ServerStreaming) => Box::pin(async move {
                let mut grpc = tonic::server::Grpc::new(RawCodec);
                Ok(grpc
                    .server_streaming(StreamDispatch { router, path }, req)
                    .await)
            }),
            _ => Box::pin(async move {
                debug!(%path, "No handler registered");
                let mut response = http::Response::new(empty_body());
                let headers = response.headers_mut();
                headers.insert(
                    tonic::Status::GRPC_STATUS,
                    (tonic::Code::Unimplemented as i32).into(),
                );
                headers.insert(
                    http::header::CONTENT_TYPE,
                    tonic::metadata::GRPC_CONTENT_TYPE,
                );
                Ok(response)
            }),
        }
    }
}

/// Serves `D` on `addr` until the process stops. With `tls` set, only TLS
/// clients are accepted.
pub async fn serve<D: ServiceDefinition>(
    addr: SocketAddr,
    router: Arc<ServiceRouter>,
    tls: Option<ServerTlsConfig>,
) -> Result<(), tonic::transport::Error> {
    info!(%addr, service = D::NAME, tls = tls.is_some(), "Starting gRPC server");
    builder(tls)?
        .layer(TraceLayer::new_for_http())
        .add_service(GrpcService::<D>::new(router))
        .serve(addr)
        .await
}

/// Serves `D` on an already bound listener until `shutdown` resolves.
pub async fn serve_with_listener<D, F>(
    listener: TcpListener,
    router: Arc<ServiceRouter>,
    tls: Option<ServerTlsConfig>,
    shutdown: F,
) -> Result<(), tonic::transport::Error>
where
    D: ServiceDefinition,
    F: Future<Output = ()> + Send,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, service = D::NAME, tls = tls.is_some(), "Starting gRPC server");
    }
    builder(tls)?
        .layer(TraceLayer::new_for_http())
        .add_service(GrpcService::<D>::new(router))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await
}

fn builder(tls: Option<ServerTlsConfig>) -> Result<Server, tonic::transport::Error> {
    match tls {
        Some(tls) => Server::builder().tls_config(tls),
        None => Ok(Server::builder()),
    }
}
