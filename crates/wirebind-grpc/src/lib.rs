//! gRPC for dynamic messages: channels, a typed client with cancellable calls, and a
//! server that routes requests to handlers by method path.

pub mod blocking;
pub mod channel;
pub mod client;
pub mod codec;
pub mod config;
pub mod credentials;
pub mod error;
pub mod reply;
pub mod server;
pub mod testservice;

pub use blocking::BlockingClient;
pub use channel::{ByteStream, Channel, Http2Channel, LocalChannel, SharedChannel};
pub use client::{CallId, Client};
pub use config::{ChannelConfig, ChannelConfigFile, ChannelConfigLoader, DEFAULT_TIMEOUT};
pub use credentials::{
    CallCredentials, ChannelCredentials, Credentials, ServerIdentity, TlsSettings,
};
pub use error::{ConfigError, RegistrationError, RpcError, TransportError, TransportErrorKind};
pub use reply::{CallHandle, CancelHandle, Subscription};
pub use server::{GrpcService, MessageStream, ServiceDefinition, ServiceRouter};

pub use tonic::{Code, Request, Status};
