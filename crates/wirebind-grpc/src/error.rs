//! Error types for RPC calls, channel configuration and service registration.

use std::error::Error as _;
use std::fmt;

use tonic::{Code, Status};
use wirebind::{DecodeError, DescriptorError, MethodKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Peer unreachable or connection refused.
    Unavailable,
    /// Deadline passed before a reply arrived.
    Timeout,
    /// Connection or stream reset mid-call.
    Reset,
    /// Target URI or TLS settings unusable.
    InvalidEndpoint,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::Unavailable => "unavailable",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Reset => "reset",
            TransportErrorKind::InvalidEndpoint => "invalid endpoint",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportError {
    kind: TransportErrorKind,
    context: String,
    reason: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, context: &str, reason: impl fmt::Display) -> Self {
        Self {
            kind,
            context: context.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transport error ({}) in {}: {}",
            self.kind, self.context, self.reason
        )
    }
}

impl std::error::Error for TransportError {}

/// Failure of a single RPC invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcError {
    /// Request message type differs from the method's input type.
    TypeMismatch {
        method: String,
        expected: &'static str,
        found: &'static str,
    },
    UnknownMethod {
        service: &'static str,
        method: String,
    },
    /// Method kind the call path cannot carry (client or bidirectional streaming,
    /// or a unary call on a streaming method).
    Unsupported {
        method: String,
        kind: MethodKind,
    },
    NoChannel,
    /// Reply bytes did not decode as the method's output type.
    Decode {
        method: String,
        error: DecodeError,
    },
    Transport(TransportError),
    /// Non-OK status returned by the server.
    Status {
        code: Code,
        message: String,
    },
    Cancelled,
    Internal {
        context: String,
        reason: String,
    },
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::TypeMismatch {
                method,
                expected,
                found,
            } => write!(
                f,
                "Request for {method} must be '{expected}', got '{found}'"
            ),
            RpcError::UnknownMethod { service, method } => {
                write!(f, "Service '{service}' has no method '{method}'")
            }
            RpcError::Unsupported { method, kind } => {
                write!(f, "Method {method} is {kind:?}, which this call cannot carry")
            }
            RpcError::NoChannel => write!(f, "No channel attached"),
            RpcError::Decode { method, error } => {
                write!(f, "Unable to decode reply of {method}: {error}")
            }
            RpcError::Transport(error) => write!(f, "{error}"),
            RpcError::Status { code, message } => {
                write!(f, "Call failed with status {code:?}: {message}")
            }
            RpcError::Cancelled => write!(f, "Call cancelled"),
            RpcError::Internal { context, reason } => {
                write!(f, "Internal error in {context}: {reason}")
            }
        }
    }
}

impl std::error::Error for RpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RpcError::Decode { error, .. } => Some(error),
            RpcError::Transport(error) => Some(error),
            _ => None,
        }
    }
}

impl RpcError {
    /// gRPC status code equivalent of this error.
    pub fn code(&self) -> Code {
        match self {
            RpcError::TypeMismatch { .. } => Code::InvalidArgument,
            RpcError::UnknownMethod { .. } | RpcError::Unsupported { .. } => Code::Unimplemented,
            RpcError::NoChannel => Code::Unknown,
            RpcError::Decode { .. } | RpcError::Internal { .. } => Code::Internal,
            RpcError::Transport(error) => match error.kind() {
                TransportErrorKind::Timeout => Code::DeadlineExceeded,
                TransportErrorKind::InvalidEndpoint => Code::InvalidArgument,
                TransportErrorKind::Unavailable | TransportErrorKind::Reset => Code::Unavailable,
            },
            RpcError::Status { code, .. } => *code,
            RpcError::Cancelled => Code::Cancelled,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, RpcError::Transport(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::Transport(error) if error.kind() == TransportErrorKind::Timeout)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RpcError::Cancelled)
    }

    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            RpcError::Transport(error) => Some(error.kind()),
            _ => None,
        }
    }

    pub fn transport(kind: TransportErrorKind, context: &str, reason: impl fmt::Display) -> Self {
        RpcError::Transport(TransportError::new(kind, context, reason))
    }

    pub fn from_transport_error(e: tonic::transport::Error, context: &str) -> Self {
        // tonic hides the io error kind; connect failures are reported as unavailable.
        let reason = match e.source() {
            Some(source) => format!("{e}: {source}"),
            None => e.to_string(),
        };
        Self::transport(TransportErrorKind::Unavailable, context, reason)
    }

    /// Maps a status received from the peer (or synthesized by tonic for a broken
    /// connection) onto the error taxonomy.
    pub fn from_status(status: Status, context: &str) -> Self {
        match status.code() {
            Code::Unavailable => {
                Self::transport(TransportErrorKind::Unavailable, context, status.message())
            }
            Code::DeadlineExceeded => {
                Self::transport(TransportErrorKind::Timeout, context, status.message())
            }
            Code::Unknown | Code::Internal | Code::Cancelled if status.source().is_some() => {
                let reason = status
                    .source()
                    .map(|source| source.to_string())
                    .unwrap_or_default();
                Self::transport(TransportErrorKind::Reset, context, reason)
            }
            code => RpcError::Status {
                code,
                message: status.message().to_string(),
            },
        }
    }

    pub fn from_internal_error(e: impl fmt::Display, context: &str) -> Self {
        RpcError::Internal {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }
}

/// Failure while loading or validating channel configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Io { context: String, reason: String },
    Parse { context: String, reason: String },
    Invalid { context: String, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { context, reason } => {
                write!(f, "Configuration I/O error in {context}: {reason}")
            }
            ConfigError::Parse { context, reason } => {
                write!(f, "Configuration parse error in {context}: {reason}")
            }
            ConfigError::Invalid { context, reason } => {
                write!(f, "Invalid configuration in {context}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl ConfigError {
    pub fn from_io_error(e: std::io::Error, context: &str) -> Self {
        ConfigError::Io {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }

    pub fn from_parse_error(e: impl fmt::Display, context: &str) -> Self {
        ConfigError::Parse {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }

    pub fn invalid(context: &str, reason: impl fmt::Display) -> Self {
        ConfigError::Invalid {
            context: context.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Failure while registering a handler with a service router.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationError {
    Duplicate {
        path: String,
    },
    KindMismatch {
        path: String,
        expected: MethodKind,
        found: MethodKind,
    },
    InvalidDescriptor {
        path: String,
        error: DescriptorError,
    },
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::Duplicate { path } => {
                write!(f, "A handler for {path} is already registered")
            }
            RegistrationError::KindMismatch {
                path,
                expected,
                found,
            } => write!(
                f,
                "Handler for {path} expects a {expected:?} method, descriptor is {found:?}"
            ),
            RegistrationError::InvalidDescriptor { path, error } => {
                write!(f, "Descriptor for {path} is invalid: {error}")
            }
        }
    }
}

impl std::error::Error for RegistrationError {}
