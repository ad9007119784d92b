//! Channel (transport) and call (per-request metadata) credentials.
//!
//! The two halves are combined with `|`:
//!
//! ```
//! use wirebind_grpc::credentials::{CallCredentials, ChannelCredentials};
//!
//! let credentials = ChannelCredentials::insecure() | CallCredentials::user_password("alice", "secret");
//! assert!(!credentials.call.is_empty());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::ops::BitOr;
use std::path::Path;

use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap};
use tonic::transport::{Certificate, ClientTlsConfig, Identity, ServerTlsConfig};

use crate::error::{ConfigError, RpcError};

pub const USER_NAME_KEY: &str = "user-name";
pub const USER_PASSWORD_KEY: &str = "user-password";
pub const AUTHORIZATION_KEY: &str = "authorization";

#[derive(Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    /// Overrides the name checked against the server certificate.
    pub domain_name: Option<String>,
    pub ca_certificate_pem: Option<Vec<u8>>,
}

impl fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSettings")
            .field("domain_name", &self.domain_name)
            .field(
                "ca_certificate_pem",
                &self.ca_certificate_pem.as_ref().map(|pem| pem.len()),
            )
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCredentials {
    /// Plain-text HTTP/2. Must be chosen explicitly.
    Insecure,
    Tls(TlsSettings),
}

impl ChannelCredentials {
    pub fn insecure() -> Self {
        ChannelCredentials::Insecure
    }

    pub fn tls_with_ca(ca_certificate_pem: impl Into<Vec<u8>>) -> Self {
        ChannelCredentials::Tls(TlsSettings {
            domain_name: None,
            ca_certificate_pem: Some(ca_certificate_pem.into()),
        })
    }

    pub fn with_domain_name(self, domain_name: impl Into<String>) -> Self {
        match self {
            ChannelCredentials::Tls(settings) => ChannelCredentials::Tls(TlsSettings {
                domain_name: Some(domain_name.into()),
                ..settings
            }),
            ChannelCredentials::Insecure => ChannelCredentials::Insecure,
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, ChannelCredentials::Tls(_))
    }

    pub(crate) fn client_tls_config(&self) -> Option<ClientTlsConfig> {
        let ChannelCredentials::Tls(settings) = self else {
            return None;
        };
        let mut config = ClientTlsConfig::new();
        if let Some(pem) = &settings.ca_certificate_pem {
            config = config.ca_certificate(Certificate::from_pem(pem));
        }
        if let Some(domain_name) = &settings.domain_name {
            config = config.domain_name(domain_name.clone());
        }
        Some(config)
    }
}

/// Metadata attached to every call made through a channel.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CallCredentials {
    metadata: BTreeMap<String, String>,
}

impl CallCredentials {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn user_password(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self::none()
            .with(USER_NAME_KEY, user)
            .with(USER_PASSWORD_KEY, password)
    }

    pub fn bearer(token: impl AsRef<str>) -> Self {
        Self::none().with(AUTHORIZATION_KEY, format!("Bearer {}", token.as_ref()))
    }

    /// Adds or replaces one entry. Keys are lower-cased as HTTP/2 requires.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .insert(key.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.metadata
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn apply(&self, metadata: &mut MetadataMap) -> Result<(), RpcError> {
        for (key, value) in &self.metadata {
            let key = AsciiMetadataKey::from_bytes(key.as_bytes())
                .map_err(|e| RpcError::from_internal_error(e, "call credentials key"))?;
            let value = AsciiMetadataValue::try_from(value.as_str())
                .map_err(|e| RpcError::from_internal_error(e, "call credentials value"))?;
            metadata.insert(key, value);
        }
        Ok(())
    }

    fn merged(mut self, other: CallCredentials) -> Self {
        self.metadata.extend(other.metadata);
        self
    }
}

impl fmt::Debug for CallCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.metadata.keys().map(|key| (key, "<redacted>")))
            .finish()
    }
}

/// Transport security plus per-call metadata, fixed when a channel is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub channel: ChannelCredentials,
    pub call: CallCredentials,
}

impl Credentials {
    pub fn insecure() -> Self {
        ChannelCredentials::Insecure.into()
    }
}

impl From<ChannelCredentials> for Credentials {
    fn from(channel: ChannelCredentials) -> Self {
        Self {
            channel,
            call: CallCredentials::none(),
        }
    }
}

impl BitOr<CallCredentials> for ChannelCredentials {
    type Output = Credentials;

    fn bitor(self, call: CallCredentials) -> Credentials {
        Credentials {
            channel: self,
            call,
        }
    }
}

impl BitOr<ChannelCredentials> for CallCredentials {
    type Output = Credentials;

    fn bitor(self, channel: ChannelCredentials) -> Credentials {
        channel | self
    }
}

impl BitOr<CallCredentials> for Credentials {
    type Output = Credentials;

    fn bitor(self, call: CallCredentials) -> Credentials {
        Credentials {
            channel: self.channel,
            call: self.call.merged(call),
        }
    }
}

impl BitOr for CallCredentials {
    type Output = CallCredentials;

    fn bitor(self, other: CallCredentials) -> CallCredentials {
        self.merged(other)
    }
}

/// Certificate chain and private key a server presents to TLS clients.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    certificate_pem: Vec<u8>,
    private_key_pem: Vec<u8>,
}

impl ServerIdentity {
    pub fn from_pem(certificate_pem: impl Into<Vec<u8>>, private_key_pem: impl Into<Vec<u8>>) -> Self {
        Self {
            certificate_pem: certificate_pem.into(),
            private_key_pem: private_key_pem.into(),
        }
    }

    pub fn from_files(certificate: &Path, private_key: &Path) -> Result<Self, ConfigError> {
        let certificate_pem = std::fs::read(certificate)
            .map_err(|e| ConfigError::from_io_error(e, "server certificate"))?;
        let private_key_pem = std::fs::read(private_key)
            .map_err(|e| ConfigError::from_io_error(e, "server private key"))?;
        Ok(Self::from_pem(certificate_pem, private_key_pem))
    }

    pub fn certificate_pem(&self) -> &[u8] {
        &self.certificate_pem
    }

    pub fn server_tls_config(&self) -> ServerTlsConfig {
        ServerTlsConfig::new().identity(Identity::from_pem(
            &self.certificate_pem,
            &self.private_key_pem,
        ))
    }
}

impl fmt::Debug for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerIdentity")
            .field("certificate_pem", &self.certificate_pem.len())
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}
