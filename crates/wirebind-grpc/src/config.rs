//! Channel configuration, built in code or loaded from JSON/YAML files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tonic::codegen::http::Uri;

use crate::credentials::{CallCredentials, ChannelCredentials, Credentials, TlsSettings};
use crate::error::ConfigError;

/// Per-call deadline used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(6000);

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// `http://host:port` or `https://host:port`.
    pub target: String,
    pub credentials: Credentials,
    pub timeout: Duration,
    pub connect_timeout: Option<Duration>,
}

impl ChannelConfig {
    pub fn new(target: impl Into<String>, credentials: impl Into<Credentials>) -> Self {
        Self {
            target: target.into(),
            credentials: credentials.into(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Checks the target URI and that its scheme agrees with the transport security.
    pub fn validate(&self) -> Result<Uri, ConfigError> {
        let uri: Uri = self
            .target
            .parse()
            .map_err(|e| ConfigError::invalid("channel target", e))?;

        if uri.host().is_none() {
            return Err(ConfigError::invalid(
                "channel target",
                format!("'{}' has no host", self.target),
            ));
        }
        match (uri.scheme_str(), self.credentials.channel.is_tls()) {
            (Some("http"), false) | (Some("https"), true) => Ok(uri),
            (Some("https"), false) => Err(ConfigError::invalid(
                "channel credentials",
                "https target requires TLS channel credentials",
            )),
            (Some("http"), true) => Err(ConfigError::invalid(
                "channel credentials",
                "TLS channel credentials require an https target",
            )),
            (scheme, _) => Err(ConfigError::invalid(
                "channel target",
                format!("unsupported scheme {scheme:?} in '{}'", self.target),
            )),
        }
    }
}

/// On-disk form of [`ChannelConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfigFile {
    pub target: String,
    pub security: SecurityConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
}

/// Transport security; the mode has no default and must be spelled out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SecurityConfig {
    Insecure,
    Tls {
        /// PEM file, relative paths resolve against the config file's directory.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ca_certificate: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        domain_name: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    UserPassword { user: String, password: String },
    Bearer { token: String },
    Metadata { entries: BTreeMap<String, String> },
}

impl ChannelConfigFile {
    pub fn into_config(self, base_dir: &Path) -> Result<ChannelConfig, ConfigError> {
        let channel = match self.security {
            SecurityConfig::Insecure => ChannelCredentials::Insecure,
            SecurityConfig::Tls {
                ca_certificate,
                domain_name,
            } => {
                let ca_certificate_pem = match ca_certificate {
                    Some(path) => {
                        let path = base_dir.join(path);
                        Some(
                            std::fs::read(&path)
                                .map_err(|e| ConfigError::from_io_error(e, "CA certificate"))?,
                        )
                    }
                    None => None,
                };
                ChannelCredentials::Tls(TlsSettings {
                    domain_name,
                    ca_certificate_pem,
                })
            }
        };

        let call = match self.auth {
            None => CallCredentials::none(),
            Some(AuthConfig::UserPassword { user, password }) => {
                CallCredentials::user_password(user, password)
            }
            Some(AuthConfig::Bearer { token }) => CallCredentials::bearer(token),
            Some(AuthConfig::Metadata { entries }) => entries
                .into_iter()
                .fold(CallCredentials::none(), |call, (key, value)| {
                    call.with(key, value)
                }),
        };

        let mut config = ChannelConfig::new(self.target, channel | call);
        if let Some(timeout_ms) = self.timeout_ms {
            if timeout_ms == 0 {
                return Err(ConfigError::invalid("timeout_ms", "must be greater than zero"));
            }
            config = config.with_timeout(Duration::from_millis(timeout_ms));
        }
        if let Some(connect_timeout_ms) = self.connect_timeout_ms {
            config = config.with_connect_timeout(Duration::from_millis(connect_timeout_ms));
        }
        config.validate()?;
        Ok(config)
    }
}

/// Loads channel configuration files.
pub struct ChannelConfigLoader;

impl ChannelConfigLoader {
    /// Load a channel configuration from `path` and turn it into a ready
    /// [`ChannelConfig`]: a relative `ca_certificate` is read from the config
    /// file's own directory, and call credentials are folded into the channel
    /// credentials.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<ChannelConfig, ConfigError> {
        let path = path.as_ref();
        let file = Self::read_file(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        file.into_config(base_dir)
    }

    /// Parses the file without touching the certificate files it names.
    ///
    /// `.json` and `.yaml`/`.yml` pick the format; any other extension tries
    /// JSON, then YAML. Unknown keys are errors, so a misspelled `security`
    /// block fails here instead of silently falling back to plaintext.
    pub fn read_file(path: &Path) -> Result<ChannelConfigFile, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::from_io_error(e, "channel config loading"))?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        match extension.to_lowercase().as_str() {
            "json" => serde_json::from_str(&content)
                .map_err(|e| ConfigError::from_parse_error(e, "JSON channel config parsing")),
            "yaml" | "yml" => serde_yaml::from_str(&content)
                .map_err(|e| ConfigError::from_parse_error(e, "YAML channel config parsing")),
            _ => serde_json::from_str(&content)
                .or_else(|_| serde_yaml::from_str(&content))
                .map_err(|e| {
                    ConfigError::from_parse_error(
                        e,
                        "channel config parsing (tried both JSON and YAML)",
                    )
                }),
        }
    }
}
