use std::path::PathBuf;

use http::Uri;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const fn default_true() -> bool {
    true
}

/// The authentication strategy for http request
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case", tag = "strategy")]
pub enum Auth {
    /// Basic authentication.
    Basic {
        /// The basic authentication username.
        user: String,

        /// The basic authentication password.
        password: String,
    },

    /// Bearer authentication.
    ///
    /// The bearer token value (OAuth2, JWT, etc) is passed as-is.
    Bearer {
        /// The bearer authentication token.
        token: String,
    },
}

/// TLS options for outgoing connections.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    /// Path to an additional CA certificate file, in PEM format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<PathBuf>,

    /// Path to a client certificate file, "key" must also be set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert: Option<PathBuf>,

    /// Path to the private key of "cert".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<PathBuf>,

    /// Server name used to verify the remote certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,

    /// Disable certificate verification.
    ///
    /// Do NOT set this to true unless you understand the risks.
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

/// The HTTP client settings shared by every backend which talks to an HTTP API,
/// usually flattened into the backend arguments.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct HttpClientConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Auth>,

    /// HTTP proxy to send requests through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,

    #[serde(default)]
    pub tls: TlsConfig,

    /// Whether redirect responses are followed.
    #[serde(default = "default_true")]
    pub follow_redirects: bool,

    /// Whether HTTP/2 may be negotiated.
    #[serde(default = "default_true")]
    pub enable_http2: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            auth: None,
            proxy_url: None,
            tls: TlsConfig::default(),
            follow_redirects: true,
            enable_http2: true,
        }
    }
}

impl HttpClientConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(proxy_url) = &self.proxy_url {
            let uri = proxy_url
                .parse::<Uri>()
                .map_err(|err| ConfigError::invalid("proxy_url", err))?;
            if uri.scheme().is_none() || uri.host().is_none() {
                return Err(ConfigError::invalid(
                    "proxy_url",
                    "scheme and host are required",
                ));
            }
        }

        match &self.auth {
            Some(Auth::Basic { user, .. }) if user.is_empty() => {
                return Err(ConfigError::invalid("auth", "basic auth user is empty"));
            }
            Some(Auth::Bearer { token }) if token.is_empty() => {
                return Err(ConfigError::invalid("auth", "bearer token is empty"));
            }
            _ => {}
        }

        match (&self.tls.cert, &self.tls.key) {
            (Some(_), None) => Err(ConfigError::Incomplete {
                present: "tls.cert",
                missing: "tls.key",
            }),
            (None, Some(_)) => Err(ConfigError::Incomplete {
                present: "tls.key",
                missing: "tls.cert",
            }),
            _ => Ok(()),
        }
    }
}
