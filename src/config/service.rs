//! Service endpoint configuration.
//!
//! # Example
//!
//! ```
//! use baas_pubsub::ServiceConfig;
//!
//! let config = ServiceConfig::new("https://example.test:443/", "abc");
//! assert_eq!(
//!     config.pubsub_uri().unwrap(),
//!     "wss://example.test:443/pubsub?api_key=abc"
//! );
//! ```

// ============================================================================
// Imports
// ============================================================================

use url::Url;

use crate::error::{Error, Result};

use super::options::DispatchMode;

// ============================================================================
// Constants
// ============================================================================

/// Path of the pubsub endpoint on the service host.
const PUBSUB_PATH: &str = "/pubsub";

// ============================================================================
// ServiceConfig
// ============================================================================

/// Connection settings for one backend service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// HTTP(S) endpoint of the service, as written by the user.
    pub endpoint: String,

    /// API key sent with every connection.
    pub api_key: String,

    /// Execution context for handler dispatch.
    pub dispatch: DispatchMode,
}

impl ServiceConfig {
    /// Creates a configuration with the default dispatch mode.
    #[inline]
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            dispatch: DispatchMode::default(),
        }
    }

    /// Sets the handler dispatch mode.
    #[inline]
    #[must_use]
    pub fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Derives the pubsub WebSocket URI from the HTTP endpoint.
    ///
    /// `http` maps to `ws`, `https` to `wss`. A port written in the endpoint
    /// is kept as written, even when it is the scheme default.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the endpoint does not parse,
    /// has no host, or uses another scheme.
    pub fn pubsub_uri(&self) -> Result<String> {
        let raw = self.endpoint.trim();
        let endpoint = Url::parse(raw)
            .map_err(|e| Error::invalid_argument(format!("invalid endpoint {raw:?}: {e}")))?;

        let scheme = match endpoint.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => {
                return Err(Error::invalid_argument(format!(
                    "unsupported endpoint scheme: {other}"
                )));
            }
        };

        let host = endpoint
            .host_str()
            .ok_or_else(|| Error::invalid_argument(format!("endpoint has no host: {raw:?}")))?;

        let port = written_port(&endpoint, raw)
            .map(|port| format!(":{port}"))
            .unwrap_or_default();

        Ok(format!(
            "{scheme}://{host}{port}{PUBSUB_PATH}?api_key={}",
            urlencoding::encode(&self.api_key)
        ))
    }
}

/// Returns the port as written in `raw`.
///
/// `Url` normalizes a scheme-default port away, so that case is recovered
/// from the authority text.
fn written_port(endpoint: &Url, raw: &str) -> Option<u16> {
    if let Some(port) = endpoint.port() {
        return Some(port);
    }

    let default = endpoint.port_or_known_default()?;
    let (_, rest) = raw.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);

    host_port
        .ends_with(&format!(":{default}"))
        .then_some(default)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_https_with_default_port() {
        let config = ServiceConfig::new("https://example.test:443/", "abc");
        assert_eq!(
            config.pubsub_uri().unwrap(),
            "wss://example.test:443/pubsub?api_key=abc"
        );
    }

    #[test]
    fn test_http_without_port() {
        let config = ServiceConfig::new("http://example.test/", "abc");
        assert_eq!(
            config.pubsub_uri().unwrap(),
            "ws://example.test/pubsub?api_key=abc"
        );
    }

    #[test]
    fn test_custom_port_and_path_dropped() {
        let config = ServiceConfig::new("http://127.0.0.1:3000/api/", "k");
        assert_eq!(
            config.pubsub_uri().unwrap(),
            "ws://127.0.0.1:3000/pubsub?api_key=k"
        );
    }

    #[test]
    fn test_http_explicit_default_port() {
        let config = ServiceConfig::new("http://example.test:80", "k");
        assert_eq!(
            config.pubsub_uri().unwrap(),
            "ws://example.test:80/pubsub?api_key=k"
        );
    }

    #[test]
    fn test_ipv6_host() {
        let config = ServiceConfig::new("https://[::1]:8443/", "k");
        assert_eq!(
            config.pubsub_uri().unwrap(),
            "wss://[::1]:8443/pubsub?api_key=k"
        );
    }

    #[test]
    fn test_api_key_is_encoded() {
        let config = ServiceConfig::new("https://example.test/", "a b&c");
        assert_eq!(
            config.pubsub_uri().unwrap(),
            "wss://example.test/pubsub?api_key=a%20b%26c"
        );
    }

    #[test]
    fn test_rejects_other_scheme() {
        let config = ServiceConfig::new("ftp://example.test/", "abc");
        assert!(matches!(
            config.pubsub_uri(),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        let config = ServiceConfig::new("not a url", "abc");
        assert!(matches!(
            config.pubsub_uri(),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_with_dispatch() {
        let config =
            ServiceConfig::new("http://a/", "k").with_dispatch(DispatchMode::Background);
        assert_eq!(config.dispatch, DispatchMode::Background);
    }
}
