//! Service container.
//!
//! Owns the service configuration and the services built from it. Services
//! hold only a weak back-reference, so dropping the container is enough to
//! tear everything down.
//!
//! # Example
//!
//! ```no_run
//! use baas_pubsub::{Container, ServiceConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let container = Container::new(ServiceConfig::new("https://api.example.com", "key"))?;
//!     container.connect()?;
//!
//!     container.pubsub().subscribe_fn("news", |event| println!("{}", event.data))?;
//!     Ok(())
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::config::{PubsubOptions, ServiceConfig};
use crate::error::Result;
use crate::pubsub::PubsubClient;
use crate::transport::TransportFactory;

// ============================================================================
// Container
// ============================================================================

/// Owner of the configuration and the pubsub client.
#[derive(Debug)]
pub struct Container {
    config: RwLock<ServiceConfig>,
    pubsub: PubsubClient,
}

impl Container {
    /// Creates a container with a WebSocket pubsub client.
    ///
    /// The client uses default reconnect settings and the dispatch mode of
    /// `config`. Nothing connects until [`Container::connect`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] when called outside a Tokio runtime.
    pub fn new(config: ServiceConfig) -> Result<Arc<Self>> {
        let options = PubsubOptions::new().with_dispatch(config.dispatch);
        let pubsub = PubsubClient::new(options)?;
        Ok(Self::assemble(config, pubsub))
    }

    /// Creates a container with explicit options and transport factory.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] when called outside a Tokio runtime.
    pub fn with_transport(
        config: ServiceConfig,
        options: PubsubOptions,
        factory: Arc<dyn TransportFactory>,
    ) -> Result<Arc<Self>> {
        let pubsub = PubsubClient::with_transport(options, factory)?;
        Ok(Self::assemble(config, pubsub))
    }

    fn assemble(config: ServiceConfig, pubsub: PubsubClient) -> Arc<Self> {
        let container = Arc::new(Self {
            config: RwLock::new(config),
            pubsub,
        });
        container.pubsub.attach_owner(Arc::downgrade(&container));
        container
    }

    /// Returns a copy of the current configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> ServiceConfig {
        self.config.read().clone()
    }

    /// Returns the pubsub client.
    #[inline]
    #[must_use]
    pub fn pubsub(&self) -> &PubsubClient {
        &self.pubsub
    }

    /// Replaces the configuration and reconnects the pubsub client to it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] if the new endpoint is
    /// unusable; the previous configuration is kept in that case.
    pub fn configure(&self, config: ServiceConfig) -> Result<()> {
        config.pubsub_uri()?;
        debug!(endpoint = %config.endpoint, "Service configuration replaced");
        *self.config.write() = config;
        self.pubsub.reconfigure()
    }

    /// Connects the pubsub client using the current configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] if the endpoint is unusable.
    pub fn connect(&self) -> Result<()> {
        self.pubsub.reconfigure()
    }
}

// ============================================================================
// Tests
// ============================================================================
