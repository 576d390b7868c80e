//! Relay server builder and main orchestration

use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::relay::Relay;
use crate::runtime::RelayMux;
use crate::types::ForwardMode;
use crate::upstream::{HttpUpstream, Upstream};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;

/// Main server struct - entry point for the library
pub struct RelayServer {
    mux: RelayMux,
}

impl RelayServer {
    /// Create a new server builder
    pub fn builder() -> RelayServerBuilder {
        RelayServerBuilder::new()
    }

    /// Get the RelayMux
    pub fn mux(&self) -> &RelayMux {
        &self.mux
    }

    /// Get the relay
    pub fn relay(&self) -> &Relay {
        self.mux.relay()
    }

    /// Convert server into Axum router
    pub fn into_router(self) -> Router {
        self.mux.into_router()
    }
}

/// Builder for creating a RelayServer
pub struct RelayServerBuilder {
    upstream_url: Option<String>,
    upstream: Option<Arc<dyn Upstream>>,
    forward_mode: ForwardMode,
    timeout: Duration,
    max_body_bytes: usize,
}

impl RelayServerBuilder {
    /// Create a new server builder
    pub fn new() -> Self {
        let defaults = RelayConfig::default();
        Self {
            upstream_url: None,
            upstream: None,
            forward_mode: defaults.forward_mode,
            timeout: defaults.timeout,
            max_body_bytes: defaults.max_body_bytes,
        }
    }

    /// Seed every setting from a validated configuration
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new()
            .upstream_url(config.upstream_url.clone())
            .forward_mode(config.forward_mode)
            .timeout(config.timeout)
            .max_body_bytes(config.max_body_bytes)
    }

    /// Forward to this HTTP(S) address
    pub fn upstream_url(mut self, url: impl Into<String>) -> Self {
        self.upstream_url = Some(url.into());
        self
    }

    /// Use a custom upstream instead of an HTTP one
    pub fn upstream(mut self, upstream: Arc<dyn Upstream>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    pub fn forward_mode(mut self, forward_mode: ForwardMode) -> Self {
        self.forward_mode = forward_mode;
        self
    }

    /// Timeout for the outbound call (HTTP upstream only)
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Build the server
    pub fn build(self) -> Result<RelayServer> {
        let upstream: Arc<dyn Upstream> = match (self.upstream, self.upstream_url) {
            (Some(upstream), _) => upstream,
            (None, Some(url)) => {
                Arc::new(HttpUpstream::builder(url).timeout(self.timeout).build()?)
            }
            (None, None) => return Err(Error::Config("no upstream configured".into())),
        };

        let relay = Relay::new(upstream).with_forward_mode(self.forward_mode);
        let mux = RelayMux::new(relay).with_max_body_bytes(self.max_body_bytes);

        Ok(RelayServer { mux })
    }

    /// Build and start the server, stopping on Ctrl-C
    pub async fn serve(self, addr: impl Into<String>) -> Result<()> {
        let server = self.build()?;
        let addr = addr.into();
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        tracing::info!(
            upstream = %server.relay().upstream().endpoint(),
            forward_mode = %server.relay().forward_mode(),
            "Relay server listening on {}",
            addr
        );

        let app = server.into_router();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Relay server stopped");
        Ok(())
    }
}

impl Default for RelayServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(?e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}
