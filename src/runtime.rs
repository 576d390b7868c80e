//! Runtime support for the relay - HTTP routing and layers.

use crate::relay::{Relay, ALLOW_HEADERS, ALLOW_METHODS, ALLOW_ORIGIN};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN,
        },
        HeaderValue, Method,
    },
    response::IntoResponse,
    routing::{any, get},
    Router,
};
use std::sync::Arc;
use tower_http::{
    limit::RequestBodyLimitLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};

/// Paths the dashboard posts queries to
pub const RELAY_PATHS: [&str; 2] = ["/api", "/api/graphql"];

/// RelayMux - HTTP front of the relay
///
/// Routes every method on the relay paths into [`Relay::handle`] so that
/// refused methods still receive the CORS headers. It can be converted into an
/// Axum router.
#[derive(Clone, Debug)]
pub struct RelayMux {
    relay: Relay,
    max_body_bytes: usize,
}

impl RelayMux {
    /// Create a new RelayMux around an already built relay
    pub fn new(relay: Relay) -> Self {
        Self {
            relay,
            max_body_bytes: crate::config::DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Limit inbound body size (oversized bodies get 413)
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Convert to Axum router
    pub fn into_router(self) -> Router {
        let max_body_bytes = self.max_body_bytes;
        let state = Arc::new(self);

        let mut router = Router::new().route("/healthz", get(health));
        for path in RELAY_PATHS {
            router = router.route(path, any(handle_relay));
        }

        // Rejections raised by the layers never reach the relay, so they get
        // the CORS headers here.
        router
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(max_body_bytes))
            .layer(SetResponseHeaderLayer::if_not_present(
                ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static(ALLOW_ORIGIN),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(ALLOW_METHODS),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static(ALLOW_HEADERS),
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

/// Handler for every method on the relay paths
async fn handle_relay(
    State(mux): State<Arc<RelayMux>>,
    method: Method,
    body: Bytes,
) -> impl IntoResponse {
    mux.relay.handle(&method, body).await
}

async fn health() -> &'static str {
    "ok"
}
