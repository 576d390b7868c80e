//! # graphql-relay
//!
//! A single-hop relay that lets a browser dashboard query a remote GraphQL
//! service it could not reach directly because of cross-origin restrictions.
//!
//! ## Features
//!
//! - **Fixed upstream**: every query goes to one configured address, once
//! - **CORS**: permissive allow headers on every response, OPTIONS preflight answered locally
//! - **Validation**: upstream replies must be JSON with a top-level `data` member
//! - **Status codes**: 200 on success and preflight, 400 when the inbound body is
//!   not a JSON object with a string `query`, 405 for other methods, 413 for
//!   oversized bodies, 500 for any upstream failure
//! - **Forward modes**: forward the inbound body verbatim or rebuild a query-only payload
//! - **Catalogue client**: typed access to the public-works projects the dashboard shows
//!
//! ## Main Components
//!
//! - [`RelayServer`]: The main entry point for creating and running the relay.
//! - [`RelayServerBuilder`]: Configuration builder for the server.
//! - [`Relay`]: Method dispatch, forwarding and response normalization.
//! - [`HttpUpstream`]: The outbound HTTP connection.
//! - [`ProjectsClient`]: Queries and normalizes the project catalogue.
//!
//! ## Example
//!
//! ```rust,no_run
//! use graphql_relay::RelayServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = RelayServer::builder()
//!         .upstream_url("https://obras-ng.ciga.sc.gov.br/api")
//!         .build()?;
//!
//!     let app = server.into_router();
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod projects;
pub mod relay;
pub mod runtime;
pub mod server;
pub mod types;
pub mod upstream;

#[cfg(test)]
mod testing;

pub use config::RelayConfig;
pub use error::{Error, ErrorBody, Result};
pub use projects::{Project, ProjectsClient};
pub use relay::{Relay, RelayResponse};
pub use runtime::RelayMux;
pub use server::{RelayServer, RelayServerBuilder};
pub use types::{ForwardMode, QueryRequest, UpstreamReply};
pub use upstream::{HttpUpstream, Upstream};
