//! Outbound connection to the fixed upstream GraphQL service

use crate::config::DEFAULT_TIMEOUT_SECS;
use crate::error::{Error, Result};
use crate::types::UpstreamReply;
use axum::body::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::time::Duration;

/// A single fixed destination for relayed queries.
///
/// Implementations perform exactly one outbound call per invocation and never
/// retry. Validation of the reply is left to the caller.
#[async_trait::async_trait]
pub trait Upstream: Send + Sync {
    /// POST a JSON body and return the raw reply
    async fn post_json(&self, body: Bytes) -> Result<UpstreamReply>;

    /// Address used in diagnostics
    fn endpoint(&self) -> &str;
}

/// HTTP upstream backed by `reqwest`
///
/// # Example
///
/// ```rust,no_run
/// use graphql_relay::HttpUpstream;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let upstream = HttpUpstream::builder("https://obras-ng.ciga.sc.gov.br/api")
///     .timeout(Duration::from_secs(10))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct HttpUpstream {
    endpoint: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpUpstream {
    /// Start building an upstream with custom connection behavior.
    pub fn builder(endpoint: impl Into<String>) -> HttpUpstreamBuilder {
        HttpUpstreamBuilder::new(endpoint)
    }

    /// Create an upstream with the default timeout
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Self::builder(endpoint).build()
    }

    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait::async_trait]
impl Upstream for HttpUpstream {
    async fn post_json(&self, body: Bytes) -> Result<UpstreamReply> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;

        tracing::debug!(
            endpoint = %self.endpoint,
            status = %status,
            bytes = body.len(),
            "upstream replied"
        );

        Ok(UpstreamReply {
            status,
            content_type,
            body,
        })
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl HttpUpstream {
    fn transport_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::UpstreamUnreachable(format!(
                "{} timed out after {:?}",
                self.endpoint, self.timeout
            ))
        } else {
            Error::UpstreamUnreachable(format!("{}: {err}", self.endpoint))
        }
    }
}

impl std::fmt::Debug for HttpUpstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpUpstream")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Builder for configuring upstream creation.
pub struct HttpUpstreamBuilder {
    endpoint: String,
    timeout: Duration,
}

impl HttpUpstreamBuilder {
    fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Timeout for the whole outbound exchange.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the client. No connection is made until the first call.
    pub fn build(self) -> Result<HttpUpstream> {
        let url = reqwest::Url::parse(&self.endpoint)
            .map_err(|e| Error::Config(format!("upstream url '{}': {e}", self.endpoint)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "upstream url must be http or https, got '{}'",
                url.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;

        Ok(HttpUpstream {
            endpoint: self.endpoint,
            client,
            timeout: self.timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rejects_bad_urls() {
        assert!(HttpUpstream::new("not a url").is_err());
        assert!(HttpUpstream::new("ws://example.com/api").is_err());
    }

    #[test]
    fn builder_keeps_endpoint_and_timeout() {
        let upstream = HttpUpstream::builder("http://127.0.0.1:9/api")
            .timeout(Duration::from_millis(250))
            .build()
            .expect("valid upstream");
        assert_eq!(upstream.endpoint(), "http://127.0.0.1:9/api");
        assert_eq!(upstream.timeout(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let upstream = HttpUpstream::builder(format!("http://{addr}/api"))
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();

        let err = upstream
            .post_json(Bytes::from_static(b"{\"query\":\"{ a }\"}"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpstreamUnreachable(_)), "got {err:?}");
    }
}
