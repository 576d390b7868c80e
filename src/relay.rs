//! The relay: forward one inbound query to the fixed upstream and normalize
//! the outcome.
//!
//! Each call to [`Relay::handle`] is independent. Only POST reaches the
//! upstream, and it does so exactly once; OPTIONS is answered locally as a
//! CORS preflight and every other method is refused without network traffic.

use crate::error::{Error, Result};
use crate::types::{ForwardMode, QueryRequest};
use crate::upstream::Upstream;
use axum::body::{Body, Bytes};
use axum::response::{IntoResponse, Response};
use http::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
};
use http::{Method, StatusCode};
use std::sync::Arc;

pub(crate) const ALLOW_ORIGIN: &str = "*";
pub(crate) const ALLOW_METHODS: &str = "POST, OPTIONS";
pub(crate) const ALLOW_HEADERS: &str = "Content-Type";
const JSON: &str = "application/json";

/// Forwards query payloads to a single upstream
#[derive(Clone)]
pub struct Relay {
    upstream: Arc<dyn Upstream>,
    forward_mode: ForwardMode,
}

impl Relay {
    /// Create a relay in front of `upstream`
    pub fn new(upstream: Arc<dyn Upstream>) -> Self {
        Self {
            upstream,
            forward_mode: ForwardMode::default(),
        }
    }

    /// Choose how outbound payloads are built
    pub fn with_forward_mode(mut self, forward_mode: ForwardMode) -> Self {
        self.forward_mode = forward_mode;
        self
    }

    pub fn forward_mode(&self) -> ForwardMode {
        self.forward_mode
    }

    pub fn upstream(&self) -> &Arc<dyn Upstream> {
        &self.upstream
    }

    /// Handle one inbound request
    pub async fn handle(&self, method: &Method, body: Bytes) -> RelayResponse {
        if *method == Method::OPTIONS {
            return RelayResponse::preflight();
        }
        if *method != Method::POST {
            let err = Error::MethodNotAllowed(method.clone());
            tracing::warn!(error = %err, "rejected relay request");
            return RelayResponse::from_error(&err);
        }

        match self.forward(&body).await {
            Ok(payload) => RelayResponse::json(StatusCode::OK, payload),
            Err(err) => {
                let inbound = String::from_utf8_lossy(&body);
                match &err {
                    Error::InvalidRequest(_) => {
                        tracing::warn!(error = %err, body = %inbound, "rejected relay request")
                    }
                    _ => tracing::error!(
                        error = %err,
                        body = %inbound,
                        upstream = %self.upstream.endpoint(),
                        "relay request failed"
                    ),
                }
                RelayResponse::from_error(&err)
            }
        }
    }

    /// Forward a POST body and return the validated upstream payload
    pub async fn forward(&self, body: &Bytes) -> Result<Bytes> {
        let outbound = self.outbound_payload(body)?;
        let reply = self.upstream.post_json(outbound).await?;

        if !reply.is_json() {
            return Err(Error::MalformedUpstreamResponse(format!(
                "expected a JSON content type, got '{}' (status {})",
                reply.content_type.as_deref().unwrap_or("none"),
                reply.status
            )));
        }

        let parsed: serde_json::Value = serde_json::from_slice(&reply.body).map_err(|e| {
            Error::MalformedUpstreamResponse(format!("body is not valid JSON: {e}"))
        })?;
        let has_data = parsed
            .as_object()
            .is_some_and(|object| object.contains_key("data"));
        if !has_data {
            return Err(Error::MalformedUpstreamResponse(format!(
                "missing top-level 'data' field (status {})",
                reply.status
            )));
        }

        if !reply.status.is_success() {
            tracing::debug!(status = %reply.status, "forwarding non-success upstream envelope");
        }

        Ok(reply.body)
    }

    fn outbound_payload(&self, body: &Bytes) -> Result<Bytes> {
        let parsed: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| Error::InvalidRequest(format!("body is not valid JSON: {e}")))?;
        let object = parsed
            .as_object()
            .ok_or_else(|| Error::InvalidRequest("body must be a JSON object".into()))?;
        let query = object
            .get("query")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| Error::InvalidRequest("missing string field 'query'".into()))?;

        match self.forward_mode {
            ForwardMode::FullBody => Ok(body.clone()),
            ForwardMode::QueryOnly => Ok(serde_json::to_vec(&QueryRequest::new(query))?.into()),
        }
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("upstream", &self.upstream.endpoint())
            .field("forward_mode", &self.forward_mode)
            .finish()
    }
}

/// Normalized relay outcome, always carrying permissive CORS headers
#[derive(Debug, Clone)]
pub struct RelayResponse {
    pub status: StatusCode,
    pub body: Bytes,
    content_type: Option<&'static str>,
}

impl RelayResponse {
    /// Empty acknowledgement for a CORS preflight
    pub fn preflight() -> Self {
        Self {
            status: StatusCode::OK,
            body: Bytes::new(),
            content_type: None,
        }
    }

    /// JSON response with the given status
    pub fn json(status: StatusCode, body: Bytes) -> Self {
        Self {
            status,
            body,
            content_type: Some(JSON),
        }
    }

    /// Error response with a JSON `{ error, details }` body
    pub fn from_error(err: &Error) -> Self {
        let body = serde_json::to_vec(&err.to_error_body())
            .unwrap_or_else(|_| br#"{"error":"internal error"}"#.to_vec());
        Self::json(err.status_code(), body.into())
    }

    pub fn content_type(&self) -> Option<&'static str> {
        self.content_type
    }
}

impl IntoResponse for RelayResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        headers.insert(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static(ALLOW_ORIGIN),
        );
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
        if let Some(content_type) = self.content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorBody;
    use crate::testing::RecordingUpstream;
    use crate::types::UpstreamReply;

    const QUERY_BODY: &[u8] = br#"{"query":"{ obrasServicosDetails(entidade: 141) { id } }","variables":{"a":1}}"#;
    const UPSTREAM_OK: &str = r#"{"data":{"obrasServicosDetails":[{"id":7}]},"extensions":{"cost":3}}"#;

    fn relay(upstream: &Arc<RecordingUpstream>) -> Relay {
        Relay::new(upstream.clone())
    }

    fn error_body(response: &RelayResponse) -> ErrorBody {
        serde_json::from_slice(&response.body).expect("error body is JSON")
    }

    #[tokio::test]
    async fn post_returns_upstream_body_unchanged() {
        let upstream = Arc::new(RecordingUpstream::json(UPSTREAM_OK));
        let response = relay(&upstream)
            .handle(&Method::POST, Bytes::from_static(QUERY_BODY))
            .await;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, Bytes::from_static(UPSTREAM_OK.as_bytes()));
        assert_eq!(response.content_type(), Some("application/json"));
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test]
    async fn null_data_still_counts_as_present() {
        let upstream = Arc::new(RecordingUpstream::json(
            r#"{"data":null,"errors":[{"message":"boom"}]}"#,
        ));
        let response = relay(&upstream)
            .handle(&Method::POST, Bytes::from_static(QUERY_BODY))
            .await;
        assert_eq!(response.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn options_is_an_empty_preflight() {
        let upstream = Arc::new(RecordingUpstream::json(UPSTREAM_OK));
        let response = relay(&upstream).handle(&Method::OPTIONS, Bytes::new()).await;

        assert_eq!(response.status, StatusCode::OK);
        assert!(response.body.is_empty());
        assert_eq!(response.content_type(), None);
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn other_methods_are_refused_without_upstream_call() {
        let upstream = Arc::new(RecordingUpstream::json(UPSTREAM_OK));
        let relay = relay(&upstream);

        for method in [Method::GET, Method::PUT, Method::DELETE, Method::PATCH] {
            let response = relay.handle(&method, Bytes::from_static(QUERY_BODY)).await;
            assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED, "{method}");
            assert!(error_body(&response).error.contains("Method not allowed"));
        }
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn unreachable_upstream_is_a_single_attempt() {
        let upstream = Arc::new(RecordingUpstream::unreachable());
        let response = relay(&upstream)
            .handle(&Method::POST, Bytes::from_static(QUERY_BODY))
            .await;

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        let body = error_body(&response);
        assert!(body.error.contains("connection refused"));
        assert_eq!(
            body.details,
            Some(serde_json::json!({ "code": "UPSTREAM_UNREACHABLE" }))
        );
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test]
    async fn text_plain_is_malformed_even_with_data() {
        let upstream = Arc::new(RecordingUpstream::new(|| {
            Ok(UpstreamReply {
                status: StatusCode::OK,
                content_type: Some("text/plain".into()),
                body: Bytes::from_static(UPSTREAM_OK.as_bytes()),
            })
        }));
        let response = relay(&upstream)
            .handle(&Method::POST, Bytes::from_static(QUERY_BODY))
            .await;

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(error_body(&response).error.contains("text/plain"));
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test]
    async fn json_without_data_is_malformed() {
        let upstream = Arc::new(RecordingUpstream::json(
            r#"{"errors":[{"message":"Syntax Error"}]}"#,
        ));
        let response = relay(&upstream)
            .handle(&Method::POST, Bytes::from_static(QUERY_BODY))
            .await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);

        let upstream = Arc::new(RecordingUpstream::json("[1,2,3]"));
        let response = relay(&upstream)
            .handle(&Method::POST, Bytes::from_static(QUERY_BODY))
            .await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn unparsable_json_reply_is_malformed() {
        let upstream = Arc::new(RecordingUpstream::json("<html>bad gateway</html>"));
        let response = relay(&upstream)
            .handle(&Method::POST, Bytes::from_static(QUERY_BODY))
            .await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            error_body(&response).details,
            Some(serde_json::json!({ "code": "MALFORMED_UPSTREAM_RESPONSE" }))
        );
    }

    #[tokio::test]
    async fn non_success_status_with_envelope_is_forwarded() {
        let upstream = Arc::new(RecordingUpstream::new(|| {
            Ok(UpstreamReply {
                status: StatusCode::BAD_REQUEST,
                content_type: Some("application/json".into()),
                body: Bytes::from_static(br#"{"data":null,"errors":[]}"#),
            })
        }));
        let response = relay(&upstream)
            .handle(&Method::POST, Bytes::from_static(QUERY_BODY))
            .await;
        assert_eq!(response.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn invalid_inbound_bodies_never_reach_upstream() {
        let upstream = Arc::new(RecordingUpstream::json(UPSTREAM_OK));
        let relay = relay(&upstream);

        for body in [
            "not json",
            r#"["query"]"#,
            r#"{"variables":{}}"#,
            r#"{"query":42}"#,
        ] {
            let response = relay.handle(&Method::POST, Bytes::from_static(body.as_bytes())).await;
            assert_eq!(response.status, StatusCode::BAD_REQUEST);
        }
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn query_only_mode_rebuilds_payload() {
        let upstream = Arc::new(RecordingUpstream::json(UPSTREAM_OK));
        relay(&upstream)
            .with_forward_mode(ForwardMode::QueryOnly)
            .handle(&Method::POST, Bytes::from_static(QUERY_BODY))
            .await;

        let sent: serde_json::Value =
            serde_json::from_slice(&upstream.last_body().unwrap()).unwrap();
        assert_eq!(
            sent,
            serde_json::json!({ "query": "{ obrasServicosDetails(entidade: 141) { id } }" })
        );
    }

    #[tokio::test]
    async fn full_body_mode_forwards_verbatim() {
        let upstream = Arc::new(RecordingUpstream::json(UPSTREAM_OK));
        relay(&upstream)
            .with_forward_mode(ForwardMode::FullBody)
            .handle(&Method::POST, Bytes::from_static(QUERY_BODY))
            .await;

        assert_eq!(upstream.last_body().unwrap(), Bytes::from_static(QUERY_BODY));
    }

    #[test]
    fn every_response_carries_cors_headers() {
        for relay_response in [
            RelayResponse::preflight(),
            RelayResponse::json(StatusCode::OK, Bytes::from_static(b"{}")),
            RelayResponse::from_error(&Error::MethodNotAllowed(Method::GET)),
        ] {
            let response = relay_response.into_response();
            let headers = response.headers();
            assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
            assert_eq!(headers[ACCESS_CONTROL_ALLOW_METHODS], "POST, OPTIONS");
            assert_eq!(headers[ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
        }
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLog {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test]
    async fn failure_is_logged_with_inbound_body() {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let upstream = Arc::new(RecordingUpstream::unreachable());
        let response = relay(&upstream)
            .handle(&Method::POST, Bytes::from_static(QUERY_BODY))
            .await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);

        let output = log.contents();
        assert!(output.contains("ERROR"), "{output}");
        assert!(output.contains("relay request failed"), "{output}");
        assert!(output.contains("connection refused"), "{output}");
        assert!(
            output.contains("obrasServicosDetails(entidade: 141)"),
            "{output}"
        );
    }
}
