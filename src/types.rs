//! Type definitions shared by the relay and the catalogue client

use axum::body::Bytes;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// GraphQL request sent by a dashboard client
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct QueryRequest {
    /// GraphQL query string
    pub query: String,

    /// Variables for the query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<serde_json::Value>,

    /// Operation name (optional)
    #[serde(
        default,
        rename = "operationName",
        skip_serializing_if = "Option::is_none"
    )]
    pub operation_name: Option<String>,
}

impl QueryRequest {
    /// Request carrying only a query document
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: None,
            operation_name: None,
        }
    }
}

/// How the relay builds the outbound payload from an inbound body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForwardMode {
    /// Forward the inbound JSON object verbatim
    FullBody,
    /// Rebuild a `{"query": ...}` payload, dropping everything else
    #[default]
    QueryOnly,
}

impl FromStr for ForwardMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full-body" | "full" => Ok(ForwardMode::FullBody),
            "query-only" | "query" => Ok(ForwardMode::QueryOnly),
            other => Err(crate::Error::Config(format!(
                "unknown forward mode '{other}' (expected full-body or query-only)"
            ))),
        }
    }
}

impl fmt::Display for ForwardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardMode::FullBody => f.write_str("full-body"),
            ForwardMode::QueryOnly => f.write_str("query-only"),
        }
    }
}

/// Raw answer from the upstream before any validation
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl UpstreamReply {
    /// JSON reply with a 200 status
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: Some("application/json".to_string()),
            body: body.into(),
        }
    }

    /// Whether the content type names a JSON media type.
    ///
    /// Accepts `application/json` and structured `+json` suffixes, ignoring
    /// parameters such as `charset`.
    pub fn is_json(&self) -> bool {
        let Some(content_type) = self.content_type.as_deref() else {
            return false;
        };
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        essence == "application/json"
            || (essence.starts_with("application/") && essence.ends_with("+json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_mode_parses_both_spellings() {
        assert_eq!("full-body".parse::<ForwardMode>().unwrap(), ForwardMode::FullBody);
        assert_eq!(" Query-Only ".parse::<ForwardMode>().unwrap(), ForwardMode::QueryOnly);
        assert!("mirror".parse::<ForwardMode>().is_err());
        assert_eq!(ForwardMode::default(), ForwardMode::QueryOnly);
        assert_eq!(ForwardMode::FullBody.to_string(), "full-body");
    }

    #[test]
    fn json_content_types() {
        let mut reply = UpstreamReply::json("{}");
        assert!(reply.is_json());

        reply.content_type = Some("application/json; charset=utf-8".into());
        assert!(reply.is_json());

        reply.content_type = Some("application/graphql-response+json".into());
        assert!(reply.is_json());

        reply.content_type = Some("text/plain".into());
        assert!(!reply.is_json());

        reply.content_type = None;
        assert!(!reply.is_json());
    }

    #[test]
    fn query_request_uses_camel_case_operation_name() {
        let req: QueryRequest =
            serde_json::from_str(r#"{"query":"{ a }","operationName":"A"}"#).unwrap();
        assert_eq!(req.operation_name.as_deref(), Some("A"));
        assert_eq!(
            serde_json::to_string(&QueryRequest::new("{ a }")).unwrap(),
            r#"{"query":"{ a }"}"#
        );
    }
}
