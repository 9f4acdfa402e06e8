//! Scoring event wire format and request classification.
//!
//! A client submits exactly one JSON document per TCP connection. This crate
//! turns those bytes into a [`ScoringEvent`], decides whether the request
//! mutates the score table, and renders the single [`Outcome`] line the
//! server answers with.

pub mod config;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

type JsonMap = serde_json::Map<String, serde_json::Value>;

pub use config::{default_config_path, normalize_bind_addr, ConfigError, FileConfig, ServerConfig};

/// Line sent when the request body could not be read off the socket.
pub const SERVER_ERROR_LINE: &str = "failure: server error: resend request";

/// One candidate change to a competitor's score, as submitted by a client.
///
/// Field names match case-insensitively on decode. Missing fields take
/// their zero value and unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringEvent {
    #[serde(rename = "reqtype", skip_serializing_if = "Option::is_none")]
    pub request_kind: Option<String>,
    pub service: String,
    #[serde(rename = "pointchange")]
    pub point_change: i64,
    pub reason: String,
}

impl ScoringEvent {
    pub fn new(service: impl Into<String>, point_change: i64, reason: impl Into<String>) -> Self {
        Self {
            request_kind: None,
            service: service.into(),
            point_change,
            reason: reason.into(),
        }
    }

    pub fn with_request_kind(mut self, kind: impl Into<String>) -> Self {
        self.request_kind = Some(kind.into());
        self
    }

    /// Encode the event as the JSON body a client writes to the socket.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Request kinds understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Acknowledged only; nothing is read or written.
    Get,
    /// Appends the event to the score table.
    Put,
}

impl RequestKind {
    pub fn is_mutating(self) -> bool {
        matches!(self, RequestKind::Put)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::Get => "GET",
            RequestKind::Put => "PUT",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-side faults. The display text is sent back to the client verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The body is not a JSON object of the event shape.
    #[error("{0}")]
    Decode(String),

    /// `reqtype` was present but is neither GET nor PUT.
    #[error("invalid request type")]
    InvalidRequestKind { token: String },
}

/// Decode one request body.
///
/// Keys are folded to lowercase before matching; when two keys fold to the
/// same name the later one in the document wins. The parser's own message
/// is kept as the error text.
pub fn decode(bytes: &[u8]) -> Result<ScoringEvent, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|err| ProtocolError::Decode(err.to_string()))?;
    let fields = match value {
        serde_json::Value::Object(fields) => fields,
        other => {
            return Err(ProtocolError::Decode(format!(
                "invalid type: {}, expected a JSON object",
                json_type_name(&other)
            )))
        }
    };
    serde_json::from_value(serde_json::Value::Object(fold_keys(fields)))
        .map_err(|err| ProtocolError::Decode(err.to_string()))
}

// Relies on `preserve_order`: the map iterates in document order.
fn fold_keys(fields: JsonMap) -> JsonMap {
    let mut folded = JsonMap::with_capacity(fields.len());
    for (key, value) in fields {
        folded.insert(key.to_lowercase(), value);
    }
    folded
}

/// Classify the optional `reqtype` token.
///
/// Comparison is case-insensitive. An absent or empty token is a PUT.
pub fn classify(token: Option<&str>) -> Result<RequestKind, ProtocolError> {
    let token = match token {
        None => return Ok(RequestKind::Put),
        Some(token) if token.is_empty() => return Ok(RequestKind::Put),
        Some(token) => token,
    };

    if token.eq_ignore_ascii_case("GET") {
        Ok(RequestKind::Get)
    } else if token.eq_ignore_ascii_case("PUT") {
        Ok(RequestKind::Put)
    } else {
        Err(ProtocolError::InvalidRequestKind {
            token: token.to_string(),
        })
    }
}

/// Result of one connection. Renders as the response line and the audit
/// log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    ServerError,
    ClientError(ProtocolError),
    DbError(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    /// The newline-terminated line written to the client. Embedded line
    /// breaks in error details are flattened to spaces.
    pub fn response_line(&self) -> String {
        let mut line = self.to_string().replace(['\r', '\n'], " ");
        line.push('\n');
        line
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => f.write_str("success"),
            Outcome::ServerError => f.write_str(SERVER_ERROR_LINE),
            Outcome::ClientError(err) => write!(f, "failure: client error: {}", err),
            Outcome::DbError(detail) => write!(f, "failure: db error: {}", detail),
        }
    }
}

/// Returns true for a plain SQL identifier: ASCII letters, digits and
/// underscores, not starting with a digit.
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_final_protocol_event() {
        let event =
            decode(br#"{"service":"sshd","pointchange":2,"reason":"disabled root login"}"#)
                .unwrap();
        assert_eq!(event.request_kind, None);
        assert_eq!(event.service, "sshd");
        assert_eq!(event.point_change, 2);
        assert_eq!(event.reason, "disabled root login");
    }

    #[test]
    fn decodes_negative_points_and_ignores_unknown_fields() {
        let event = decode(
            br#"{"reqtype":"put","service":"ftp","pointchange":-5,"reason":"anon","team":7}"#,
        )
        .unwrap();
        assert_eq!(event.request_kind.as_deref(), Some("put"));
        assert_eq!(event.point_change, -5);
    }

    #[test]
    fn missing_fields_take_zero_values() {
        let event = decode(b"{}").unwrap();
        assert_eq!(event, ScoringEvent::default());
    }

    #[test]
    fn accepts_original_field_casing() {
        let event =
            decode(br#"{"Reqtype":"GET","Service":"x","PointChange":3,"Reason":"y"}"#).unwrap();
        assert_eq!(event.request_kind.as_deref(), Some("GET"));
        assert_eq!(event.service, "x");
        assert_eq!(event.point_change, 3);
        assert_eq!(event.reason, "y");
    }

    #[test]
    fn matches_field_names_in_any_case() {
        let event =
            decode(br#"{"reqType":"get","SERVICE":"x","pointChange":5,"rEaSoN":"y"}"#).unwrap();
        assert_eq!(event.request_kind.as_deref(), Some("get"));
        assert_eq!(event.service, "x");
        assert_eq!(event.point_change, 5);
        assert_eq!(event.reason, "y");
        assert_eq!(classify(event.request_kind.as_deref()), Ok(RequestKind::Get));
    }

    #[test]
    fn later_key_wins_when_names_differ_only_in_case() {
        let event = decode(
            br#"{"service":"first","Service":"second","PointChange":1,"pointchange":-4}"#,
        )
        .unwrap();
        assert_eq!(event.service, "second");
        assert_eq!(event.point_change, -4);

        let event = decode(br#"{"Service":"first","service":"second"}"#).unwrap();
        assert_eq!(event.service, "second");
    }

    #[test]
    fn rejects_non_json() {
        let err = decode(b"not json").unwrap_err();
        match err {
            ProtocolError::Decode(message) => assert!(message.contains("line 1")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn rejects_wrong_field_types() {
        assert!(decode(br#"{"service":"x","pointchange":"two","reason":"y"}"#).is_err());
        assert!(decode(br#"{"service":"x","pointchange":1.5,"reason":"y"}"#).is_err());
        assert!(decode(br#"{"service":5,"pointchange":1,"reason":"y"}"#).is_err());
    }

    #[test]
    fn rejects_json_that_is_not_an_object() {
        for body in ["null", r#"["x", 1, "y"]"#, "42", r#""text""#] {
            let err = decode(body.as_bytes()).unwrap_err();
            assert!(err.to_string().contains("expected a JSON object"), "{}", err);
        }
    }

    #[test]
    fn classifies_known_kinds_case_insensitively() {
        for token in ["get", "GET", "Get", "gEt"] {
            assert_eq!(classify(Some(token)), Ok(RequestKind::Get));
        }
        for token in ["put", "PUT", "Put"] {
            assert_eq!(classify(Some(token)), Ok(RequestKind::Put));
        }
    }

    #[test]
    fn absent_or_empty_kind_is_put() {
        assert_eq!(classify(None), Ok(RequestKind::Put));
        assert_eq!(classify(Some("")), Ok(RequestKind::Put));
    }

    #[test]
    fn rejects_unknown_kinds() {
        for token in ["DELETE", "post", " get", "PUTS"] {
            let err = classify(Some(token)).unwrap_err();
            assert_eq!(err.to_string(), "invalid request type");
        }
    }

    #[test]
    fn only_put_mutates() {
        assert!(RequestKind::Put.is_mutating());
        assert!(!RequestKind::Get.is_mutating());
    }

    #[test]
    fn renders_outcome_lines() {
        assert_eq!(Outcome::Success.response_line(), "success\n");
        assert_eq!(
            Outcome::DbError("first\nsecond".to_string()).response_line(),
            "failure: db error: first second\n"
        );
        assert_eq!(
            Outcome::ServerError.to_string(),
            "failure: server error: resend request"
        );
        let invalid = ProtocolError::InvalidRequestKind {
            token: "DELETE".to_string(),
        };
        assert_eq!(
            Outcome::ClientError(invalid).to_string(),
            "failure: client error: invalid request type"
        );
        assert_eq!(
            Outcome::DbError("disk I/O error".to_string()).to_string(),
            "failure: db error: disk I/O error"
        );
    }

    #[test]
    fn encode_omits_absent_kind() {
        let body = ScoringEvent::new("sshd", 2, "disabled root login")
            .encode()
            .unwrap();
        let text = String::from_utf8(body).unwrap();
        assert!(!text.contains("reqtype"));
        assert!(text.contains(r#""pointchange":2"#));

        let body = ScoringEvent::new("x", 0, "y")
            .with_request_kind("get")
            .encode()
            .unwrap();
        assert_eq!(decode(&body).unwrap().request_kind.as_deref(), Some("get"));
    }

    #[test]
    fn recognizes_sql_identifiers() {
        assert!(is_sql_identifier("scores"));
        assert!(is_sql_identifier("_team_2"));
        assert!(!is_sql_identifier(""));
        assert!(!is_sql_identifier("2scores"));
        assert!(!is_sql_identifier("scores; DROP TABLE x"));
        assert!(!is_sql_identifier("a-b"));
    }
}
