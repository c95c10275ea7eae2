use std::fmt::Display;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: Option<GoogleError>,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: Option<String>,
}

/// Builds the [`ApiError`] for a non-2xx response.
pub fn map_http_error(status: u16, body: &str, request_path: &str) -> ApiError {
    let message = extract_message(body).unwrap_or_else(|| {
        StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {status}"))
    });
    ApiError::new(status, parse_response_body(body), request_path, message)
}

/// Builds the [`ApiError`] for a request that produced no response.
pub fn transport_error(err: impl Display, request_path: &str) -> ApiError {
    let message = err.to_string();
    ApiError::new(0, json!({ "raw": message }), request_path, message)
}

/// Parses a response body, keeping non-JSON (or empty) text under `raw`.
pub fn parse_response_body(body: &str) -> JsonValue {
    match serde_json::from_str::<JsonValue>(body) {
        Ok(JsonValue::Null) | Err(_) => json!({ "raw": body }),
        Ok(JsonValue::Object(map)) if map.is_empty() => json!({ "raw": body }),
        Ok(JsonValue::Array(items)) if items.is_empty() => json!({ "raw": body }),
        Ok(value) => value,
    }
}

/// `true` for statuses that signal a transient server-side condition.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// `true` for statuses the server returns before it has applied anything,
/// so even a non-idempotent request may be sent again.
pub fn is_rejected_unprocessed(status: u16) -> bool {
    matches!(status, 429 | 503)
}

fn extract_message(body: &str) -> Option<String> {
    serde_json::from_str::<GoogleErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error)
        .and_then(|error| error.message)
        .filter(|message| !message.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn google_payload_supplies_message_and_status() {
        let body = r#"{"error":{"code":409,"message":"Transaction lock timeout","status":"ABORTED"}}"#;
        let err = map_http_error(409, body, "v1:commit");
        assert_eq!(err.status_code, 409);
        assert_eq!(err.message(), "Transaction lock timeout");
        assert_eq!(err.status(), Some("ABORTED"));
        assert_eq!(err.request_path, "v1:commit");
    }

    #[test]
    fn non_json_bodies_are_kept_raw() {
        let err = map_http_error(502, "<html>bad gateway</html>", "projects/p");
        assert_eq!(err.response_body, json!({ "raw": "<html>bad gateway</html>" }));
        assert_eq!(err.message(), "Bad Gateway");
        assert_eq!(parse_response_body(""), json!({ "raw": "" }));
    }

    #[test]
    fn transport_errors_have_no_status() {
        let err = transport_error("connection refused", "v1:beginTransaction");
        assert!(err.is_transport_failure());
        assert_eq!(err.response_body["raw"], "connection refused");
    }

    #[test]
    fn retryable_statuses() {
        for status in [429, 500, 502, 503, 504] {
            assert!(is_retryable_status(status));
        }
        for status in [400, 401, 403, 404, 409] {
            assert!(!is_retryable_status(status));
        }
    }
}
