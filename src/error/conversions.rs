use serde_json::Value;

use super::types::{ErrorKind, LlmError};

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            LlmError::ParseError(err.to_string())
        } else {
            LlmError::HttpError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::ParseError(err.to_string())
    }
}

/// Classify a non-success HTTP response into a typed `LlmError`.
///
/// Google-style APIs return:
/// `{ "error": { "code": 429, "message": "...", "status": "RESOURCE_EXHAUSTED" } }`
///
/// The structured `status` string wins when present; otherwise the HTTP status
/// code and a few message heuristics decide.
pub fn classify_http_error(provider: &str, status: u16, body_text: &str) -> LlmError {
    let envelope = serde_json::from_str::<Value>(body_text)
        .ok()
        .and_then(|json| json.get("error").cloned());

    let message = envelope
        .as_ref()
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            if body_text.trim().is_empty() {
                format!("{provider} returned HTTP {status}")
            } else {
                body_text.trim().to_string()
            }
        });
    let status_str = envelope
        .as_ref()
        .and_then(|e| e.get("status"))
        .and_then(Value::as_str);

    let kind = status_str
        .and_then(|s| kind_from_status_string(s, &message))
        .unwrap_or_else(|| kind_from_http_status(status, &message));

    LlmError::api(kind, Some(status), message)
}

fn kind_from_status_string(status: &str, message: &str) -> Option<ErrorKind> {
    let kind = match status {
        "RESOURCE_EXHAUSTED" => quota_or_rate(message),
        "UNAVAILABLE" | "INTERNAL" | "DEADLINE_EXCEEDED" | "ABORTED" => ErrorKind::Transient,
        "PERMISSION_DENIED" | "UNAUTHENTICATED" => ErrorKind::Authentication,
        "INVALID_ARGUMENT" | "FAILED_PRECONDITION" | "OUT_OF_RANGE" => {
            if mentions_api_key(message) {
                ErrorKind::Authentication
            } else {
                ErrorKind::InvalidRequest
            }
        }
        "NOT_FOUND" => ErrorKind::NotFound,
        _ => return None,
    };
    Some(kind)
}

fn kind_from_http_status(status: u16, message: &str) -> ErrorKind {
    match status {
        429 => quota_or_rate(message),
        401 | 403 => ErrorKind::Authentication,
        404 => ErrorKind::NotFound,
        400 if mentions_api_key(message) => ErrorKind::Authentication,
        400 | 413 | 422 => ErrorKind::InvalidRequest,
        408 | 500..=599 => ErrorKind::Transient,
        _ => ErrorKind::Other,
    }
}

fn quota_or_rate(message: &str) -> ErrorKind {
    if message.to_lowercase().contains("quota") {
        ErrorKind::Quota
    } else {
        ErrorKind::RateLimited
    }
}

fn mentions_api_key(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("api key") || lower.contains("api_key")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_exhausted_with_quota_message_is_quota() {
        let body = r#"{"error":{"code":429,"message":"You exceeded your current quota","status":"RESOURCE_EXHAUSTED"}}"#;
        let err = classify_http_error("gemini", 429, body);
        assert_eq!(err.kind(), ErrorKind::Quota);
        assert_eq!(err.status(), Some(429));
    }

    #[test]
    fn resource_exhausted_without_quota_is_rate_limited() {
        let body = r#"{"error":{"code":429,"message":"Too many requests","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            classify_http_error("gemini", 429, body).kind(),
            ErrorKind::RateLimited
        );
    }

    #[test]
    fn invalid_api_key_is_authentication() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(
            classify_http_error("gemini", 400, body).kind(),
            ErrorKind::Authentication
        );
    }

    #[test]
    fn plain_invalid_argument_is_invalid_request() {
        let body = r#"{"error":{"code":400,"message":"maxOutputTokens out of range","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(
            classify_http_error("gemini", 400, body).kind(),
            ErrorKind::InvalidRequest
        );
    }

    #[test]
    fn non_envelope_body_falls_back_to_http_status() {
        let err = classify_http_error("gemini", 503, "upstream overloaded");
        assert_eq!(err.kind(), ErrorKind::Transient);
        match err {
            LlmError::Api { message, .. } => assert_eq!(message, "upstream overloaded"),
            other => panic!("unexpected error variant: {other:?}"),
        }

        assert_eq!(
            classify_http_error("gemini", 403, "").kind(),
            ErrorKind::Authentication
        );
        assert_eq!(
            classify_http_error("gemini", 404, "").kind(),
            ErrorKind::NotFound
        );
    }
}
