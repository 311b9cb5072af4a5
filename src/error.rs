use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

use crate::util::retriable_status;

/// Result type alias for MAAP client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the MAAP client.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad argument or argument combination. Detected before anything is sent.
    #[error("invalid argument: {0}")]
    Validation(String),

    /// Missing or unusable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection failure, timeout or other transport problem.
    #[error("could not connect: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP response.
    #[error("{message}")]
    Api {
        status: u16,
        url: String,
        body: String,
        message: String,
    },

    /// The catalog answered with an error document.
    #[error("bad search response: {0}")]
    Catalog(String),

    /// DPS rejected the submission with a WPS exception report.
    #[error("job rejected ({code}): {detail}")]
    JobRejected { code: String, detail: String },

    /// The job did not reach a terminal status before the deadline.
    #[error("job {job_id} did not finish within {elapsed:?}")]
    Timeout { job_id: String, elapsed: Duration },

    /// The object store refused or failed an upload.
    #[error("object storage error: {0}")]
    Storage(String),

    /// Response or file content could not be decoded.
    #[error("failed to parse {0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status code of an [`Error::Api`] failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            // A body cut short shows up as a body or decode error.
            Self::Transport(e) => !e.is_builder() && !e.is_redirect(),
            Self::Api { status, .. } => retriable_status(*status),
            _ => false,
        }
    }

    pub(crate) fn api(status: StatusCode, url: &str, body: String) -> Self {
        let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
            Ok(parsed) => format_api_error(status, url, &parsed),
            Err(_) => format!(
                "API request failed: HTTP {} for url ({})\n{}",
                status.as_u16(),
                url,
                body
            ),
        };
        Self::Api {
            status: status.as_u16(),
            url: url.to_string(),
            body,
            message,
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(format!("JSON: {}", err))
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Self::Parse(format!("XML: {}", err))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Parse(format!("YAML: {}", err))
    }
}

#[derive(Debug, Default, serde::Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    // Flask-style aborts answer {"error": "..."}
    #[serde(default)]
    error: Option<String>,
}

fn format_api_error(status: StatusCode, url: &str, e: &ApiErrorResponse) -> String {
    let message = e
        .message
        .as_deref()
        .or(e.error.as_deref())
        .unwrap_or("");
    let detail = e.detail.as_deref().unwrap_or("");
    let code = e
        .code
        .as_ref()
        .map(|c| c.to_string())
        .unwrap_or_else(|| status.as_u16().to_string());

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return format!(
            "MAAP authentication/authorization failed (HTTP {}).\n- Check that MAAP_API_TOKEN (or `token:` in .maaprc) holds a valid token\n- Inside the ADE, make sure MAAP_PGT is set and not expired\n\nServer message: {}\n{}\nrequest: {}",
            code, message, detail, url
        );
    }

    if status == StatusCode::NOT_FOUND {
        return format!(
            "MAAP API endpoint not found (HTTP 404).\n- The resource may not exist, or MAAP_API_HOST points at the wrong environment\n\nServer message: {}\n{}\nrequest: {}",
            message, detail, url
        );
    }

    format!(
        "API request failed: HTTP {} for url ({})\n{}\n{}",
        code, url, message, detail
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_keeps_status_and_body() {
        let err = Error::api(
            StatusCode::BAD_GATEWAY,
            "https://api.example/search",
            "upstream down".to_string(),
        );
        assert_eq!(err.status(), Some(502));
        assert!(err.is_transient());
        match &err {
            Error::Api { body, .. } => assert_eq!(body, "upstream down"),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.to_string().contains("HTTP 502"));
    }

    #[test]
    fn api_error_uses_json_message() {
        let err = Error::api(
            StatusCode::UNAUTHORIZED,
            "https://api.example/members/self",
            r#"{"code": 401, "message": "Unauthorized"}"#.to_string(),
        );
        let text = err.to_string();
        assert!(text.contains("authentication/authorization failed"));
        assert!(text.contains("Unauthorized"));
        assert!(!err.is_transient());
    }

    #[test]
    fn validation_is_not_transient() {
        let err = Error::validation("limit must be at least 1");
        assert!(!err.is_transient());
        assert_eq!(err.status(), None);
    }
}
