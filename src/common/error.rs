//! Error types for the source layer.
//!
//! Source modules return `Result<String, ApiError>` internally and render
//! failures as `Error (CODE): message` text at the tool boundary. No error
//! from a data source ever becomes an MCP protocol error: the tool result
//! is always a successful text payload, matching what LLM clients expect
//! from a search tool.

use thiserror::Error;

/// Failure talking to or decoding a remote API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API error: Connection timed out")]
    Timeout,

    #[error("API error: HTTP {code}")]
    Status { code: u16 },

    #[error("API error: {0}")]
    Request(String),

    #[error("API error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if let Some(status) = err.status() {
            ApiError::Status {
                code: status.as_u16(),
            }
        } else if err.is_decode() {
            ApiError::Parse(err.to_string())
        } else {
            ApiError::Request(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Parse(err.to_string())
    }
}

impl ApiError {
    /// Machine-readable code used in the rendered error text.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Timeout => "TIMEOUT",
            ApiError::Status { .. } => "API_ERROR",
            ApiError::Request(_) => "API_ERROR",
            ApiError::Parse(_) => "API_ERROR",
        }
    }
}

/// Render an error line with the default code.
pub fn error(msg: impl std::fmt::Display) -> String {
    error_with("ERROR", msg)
}

/// Render an error line with an explicit code.
pub fn error_with(code: &str, msg: impl std::fmt::Display) -> String {
    format!("Error ({}): {}", code, msg)
}

/// Render an [`ApiError`] with its own code.
pub fn api_error(err: &ApiError) -> String {
    error_with(err.code(), err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_format() {
        assert_eq!(error("boom"), "Error (ERROR): boom");
        assert_eq!(
            error_with("NOT_FOUND", "Option 'x' not found"),
            "Error (NOT_FOUND): Option 'x' not found"
        );
    }

    #[test]
    fn test_api_error_codes() {
        assert_eq!(ApiError::Timeout.code(), "TIMEOUT");
        assert_eq!(ApiError::Status { code: 500 }.code(), "API_ERROR");
        assert_eq!(
            api_error(&ApiError::Timeout),
            "Error (TIMEOUT): API error: Connection timed out"
        );
    }
}
