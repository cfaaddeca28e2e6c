use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Failures of a call against the booking API, tagged by what the caller
/// should do about them.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{message}")]
    Validation { message: String, errors: Option<Value> },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Classifies a non-success response. The body may carry `message`,
    /// `error` or `errors`, or be no JSON at all.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();

        let message = parsed
            .as_ref()
            .and_then(|v| {
                v.get("message")
                    .and_then(Value::as_str)
                    .or_else(|| v.get("error").and_then(Value::as_str))
            })
            .map(str::to_string)
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty() && parsed.is_none()).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            });

        let errors = parsed
            .as_ref()
            .and_then(|v| v.get("errors"))
            .filter(|e| !e.is_null())
            .cloned();

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Unauthorized(message),
            StatusCode::NOT_FOUND => ClientError::NotFound(message),
            StatusCode::CONFLICT => ClientError::Conflict(message),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                ClientError::Validation { message, errors }
            }
            other => ClientError::Server {
                status: other.as_u16(),
                message,
            },
        }
    }
}
