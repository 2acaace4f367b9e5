//! Error types for Calma

use hyper::StatusCode;

/// Main error type for Calma operations
#[derive(Debug, thiserror::Error)]
pub enum CalmaError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("No mood state recorded for user")]
    NoMoodState,

    #[error("Invalid mood state: {0}")]
    InvalidMoodState(String),

    #[error("No daily plan found for user")]
    NoPlanFound,

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),
}

impl CalmaError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::UserNotFound(_) => StatusCode::NOT_FOUND,
            Self::NoMoodState => StatusCode::BAD_REQUEST,
            Self::InvalidMoodState(_) => StatusCode::BAD_REQUEST,
            Self::NoPlanFound => StatusCode::NOT_FOUND,
            Self::WebSocket(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Http(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
        }
    }

    /// Stable machine-readable code for API error bodies
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::UserNotFound(_) => Some("USER_NOT_FOUND"),
            Self::NoMoodState => Some("NO_MOOD_STATE"),
            Self::InvalidMoodState(_) => Some("INVALID_MOOD_STATE"),
            Self::NoPlanFound => Some("NO_PLAN_FOUND"),
            _ => None,
        }
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = self.to_string();
        (status, body)
    }
}

// Implement From conversions for common error types

impl From<std::io::Error> for CalmaError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for CalmaError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for CalmaError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for CalmaError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(err.to_string())
    }
}

impl From<mongodb::error::Error> for CalmaError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for CalmaError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Unauthorized(format!("JWT error: {}", err))
    }
}

/// Result type alias for Calma operations
pub type Result<T> = std::result::Result<T, CalmaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_error_status_codes() {
        assert_eq!(CalmaError::NoMoodState.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            CalmaError::InvalidMoodState("feliz".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(CalmaError::NoPlanFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            CalmaError::UserNotFound("abc".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_domain_error_codes() {
        assert_eq!(CalmaError::NoMoodState.code(), Some("NO_MOOD_STATE"));
        assert_eq!(CalmaError::NoPlanFound.code(), Some("NO_PLAN_FOUND"));
        assert_eq!(CalmaError::Database("down".into()).code(), None);
    }
}
