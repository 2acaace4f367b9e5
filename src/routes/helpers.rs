//! Shared helpers for route handlers: JSON responses, body parsing and
//! token extraction.

use bson::oid::ObjectId;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::{extract_token_from_header, Claims};
use crate::server::AppState;
use crate::types::CalmaError;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Maximum accepted JSON request body
const MAX_BODY_BYTES: usize = 10240;

/// Standard error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .body(full_body(json))
        .unwrap()
}

/// Map a CalmaError to its JSON error response
pub fn error_response(err: &CalmaError) -> Response<BoxBody> {
    json_response(
        err.status_code(),
        &ErrorResponse {
            error: err.to_string(),
            code: err.code().map(|c| c.to_string()),
        },
    )
}

pub fn cors_preflight() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header("Access-Control-Max-Age", "86400")
        .body(empty_body())
        .unwrap()
}

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

pub async fn parse_json_body<T: for<'de> Deserialize<'de>>(
    req: Request<hyper::body::Incoming>,
) -> Result<T, CalmaError> {
    let body = req
        .collect()
        .await
        .map_err(|e| CalmaError::Http(format!("Failed to read body: {}", e)))?;

    let bytes = body.to_bytes();
    if bytes.len() > MAX_BODY_BYTES {
        return Err(CalmaError::Http("Request body too large".into()));
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| CalmaError::Http(format!("Invalid JSON: {}", e)))
}

pub fn get_auth_header(req: &Request<hyper::body::Incoming>) -> Option<&str> {
    req.headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Verify the caller's token and return its claims
pub fn authenticate(
    req: &Request<hyper::body::Incoming>,
    state: &Arc<AppState>,
) -> Result<Claims, CalmaError> {
    let token = extract_token_from_header(get_auth_header(req))
        .ok_or_else(|| CalmaError::Unauthorized("Missing authorization token".into()))?;

    let result = state.jwt.verify_token(token);
    if !result.valid {
        return Err(CalmaError::Unauthorized(
            result.error.unwrap_or_else(|| "Invalid token".into()),
        ));
    }

    result
        .claims
        .ok_or_else(|| CalmaError::Unauthorized("Invalid token".into()))
}

/// Parse the caller's user id out of verified claims
pub fn caller_id(claims: &Claims) -> Result<ObjectId, CalmaError> {
    ObjectId::parse_str(&claims.user_id)
        .map_err(|_| CalmaError::Unauthorized("Malformed user id in token".into()))
}

/// Parse an ObjectId path segment, mapping failure to UserNotFound
pub fn parse_user_id(raw: &str) -> Result<ObjectId, CalmaError> {
    ObjectId::parse_str(raw).map_err(|_| CalmaError::UserNotFound(raw.to_string()))
}
