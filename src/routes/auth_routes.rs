//! HTTP routes for authentication
//!
//! - POST /auth/register       - Create an account and get a JWT token
//! - POST /auth/login          - Authenticate and get a JWT token
//! - POST /auth/refresh        - Exchange a valid token for a fresh pair
//! - GET  /auth/me             - Current user info from token
//! - GET  /auth/check-username - Username availability
//! - GET  /auth/check-email    - Email availability
//! - GET  /auth/phrase         - Daily phrase proxy

use bson::doc;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{check_password_rules, hash_password, verify_password, TokenInput};
use crate::db::schemas::UserDoc;
use crate::routes::helpers::{
    authenticate, caller_id, cors_preflight, error_response, json_response, parse_json_body,
    BoxBody, ErrorResponse,
};
use crate::routes::users::UserResponse;
use crate::server::AppState;
use crate::types::CalmaError;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub age: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub refresh_token: String,
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub available: bool,
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /auth/register
///
/// Flow:
/// 1. Validate fields
/// 2. Check username and email are unused
/// 3. Hash password with argon2
/// 4. Store the user document
/// 5. Generate and return JWT tokens
async fn handle_register(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let body: RegisterRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    if body.username.is_empty() || body.email.is_empty() || body.password.is_empty() {
        return error_response(&CalmaError::BadRequest(
            "Missing required fields: username, email, password".into(),
        ));
    }

    if !body.email.contains('@') {
        return error_response(&CalmaError::BadRequest("Invalid email address".into()));
    }

    if let Err(e) = check_password_rules(&body.password) {
        return error_response(&e);
    }

    let collection = match state.users().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    // Check both unique fields up front for a friendly error; the unique
    // indexes still guard against races.
    match collection
        .find_one(doc! { "$or": [ { "username": &body.username }, { "email": &body.email } ] })
        .await
    {
        Ok(Some(existing)) => {
            let field = if existing.username == body.username {
                "username"
            } else {
                "email"
            };
            return json_response(
                StatusCode::CONFLICT,
                &ErrorResponse {
                    error: format!("An account with this {} already exists", field),
                    code: Some("USER_EXISTS".into()),
                },
            );
        }
        Ok(None) => {}
        Err(e) => return error_response(&e),
    }

    let password_hash = match hash_password(&body.password) {
        Ok(h) => h,
        Err(e) => return error_response(&e),
    };

    let user = UserDoc::new(body.username.clone(), body.email.clone(), password_hash, body.age);

    let user_id = match collection.insert_one(user).await {
        Ok(id) => id,
        Err(e) => {
            let error_str = e.to_string();
            if error_str.contains("duplicate key") || error_str.contains("E11000") {
                return json_response(
                    StatusCode::CONFLICT,
                    &ErrorResponse {
                        error: "An account with this username or email already exists".into(),
                        code: Some("USER_EXISTS".into()),
                    },
                );
            }
            return error_response(&e);
        }
    };

    info!("Registered new user: {}", body.username);

    issue_tokens(
        &state,
        user_id.to_hex(),
        body.username,
        body.email,
        StatusCode::CREATED,
    )
}

/// POST /auth/login
async fn handle_login(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let body: LoginRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    if body.identifier.is_empty() || body.password.is_empty() {
        return error_response(&CalmaError::BadRequest(
            "Missing required fields: identifier, password".into(),
        ));
    }

    let collection = match state.users().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let user = match collection
        .find_one(doc! { "$or": [ { "username": &body.identifier }, { "email": &body.identifier } ] })
        .await
    {
        Ok(Some(u)) => u,
        Ok(None) => {
            return error_response(&CalmaError::Unauthorized("Invalid credentials".into()));
        }
        Err(e) => return error_response(&e),
    };

    match verify_password(&body.password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) => {
            warn!("Failed login attempt for {}", body.identifier);
            return error_response(&CalmaError::Unauthorized("Invalid credentials".into()));
        }
        Err(e) => return error_response(&e),
    }

    let user_id = match user._id {
        Some(id) => id.to_hex(),
        None => return error_response(&CalmaError::Internal("User document missing id".into())),
    };

    info!("User logged in: {}", user.username);

    issue_tokens(&state, user_id, user.username, user.email, StatusCode::OK)
}

/// POST /auth/refresh
///
/// Accepts any still-valid token (access or refresh) and issues a fresh pair.
async fn handle_refresh(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let claims = match authenticate(&req, &state) {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    // Confirm the account still exists before re-issuing
    let collection = match state.users().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let id = match caller_id(&claims) {
        Ok(id) => id,
        Err(e) => return error_response(&e),
    };

    let user = match collection.find_by_id(id).await {
        Ok(Some(u)) => u,
        Ok(None) => return error_response(&CalmaError::UserNotFound(claims.user_id)),
        Err(e) => return error_response(&e),
    };

    issue_tokens(
        &state,
        claims.user_id,
        user.username,
        user.email,
        StatusCode::OK,
    )
}

/// GET /auth/me
async fn handle_me(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let claims = match authenticate(&req, &state) {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let id = match caller_id(&claims) {
        Ok(id) => id,
        Err(e) => return error_response(&e),
    };

    let collection = match state.users().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    match collection.find_by_id(id).await {
        Ok(Some(user)) => json_response(StatusCode::OK, &UserResponse::from_doc(&user)),
        Ok(None) => error_response(&CalmaError::UserNotFound(claims.user_id)),
        Err(e) => error_response(&e),
    }
}

/// GET /auth/check-username?username=...
async fn handle_check_username(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let Some(username) = query_param(&req, "username") else {
        return error_response(&CalmaError::BadRequest(
            "Missing query parameter: username".into(),
        ));
    };

    check_availability(&state, doc! { "username": username }).await
}

/// GET /auth/check-email?email=...
async fn handle_check_email(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let Some(email) = query_param(&req, "email") else {
        return error_response(&CalmaError::BadRequest(
            "Missing query parameter: email".into(),
        ));
    };

    check_availability(&state, doc! { "email": email }).await
}

/// GET /auth/phrase
///
/// Proxies the upstream daily phrase API so clients avoid CORS issues.
async fn handle_phrase(state: Arc<AppState>) -> Response<BoxBody> {
    let result = state
        .http
        .get(&state.args.phrase_url)
        .send()
        .await;

    let response = match result {
        Ok(r) => r,
        Err(e) => {
            warn!("Phrase upstream unreachable: {}", e);
            return json_response(
                StatusCode::BAD_GATEWAY,
                &ErrorResponse {
                    error: "Phrase service unavailable".into(),
                    code: None,
                },
            );
        }
    };

    match response.json::<serde_json::Value>().await {
        Ok(body) => json_response(StatusCode::OK, &body),
        Err(e) => {
            warn!("Phrase upstream returned invalid JSON: {}", e);
            json_response(
                StatusCode::BAD_GATEWAY,
                &ErrorResponse {
                    error: "Phrase service returned an invalid response".into(),
                    code: None,
                },
            )
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn issue_tokens(
    state: &Arc<AppState>,
    user_id: String,
    username: String,
    email: String,
    status: StatusCode,
) -> Response<BoxBody> {
    let input = TokenInput {
        user_id: user_id.clone(),
        username: username.clone(),
    };

    let token = match state.jwt.generate_token(input.clone()) {
        Ok(t) => t,
        Err(e) => return error_response(&e),
    };

    let refresh_token = match state.jwt.generate_refresh_token(input) {
        Ok(t) => t,
        Err(e) => return error_response(&e),
    };

    json_response(
        status,
        &AuthResponse {
            token,
            refresh_token,
            user_id,
            username,
            email,
            expires_in: state.jwt.expiry_seconds(),
        },
    )
}

async fn check_availability(
    state: &Arc<AppState>,
    filter: bson::Document,
) -> Response<BoxBody> {
    let collection = match state.users().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    match collection.find_one(filter).await {
        Ok(existing) => json_response(
            StatusCode::OK,
            &AvailabilityResponse {
                available: existing.is_none(),
            },
        ),
        Err(e) => error_response(&e),
    }
}

fn query_param(req: &Request<hyper::body::Incoming>, name: &str) -> Option<String> {
    let query = req.uri().query()?;
    for param in query.split('&') {
        if let Some((key, value)) = param.split_once('=') {
            if key == name && !value.is_empty() {
                return urlencoding::decode(value).ok().map(|v| v.into_owned());
            }
        }
    }
    None
}

// =============================================================================
// Dispatch
// =============================================================================

pub async fn handle_auth_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    let method = req.method();

    if !path.starts_with("/auth") {
        return None;
    }

    if method == Method::OPTIONS {
        return Some(cors_preflight());
    }

    // Remove query string for matching
    let path = path.split('?').next().unwrap_or(path).to_string();

    let response = match (method.clone(), path.as_str()) {
        (Method::POST, "/auth/register") => handle_register(req, state).await,
        (Method::POST, "/auth/login") => handle_login(req, state).await,
        (Method::POST, "/auth/refresh") => handle_refresh(req, state).await,
        (Method::GET, "/auth/me") => handle_me(req, state).await,
        (Method::GET, "/auth/check-username") => handle_check_username(req, state).await,
        (Method::GET, "/auth/check-email") => handle_check_email(req, state).await,
        (Method::GET, "/auth/phrase") => handle_phrase(state).await,

        (_, "/auth/register")
        | (_, "/auth/login")
        | (_, "/auth/refresh")
        | (_, "/auth/me")
        | (_, "/auth/check-username")
        | (_, "/auth/check-email")
        | (_, "/auth/phrase") => json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            &ErrorResponse {
                error: "Method not allowed".into(),
                code: None,
            },
        ),

        _ => json_response(
            StatusCode::NOT_FOUND,
            &ErrorResponse {
                error: "Auth endpoint not found".into(),
                code: None,
            },
        ),
    };

    Some(response)
}
