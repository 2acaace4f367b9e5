//! HTTP routes for friendships
//!
//! - POST   /friends/request   - Send a friend request by username
//! - POST   /friends/accept    - Accept a pending request
//! - POST   /friends/decline   - Decline a pending request
//! - GET    /friends           - List accepted friends
//! - GET    /friends/pending   - List incoming pending requests
//! - GET    /friends/search/{username} - Search users with friendship status
//! - DELETE /friends/{id}      - Remove a friend
//!
//! Friendship is stored as an edge on both user documents. Each operation
//! loads both documents, applies the pure transition from the schema module
//! and writes both lists back. Last write wins on concurrent updates.

use bson::{doc, oid::ObjectId, DateTime};
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::db::schemas::{
    accept_friend_request, decline_friend_request, remove_friend, send_friend_request,
    FriendEntry, FriendStatus, UserDoc,
};
use crate::routes::helpers::{
    authenticate, caller_id, cors_preflight, error_response, json_response, parse_json_body,
    parse_user_id, BoxBody, ErrorResponse, SuccessResponse,
};
use crate::server::AppState;
use crate::types::CalmaError;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct FriendRequestBody {
    /// Username of the user to befriend
    pub username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendAnswerBody {
    /// Id of the user whose request is being answered
    pub user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendResponse {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    pub status: FriendStatus,
    pub sent_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<String>,
}

impl FriendResponse {
    fn new(entry: &FriendEntry, user: &UserDoc) -> Self {
        Self {
            id: entry.friend_id.to_hex(),
            username: user.username.clone(),
            profile_image: user.profile_image.clone(),
            status: entry.status,
            sent_at: entry.sent_at.to_chrono().to_rfc3339(),
            accepted_at: entry.accepted_at.map(|d| d.to_chrono().to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendSearchResult {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    /// Friendship status from the caller's side, absent when unrelated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<FriendStatus>,
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /friends/request
async fn handle_send_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let claims = match authenticate(&req, &state) {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };
    let sender_id = match caller_id(&claims) {
        Ok(id) => id,
        Err(e) => return error_response(&e),
    };

    let body: FriendRequestBody = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    let collection = match state.users().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let mut recipient = match collection.find_one(doc! { "username": &body.username }).await {
        Ok(Some(u)) => u,
        Ok(None) => return error_response(&CalmaError::UserNotFound(body.username)),
        Err(e) => return error_response(&e),
    };

    let Some(recipient_id) = recipient._id else {
        return error_response(&CalmaError::Internal("User document missing id".into()));
    };

    if recipient_id == sender_id {
        return error_response(&CalmaError::BadRequest(
            "Cannot send a friend request to yourself".into(),
        ));
    }

    let mut sender = match collection.find_by_id(sender_id).await {
        Ok(Some(u)) => u,
        Ok(None) => return error_response(&CalmaError::UserNotFound(claims.user_id)),
        Err(e) => return error_response(&e),
    };

    if let Err(e) =
        send_friend_request(&mut sender.friends, &mut recipient.friends, sender_id, recipient_id)
    {
        return error_response(&e);
    }

    if let Err(e) = write_friend_lists(&state, &sender, &recipient).await {
        return error_response(&e);
    }

    info!("Friend request: {} -> {}", sender.username, recipient.username);

    json_response(
        StatusCode::CREATED,
        &SuccessResponse {
            success: true,
            message: format!("Friend request sent to {}", recipient.username),
        },
    )
}

/// POST /friends/accept and /friends/decline share this shape
async fn handle_answer_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    accept: bool,
) -> Response<BoxBody> {
    let claims = match authenticate(&req, &state) {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };
    let answerer_id = match caller_id(&claims) {
        Ok(id) => id,
        Err(e) => return error_response(&e),
    };

    let body: FriendAnswerBody = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    let requester_id = match parse_user_id(&body.user_id) {
        Ok(id) => id,
        Err(e) => return error_response(&e),
    };

    let collection = match state.users().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let mut answerer = match collection.find_by_id(answerer_id).await {
        Ok(Some(u)) => u,
        Ok(None) => return error_response(&CalmaError::UserNotFound(claims.user_id)),
        Err(e) => return error_response(&e),
    };

    let mut requester = match collection.find_by_id(requester_id).await {
        Ok(Some(u)) => u,
        Ok(None) => return error_response(&CalmaError::UserNotFound(body.user_id)),
        Err(e) => return error_response(&e),
    };

    let result = if accept {
        accept_friend_request(
            &mut answerer.friends,
            &mut requester.friends,
            answerer_id,
            requester_id,
        )
    } else {
        decline_friend_request(
            &mut answerer.friends,
            &mut requester.friends,
            answerer_id,
            requester_id,
        )
    };

    if let Err(e) = result {
        return error_response(&e);
    }

    if let Err(e) = write_friend_lists(&state, &answerer, &requester).await {
        return error_response(&e);
    }

    let verb = if accept { "accepted" } else { "declined" };
    info!(
        "Friend request {}: {} -> {}",
        verb, requester.username, answerer.username
    );

    json_response(
        StatusCode::OK,
        &SuccessResponse {
            success: true,
            message: format!("Friend request {}", verb),
        },
    )
}

/// GET /friends and GET /friends/pending
async fn handle_list(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    status: FriendStatus,
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

    let user = match collection.find_by_id(id).await {
        Ok(Some(u)) => u,
        Ok(None) => return error_response(&CalmaError::UserNotFound(claims.user_id)),
        Err(e) => return error_response(&e),
    };

    let entries: Vec<&FriendEntry> = user
        .friends
        .iter()
        .filter(|f| f.status == status)
        .collect();

    if entries.is_empty() {
        return json_response(StatusCode::OK, &Vec::<FriendResponse>::new());
    }

    let ids: Vec<ObjectId> = entries.iter().map(|f| f.friend_id).collect();
    let friends = match collection.find_many(doc! { "_id": { "$in": ids } }).await {
        Ok(docs) => docs,
        Err(e) => return error_response(&e),
    };

    let list: Vec<FriendResponse> = entries
        .iter()
        .filter_map(|entry| {
            friends
                .iter()
                .find(|u| u._id == Some(entry.friend_id))
                .map(|u| FriendResponse::new(entry, u))
        })
        .collect();

    json_response(StatusCode::OK, &list)
}

/// GET /friends/search/{username}
async fn handle_search(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    raw_term: &str,
) -> Response<BoxBody> {
    let claims = match authenticate(&req, &state) {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };
    let id = match caller_id(&claims) {
        Ok(id) => id,
        Err(e) => return error_response(&e),
    };

    let term = match urlencoding::decode(raw_term) {
        Ok(d) => d.into_owned(),
        Err(_) => raw_term.to_string(),
    };

    if term.is_empty() {
        return error_response(&CalmaError::BadRequest(
            "Search term must not be empty".into(),
        ));
    }

    let collection = match state.users().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let caller = match collection.find_by_id(id).await {
        Ok(Some(u)) => u,
        Ok(None) => return error_response(&CalmaError::UserNotFound(claims.user_id)),
        Err(e) => return error_response(&e),
    };

    let escaped = crate::routes::users::regex_escape(&term);
    let filter = doc! {
        "username": { "$regex": escaped, "$options": "i" },
        "_id": { "$ne": id },
    };

    match collection.find_many(filter).await {
        Ok(users) => {
            let results: Vec<FriendSearchResult> = users
                .iter()
                .filter_map(|u| {
                    let uid = u._id?;
                    Some(FriendSearchResult {
                        id: uid.to_hex(),
                        username: u.username.clone(),
                        profile_image: u.profile_image.clone(),
                        status: caller.friend_entry(&uid).map(|f| f.status),
                    })
                })
                .collect();
            json_response(StatusCode::OK, &results)
        }
        Err(e) => error_response(&e),
    }
}

/// DELETE /friends/{id}
async fn handle_remove(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    raw_id: &str,
) -> Response<BoxBody> {
    let claims = match authenticate(&req, &state) {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };
    let owner_id = match caller_id(&claims) {
        Ok(id) => id,
        Err(e) => return error_response(&e),
    };

    let other_id = match parse_user_id(raw_id) {
        Ok(id) => id,
        Err(e) => return error_response(&e),
    };

    let collection = match state.users().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let mut owner = match collection.find_by_id(owner_id).await {
        Ok(Some(u)) => u,
        Ok(None) => return error_response(&CalmaError::UserNotFound(claims.user_id)),
        Err(e) => return error_response(&e),
    };

    let mut other = match collection.find_by_id(other_id).await {
        Ok(Some(u)) => u,
        Ok(None) => return error_response(&CalmaError::UserNotFound(raw_id.to_string())),
        Err(e) => return error_response(&e),
    };

    if owner.friend_entry(&other_id).is_none() {
        return error_response(&CalmaError::NotFound("Not in friend list".into()));
    }

    remove_friend(&mut owner.friends, &mut other.friends, owner_id, other_id);

    if let Err(e) = write_friend_lists(&state, &owner, &other).await {
        return error_response(&e);
    }

    json_response(
        StatusCode::OK,
        &SuccessResponse {
            success: true,
            message: "Friend removed".into(),
        },
    )
}

// =============================================================================
// Helpers
// =============================================================================

/// Persist the friend lists of both sides of an edge
async fn write_friend_lists(
    state: &Arc<AppState>,
    a: &UserDoc,
    b: &UserDoc,
) -> Result<(), CalmaError> {
    let collection = state.users().await?;

    for user in [a, b] {
        let Some(id) = user._id else {
            return Err(CalmaError::Internal("User document missing id".into()));
        };
        let friends = bson::to_bson(&user.friends)
            .map_err(|e| CalmaError::Internal(e.to_string()))?;
        collection
            .update_by_id(
                id,
                doc! { "$set": {
                    "friends": friends,
                    "metadata.updated_at": DateTime::now(),
                } },
            )
            .await?;
    }

    Ok(())
}

// =============================================================================
// Dispatch
// =============================================================================

pub async fn handle_friends_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    let method = req.method();

    if !path.starts_with("/friends") {
        return None;
    }

    if method == Method::OPTIONS {
        return Some(cors_preflight());
    }

    let path = path.split('?').next().unwrap_or(path).to_string();
    let segments: Vec<String> = path
        .trim_start_matches('/')
        .split('/')
        .map(str::to_string)
        .collect();

    // segments[0] == "friends"
    let response = match (method.clone(), &segments[1..]) {
        (Method::GET, []) => handle_list(req, state, FriendStatus::Accepted).await,
        (Method::POST, [action]) if action == "request" => handle_send_request(req, state).await,
        (Method::POST, [action]) if action == "accept" => {
            handle_answer_request(req, state, true).await
        }
        (Method::POST, [action]) if action == "decline" => {
            handle_answer_request(req, state, false).await
        }
        (Method::GET, [sub]) if sub == "pending" => {
            handle_list(req, state, FriendStatus::Pending).await
        }
        (Method::GET, [sub, term]) if sub == "search" => {
            handle_search(req, state, term).await
        }
        (Method::DELETE, [id]) => handle_remove(req, state, id).await,

        _ => json_response(
            StatusCode::NOT_FOUND,
            &ErrorResponse {
                error: "Friends endpoint not found".into(),
                code: None,
            },
        ),
    };

    Some(response)
}
