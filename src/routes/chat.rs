//! HTTP routes for chat history
//!
//! - GET  /chat/{peer_id}/messages  - Conversation history with a friend
//! - POST /chat/{peer_id}/messages  - Send a message over HTTP
//! - GET  /chat/ws                  - WebSocket upgrade (see chat_ws)
//!
//! A conversation is addressed by the peer's user id; the canonical room
//! key is derived from both ids so either side lands in the same room.
//! Messages sent over HTTP are persisted first and then fanned out to any
//! live WebSocket subscribers of the room.

use bson::{doc, oid::ObjectId};
use http_body_util::BodyExt;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::schemas::{room_id, ChatMessageDoc, UserDoc};
use crate::routes::chat_ws::{handle_chat_ws, ChatEvent};
use crate::routes::helpers::{
    authenticate, caller_id, cors_preflight, error_response, json_response, parse_json_body,
    parse_user_id, BoxBody, ErrorResponse,
};
use crate::server::AppState;
use crate::types::CalmaError;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageResponse {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub sent_at: String,
}

impl ChatMessageResponse {
    fn from_doc(doc: &ChatMessageDoc) -> Self {
        Self {
            id: doc._id.map(|id| id.to_hex()).unwrap_or_default(),
            room_id: doc.room_id.clone(),
            sender_id: doc.sender_id.to_hex(),
            recipient_id: doc.recipient_id.to_hex(),
            content: doc.content.clone(),
            sent_at: doc.sent_at.to_chrono().to_rfc3339(),
        }
    }
}

// =============================================================================
// Route Handlers
// =============================================================================

/// GET /chat/{peer_id}/messages
async fn handle_history(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    raw_peer_id: &str,
) -> Response<BoxBody> {
    let (user_id, peer_id) = match authorize_conversation(&req, &state, raw_peer_id).await {
        Ok(pair) => pair,
        Err(e) => return error_response(&e),
    };

    let room = room_id(&user_id, &peer_id);

    let collection = match state.chat_messages().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    match collection
        .find_many_sorted(doc! { "room_id": &room }, doc! { "sent_at": 1 })
        .await
    {
        Ok(docs) => {
            let list: Vec<ChatMessageResponse> =
                docs.iter().map(ChatMessageResponse::from_doc).collect();
            json_response(StatusCode::OK, &list)
        }
        Err(e) => error_response(&e),
    }
}

/// POST /chat/{peer_id}/messages
async fn handle_send(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    raw_peer_id: &str,
) -> Response<BoxBody> {
    let claims = match authenticate(&req, &state) {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };
    let sender_name = claims.username.clone();

    let (user_id, peer_id) = match authorize_conversation(&req, &state, raw_peer_id).await {
        Ok(pair) => pair,
        Err(e) => return error_response(&e),
    };

    let body: SendMessageRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    if body.content.is_empty() {
        return error_response(&CalmaError::BadRequest("Message content is empty".into()));
    }

    let collection = match state.chat_messages().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let mut message = ChatMessageDoc::new(user_id, peer_id, body.content);

    match collection.insert_one(message.clone()).await {
        Ok(id) => message._id = Some(id),
        Err(e) => return error_response(&e),
    }

    // Fan out to live WebSocket subscribers after the write succeeded
    state.chat_hub.publish(
        &message.room_id,
        ChatEvent {
            room_id: message.room_id.clone(),
            sender_id: user_id.to_hex(),
            sender_name,
            content: message.content.clone(),
            sent_at: message.sent_at.to_chrono().to_rfc3339(),
        },
    );

    json_response(StatusCode::CREATED, &ChatMessageResponse::from_doc(&message))
}

// =============================================================================
// Helpers
// =============================================================================

/// Authenticate and require an accepted friendship with the peer
async fn authorize_conversation(
    req: &Request<hyper::body::Incoming>,
    state: &Arc<AppState>,
    raw_peer_id: &str,
) -> Result<(ObjectId, ObjectId), CalmaError> {
    let claims = authenticate(req, state)?;
    let user_id = caller_id(&claims)?;
    let peer_id = parse_user_id(raw_peer_id)?;

    if peer_id == user_id {
        return Err(CalmaError::BadRequest("Cannot chat with yourself".into()));
    }

    let collection = state.users().await?;

    let user: UserDoc = collection
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| CalmaError::UserNotFound(claims.user_id))?;

    if !user.is_friend(&peer_id) {
        return Err(CalmaError::Forbidden(
            "Can only chat with accepted friends".into(),
        ));
    }

    Ok((user_id, peer_id))
}

// =============================================================================
// Dispatch
// =============================================================================

pub async fn handle_chat_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    let method = req.method();

    if !path.starts_with("/chat") {
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

    // segments[0] == "chat"
    let response = match (method.clone(), &segments[1..]) {
        // WebSocket upgrade keeps the GET method
        (Method::GET, [sub]) if sub == "ws" => {
            let full = handle_chat_ws(state, req).await;
            full.map(|body| body.map_err(|never| match never {}).boxed())
        }

        (Method::GET, [peer_id, sub]) if sub == "messages" => {
            handle_history(req, state, peer_id).await
        }
        (Method::POST, [peer_id, sub]) if sub == "messages" => {
            handle_send(req, state, peer_id).await
        }

        _ => json_response(
            StatusCode::NOT_FOUND,
            &ErrorResponse {
                error: "Chat endpoint not found".into(),
                code: None,
            },
        ),
    };

    Some(response)
}
