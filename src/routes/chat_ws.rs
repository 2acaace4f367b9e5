//! Real-time WebSocket chat between friends
//!
//! ## Protocol
//!
//! Connect: `ws://localhost:8080/chat/ws?token=<jwt>`
//!
//! Messages (client → server):
//! - `join_room` - Open the conversation with a friend
//! - `send_message` - Send a message to the joined room
//! - `ping` - Keep-alive ping
//!
//! Messages (server → client):
//! - `joined` - Room join confirmed
//! - `message` - A chat message in the joined room
//! - `error` - Something went wrong; the connection stays open
//!
//! ## Example Messages
//!
//! ```json
//! // Client joins a conversation
//! { "type": "join_room", "peerId": "665f1c..." }
//!
//! // Client sends a message
//! { "type": "send_message", "content": "hola!" }
//!
//! // Server fans a message out to the room
//! {
//!   "type": "message",
//!   "roomId": "665f1c..._66a0b2...",
//!   "senderId": "665f1c...",
//!   "senderName": "ana",
//!   "content": "hola!",
//!   "sentAt": "2026-08-30T10:30:00Z"
//! }
//! ```
//!
//! Messages are persisted before fan-out, so a recipient who is offline
//! sees them in the room history on the next fetch.

use bson::oid::ObjectId;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::auth::extract_token_from_url;
use crate::db::schemas::{room_id, ChatMessageDoc};
use crate::server::AppState;

/// WebSocket type after upgrade
type HyperWebSocket =
    hyper_tungstenite::WebSocketStream<hyper_util::rt::TokioIo<hyper::upgrade::Upgraded>>;

// ============================================================================
// Message Types
// ============================================================================

/// Message sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Room join confirmed
    Joined {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    /// A chat message in the joined room
    Message(ChatEvent),
    /// Error; the connection stays open
    Error { message: String },
}

/// One chat message as fanned out to room subscribers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    pub room_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    pub sent_at: String,
}

/// Message received from client
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Open the conversation with a friend
    JoinRoom {
        #[serde(rename = "peerId")]
        peer_id: String,
    },
    /// Send a message to the joined room
    SendMessage { content: String },
    /// Keep-alive ping
    Ping,
}

// ============================================================================
// Chat Hub
// ============================================================================

/// Per-room broadcast channels for chat fan-out.
///
/// A room's channel is created lazily on first subscribe and dropped when
/// the last subscriber disconnects.
pub struct ChatHub {
    rooms: DashMap<String, broadcast::Sender<ChatEvent>>,
}

impl ChatHub {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Subscribe to a room, creating its channel if needed
    pub fn subscribe(&self, room: &str) -> broadcast::Receiver<ChatEvent> {
        self.rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(100).0)
            .subscribe()
    }

    /// Broadcast an event to a room's subscribers
    pub fn publish(&self, room: &str, event: ChatEvent) {
        if let Some(sender) = self.rooms.get(room) {
            // Ignore send errors (no subscribers)
            let _ = sender.send(event);
        }
    }

    /// Drop the channel for a room nobody is listening to
    pub fn prune(&self, room: &str) {
        self.rooms
            .remove_if(room, |_, sender| sender.receiver_count() == 0);
    }
}

impl Default for ChatHub {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// Handle WebSocket upgrade for the chat feed
pub async fn handle_chat_ws(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    // Token comes from the URL; browsers cannot set headers on WS connects
    let token = match extract_token_from_url(&req.uri().to_string(), "token") {
        Some(t) => t,
        None => {
            return Response::builder()
                .status(StatusCode::UNAUTHORIZED)
                .header("Content-Type", "application/json")
                .body(Full::new(Bytes::from(
                    r#"{"error": "Missing token query parameter"}"#,
                )))
                .unwrap();
        }
    };

    let result = state.jwt.verify_token(&token);
    let Some(claims) = result.claims.filter(|_| result.valid) else {
        return Response::builder()
            .status(StatusCode::UNAUTHORIZED)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(r#"{"error": "Invalid token"}"#)))
            .unwrap();
    };

    let Ok(user_id) = ObjectId::parse_str(&claims.user_id) else {
        return Response::builder()
            .status(StatusCode::UNAUTHORIZED)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(
                r#"{"error": "Malformed user id in token"}"#,
            )))
            .unwrap();
    };

    if !hyper_tungstenite::is_upgrade_request(&req) {
        return Response::builder()
            .status(StatusCode::BAD_REQUEST)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(
                r#"{"error": "WebSocket upgrade required"}"#,
            )))
            .unwrap();
    }

    let (response, websocket) = match hyper_tungstenite::upgrade(req, None) {
        Ok((resp, ws)) => (resp, ws),
        Err(e) => {
            error!("WebSocket upgrade failed: {}", e);
            return Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::from("WebSocket upgrade failed")))
                .unwrap();
        }
    };

    let username = claims.username.clone();
    tokio::spawn(async move {
        match websocket.await {
            Ok(ws) => {
                let ws: HyperWebSocket = ws;
                if let Err(e) = handle_chat_connection(ws, state, user_id, username).await {
                    warn!("Chat WebSocket error: {}", e);
                }
            }
            Err(e) => {
                error!("WebSocket connection failed: {}", e);
            }
        }
    });

    // Return the upgrade response with the body type converted
    let (parts, _body) = response.into_parts();
    Response::from_parts(parts, Full::new(Bytes::new()))
}

/// Handle an individual chat WebSocket connection
async fn handle_chat_connection(
    ws: HyperWebSocket,
    state: Arc<AppState>,
    user_id: ObjectId,
    username: String,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (mut sender, mut receiver) = ws.split();

    info!("Chat WebSocket connected: {}", username);

    // No room joined yet. The placeholder sender is kept alive so recv()
    // blocks instead of reporting a closed channel.
    let (placeholder, mut rx) = broadcast::channel::<ChatEvent>(1);
    let _hold = placeholder;

    let mut current_room: Option<(String, ObjectId)> = None;

    loop {
        tokio::select! {
            // Fan-out from the joined room
            event = rx.recv() => {
                match event {
                    Ok(chat_event) => {
                        let json = serde_json::to_string(&ServerMessage::Message(chat_event))?;
                        if sender.send(WsMessage::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }

            // Message from client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        let client_msg = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(m) => m,
                            Err(e) => {
                                debug!("Unparseable chat client message: {}", e);
                                send_error(&mut sender, "Unrecognized message").await;
                                continue;
                            }
                        };

                        match client_msg {
                            ClientMessage::JoinRoom { peer_id } => {
                                match join_room(&state, user_id, &peer_id).await {
                                    Ok((room, peer)) => {
                                        // The assignment drops the old subscription, so
                                        // the abandoned room can be pruned right away
                                        rx = state.chat_hub.subscribe(&room);
                                        if let Some((old_room, _)) =
                                            current_room.replace((room.clone(), peer))
                                        {
                                            if old_room != room {
                                                state.chat_hub.prune(&old_room);
                                            }
                                        }
                                        let json = serde_json::to_string(
                                            &ServerMessage::Joined { room_id: room },
                                        )?;
                                        if sender.send(WsMessage::Text(json)).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(message) => {
                                        send_error(&mut sender, &message).await;
                                    }
                                }
                            }
                            ClientMessage::SendMessage { content } => {
                                let Some((room, peer)) = &current_room else {
                                    send_error(&mut sender, "Join a room first").await;
                                    continue;
                                };
                                if content.is_empty() {
                                    send_error(&mut sender, "Message content is empty").await;
                                    continue;
                                }

                                match persist_message(&state, user_id, *peer, &content).await {
                                    Ok(doc) => {
                                        state.chat_hub.publish(room, ChatEvent {
                                            room_id: room.clone(),
                                            sender_id: user_id.to_hex(),
                                            sender_name: username.clone(),
                                            content: doc.content,
                                            sent_at: doc.sent_at.to_chrono().to_rfc3339(),
                                        });
                                    }
                                    Err(message) => {
                                        send_error(&mut sender, &message).await;
                                    }
                                }
                            }
                            ClientMessage::Ping => {
                                let pong = serde_json::json!({ "type": "pong" });
                                let _ = sender.send(WsMessage::Text(pong.to_string())).await;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        info!("Chat WebSocket disconnected: {}", username);
                        break;
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = sender.send(WsMessage::Pong(data)).await;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }
        }
    }

    if let Some((room, _)) = current_room {
        // rx must drop before pruning so the receiver count is accurate
        drop(rx);
        state.chat_hub.prune(&room);
    }

    info!("Chat WebSocket connection closed: {}", username);
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

async fn send_error(
    sender: &mut (impl SinkExt<WsMessage> + Unpin),
    message: &str,
) {
    let msg = ServerMessage::Error {
        message: message.to_string(),
    };
    if let Ok(json) = serde_json::to_string(&msg) {
        let _ = sender.send(WsMessage::Text(json)).await;
    }
}

/// Resolve the peer, require an accepted friendship and return the room
async fn join_room(
    state: &Arc<AppState>,
    user_id: ObjectId,
    raw_peer_id: &str,
) -> Result<(String, ObjectId), String> {
    let peer_id =
        ObjectId::parse_str(raw_peer_id).map_err(|_| "Malformed peer id".to_string())?;

    if peer_id == user_id {
        return Err("Cannot chat with yourself".to_string());
    }

    let collection = state
        .users()
        .await
        .map_err(|_| "Database not available".to_string())?;

    let user = collection
        .find_by_id(user_id)
        .await
        .map_err(|_| "Database error".to_string())?
        .ok_or_else(|| "Account not found".to_string())?;

    if !user.is_friend(&peer_id) {
        return Err("Can only chat with accepted friends".to_string());
    }

    Ok((room_id(&user_id, &peer_id), peer_id))
}

/// Store a message, returning the persisted document
async fn persist_message(
    state: &Arc<AppState>,
    sender_id: ObjectId,
    recipient_id: ObjectId,
    content: &str,
) -> Result<ChatMessageDoc, String> {
    let collection = state
        .chat_messages()
        .await
        .map_err(|_| "Database not available".to_string())?;

    let message = ChatMessageDoc::new(sender_id, recipient_id, content.to_string());
    collection
        .insert_one(message.clone())
        .await
        .map_err(|_| "Failed to store message".to_string())?;

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_serialization() {
        let msg = ServerMessage::Message(ChatEvent {
            room_id: "aaa_bbb".to_string(),
            sender_id: "aaa".to_string(),
            sender_name: "ana".to_string(),
            content: "hola!".to_string(),
            sent_at: "2026-08-30T10:30:00Z".to_string(),
        });

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"message\""));
        assert!(json.contains("\"roomId\":\"aaa_bbb\""));
        assert!(json.contains("\"senderName\":\"ana\""));
    }

    #[test]
    fn test_joined_serialization() {
        let msg = ServerMessage::Joined {
            room_id: "aaa_bbb".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"joined\""));
        assert!(json.contains("aaa_bbb"));
    }

    #[test]
    fn test_client_message_parsing() {
        let join: ClientMessage =
            serde_json::from_str(r#"{"type":"join_room","peerId":"665f1c"}"#).unwrap();
        assert!(matches!(join, ClientMessage::JoinRoom { peer_id } if peer_id == "665f1c"));

        let send: ClientMessage =
            serde_json::from_str(r#"{"type":"send_message","content":"hola"}"#).unwrap();
        assert!(matches!(send, ClientMessage::SendMessage { content } if content == "hola"));

        let ping: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(ping, ClientMessage::Ping));
    }

    #[test]
    fn test_room_switch_prunes_abandoned_room() {
        let hub = ChatHub::new();
        let rx_a = hub.subscribe("room-a");
        let rx_b = hub.subscribe("room-b");

        // Same drop-then-prune sequence the connection loop runs on join
        drop(rx_a);
        hub.prune("room-a");

        assert!(!hub.rooms.contains_key("room-a"));
        assert!(hub.rooms.contains_key("room-b"));
        drop(rx_b);
    }

    #[test]
    fn test_hub_prune_keeps_active_rooms() {
        let hub = ChatHub::new();
        let rx = hub.subscribe("room-a");
        hub.prune("room-a");
        assert!(hub.rooms.contains_key("room-a"));

        drop(rx);
        hub.prune("room-a");
        assert!(!hub.rooms.contains_key("room-a"));
    }
}
