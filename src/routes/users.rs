//! HTTP routes for user profiles
//!
//! - GET    /users                      - List users (optional ?search=)
//! - GET    /users/{id}                 - Get a user profile
//! - PUT    /users/{id}                 - Update own profile
//! - DELETE /users/{id}                 - Soft-delete own account
//! - POST   /users/{id}/mood           - Record today's mood
//! - GET    /users/{id}/mood           - Mood history
//! - PUT    /users/{id}/schedule       - Replace the activity schedule
//! - GET    /users/{id}/notes          - List notes
//! - POST   /users/{id}/notes          - Create a note
//! - PUT    /users/{id}/notes/{nid}    - Update a note
//! - DELETE /users/{id}/notes/{nid}    - Delete a note

use bson::{doc, oid::ObjectId, DateTime};
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::db::schemas::{record_mood, MoodEntry, NoteEntry, UserDoc};
use crate::plan::{MoodState, Schedule};
use crate::routes::helpers::{
    authenticate, caller_id, cors_preflight, error_response, json_response, parse_json_body,
    parse_user_id, BoxBody, ErrorResponse, SuccessResponse,
};
use crate::server::AppState;
use crate::types::CalmaError;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Public view of a user document. Never exposes the password hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<i32>,
    pub interests: Vec<String>,
    pub schedule: Schedule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_mood: Option<MoodState>,
}

impl UserResponse {
    pub fn from_doc(user: &UserDoc) -> Self {
        Self {
            id: user._id.map(|id| id.to_hex()).unwrap_or_default(),
            username: user.username.clone(),
            email: user.email.clone(),
            profile_image: user.profile_image.clone(),
            age: user.age,
            interests: user.interests.clone(),
            schedule: user.schedule.clone(),
            latest_mood: user.latest_mood(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub age: Option<i32>,
    #[serde(default)]
    pub interests: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct MoodRequest {
    pub mood: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodEntryResponse {
    pub mood: MoodState,
    pub recorded_at: String,
}

impl MoodEntryResponse {
    fn from_entry(entry: &MoodEntry) -> Self {
        Self {
            mood: entry.mood,
            recorded_at: entry.recorded_at.to_chrono().to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NoteRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteResponse {
    pub id: String,
    pub title: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

impl NoteResponse {
    fn from_entry(note: &NoteEntry) -> Self {
        Self {
            id: note.id.clone(),
            title: note.title.clone(),
            content: note.content.clone(),
            created_at: note.created_at.to_chrono().to_rfc3339(),
            updated_at: note.updated_at.to_chrono().to_rfc3339(),
        }
    }
}

// =============================================================================
// Route Handlers
// =============================================================================

/// GET /users?search=...
async fn handle_list_users(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    if let Err(e) = authenticate(&req, &state) {
        return error_response(&e);
    }

    let search = req.uri().query().and_then(|q| {
        q.split('&').find_map(|param| {
            let (key, value) = param.split_once('=')?;
            if key == "search" && !value.is_empty() {
                urlencoding::decode(value).ok().map(|v| v.into_owned())
            } else {
                None
            }
        })
    });

    let filter = match search {
        Some(term) => {
            let escaped = regex_escape(&term);
            doc! { "username": { "$regex": escaped, "$options": "i" } }
        }
        None => doc! {},
    };

    let collection = match state.users().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    match collection.find_many(filter).await {
        Ok(users) => {
            let list: Vec<UserResponse> = users.iter().map(UserResponse::from_doc).collect();
            json_response(StatusCode::OK, &list)
        }
        Err(e) => error_response(&e),
    }
}

/// GET /users/{id}
async fn handle_get_user(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    raw_id: &str,
) -> Response<BoxBody> {
    if let Err(e) = authenticate(&req, &state) {
        return error_response(&e);
    }

    let id = match parse_user_id(raw_id) {
        Ok(id) => id,
        Err(e) => return error_response(&e),
    };

    match find_user(&state, id).await {
        Ok(user) => json_response(StatusCode::OK, &UserResponse::from_doc(&user)),
        Err(e) => error_response(&e),
    }
}

/// PUT /users/{id}
async fn handle_update_user(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    raw_id: &str,
) -> Response<BoxBody> {
    let (id, _) = match authorize_self(&req, &state, raw_id) {
        Ok(pair) => pair,
        Err(e) => return error_response(&e),
    };

    let body: UpdateUserRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    let mut set = doc! { "metadata.updated_at": DateTime::now() };
    if let Some(image) = body.profile_image {
        set.insert("profile_image", image);
    }
    if let Some(age) = body.age {
        set.insert("age", age);
    }
    if let Some(interests) = body.interests {
        set.insert("interests", interests);
    }

    let collection = match state.users().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    match collection.update_by_id(id, doc! { "$set": set }).await {
        Ok(result) if result.matched_count == 0 => {
            error_response(&CalmaError::UserNotFound(raw_id.to_string()))
        }
        Ok(_) => match find_user(&state, id).await {
            Ok(user) => json_response(StatusCode::OK, &UserResponse::from_doc(&user)),
            Err(e) => error_response(&e),
        },
        Err(e) => error_response(&e),
    }
}

/// DELETE /users/{id}
async fn handle_delete_user(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    raw_id: &str,
) -> Response<BoxBody> {
    let (id, claims) = match authorize_self(&req, &state, raw_id) {
        Ok(pair) => pair,
        Err(e) => return error_response(&e),
    };

    let collection = match state.users().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    match collection.soft_delete(id).await {
        Ok(result) if result.matched_count == 0 => {
            error_response(&CalmaError::UserNotFound(raw_id.to_string()))
        }
        Ok(_) => {
            info!("User account deleted: {}", claims.username);
            json_response(
                StatusCode::OK,
                &SuccessResponse {
                    success: true,
                    message: "Account deleted".into(),
                },
            )
        }
        Err(e) => error_response(&e),
    }
}

/// POST /users/{id}/mood
async fn handle_record_mood(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    raw_id: &str,
) -> Response<BoxBody> {
    let (id, _) = match authorize_self(&req, &state, raw_id) {
        Ok(pair) => pair,
        Err(e) => return error_response(&e),
    };

    let body: MoodRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    let mood: MoodState = match body.mood.parse() {
        Ok(m) => m,
        Err(e) => return error_response(&e),
    };

    let mut user = match find_user(&state, id).await {
        Ok(u) => u,
        Err(e) => return error_response(&e),
    };

    record_mood(&mut user.mood_history, mood, DateTime::now());

    let history = match bson::to_bson(&user.mood_history) {
        Ok(b) => b,
        Err(e) => return error_response(&CalmaError::Internal(e.to_string())),
    };

    let collection = match state.users().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let update = doc! { "$set": {
        "mood_history": history,
        "metadata.updated_at": DateTime::now(),
    } };

    match collection.update_by_id(id, update).await {
        Ok(_) => {
            let entries: Vec<MoodEntryResponse> = user
                .mood_history
                .iter()
                .map(MoodEntryResponse::from_entry)
                .collect();
            json_response(StatusCode::OK, &entries)
        }
        Err(e) => error_response(&e),
    }
}

/// GET /users/{id}/mood
async fn handle_mood_history(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    raw_id: &str,
) -> Response<BoxBody> {
    if let Err(e) = authenticate(&req, &state) {
        return error_response(&e);
    }

    let id = match parse_user_id(raw_id) {
        Ok(id) => id,
        Err(e) => return error_response(&e),
    };

    match find_user(&state, id).await {
        Ok(user) => {
            let entries: Vec<MoodEntryResponse> = user
                .mood_history
                .iter()
                .map(MoodEntryResponse::from_entry)
                .collect();
            json_response(StatusCode::OK, &entries)
        }
        Err(e) => error_response(&e),
    }
}

/// PUT /users/{id}/schedule
async fn handle_update_schedule(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    raw_id: &str,
) -> Response<BoxBody> {
    let (id, _) = match authorize_self(&req, &state, raw_id) {
        Ok(pair) => pair,
        Err(e) => return error_response(&e),
    };

    let schedule: Schedule = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    // At most two activity times per segment
    for (segment, times) in [
        ("morning", &schedule.morning),
        ("afternoon", &schedule.afternoon),
        ("evening", &schedule.evening),
    ] {
        if times.len() > 2 {
            return error_response(&CalmaError::BadRequest(format!(
                "Too many {} activity times (maximum 2)",
                segment
            )));
        }
    }

    let schedule_bson = match bson::to_bson(&schedule) {
        Ok(b) => b,
        Err(e) => return error_response(&CalmaError::Internal(e.to_string())),
    };

    let collection = match state.users().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let update = doc! { "$set": {
        "schedule": schedule_bson,
        "metadata.updated_at": DateTime::now(),
    } };

    match collection.update_by_id(id, update).await {
        Ok(result) if result.matched_count == 0 => {
            error_response(&CalmaError::UserNotFound(raw_id.to_string()))
        }
        Ok(_) => json_response(StatusCode::OK, &schedule),
        Err(e) => error_response(&e),
    }
}

/// GET /users/{id}/notes
async fn handle_list_notes(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    raw_id: &str,
) -> Response<BoxBody> {
    let (id, _) = match authorize_self(&req, &state, raw_id) {
        Ok(pair) => pair,
        Err(e) => return error_response(&e),
    };

    match find_user(&state, id).await {
        Ok(user) => {
            let notes: Vec<NoteResponse> = user.notes.iter().map(NoteResponse::from_entry).collect();
            json_response(StatusCode::OK, &notes)
        }
        Err(e) => error_response(&e),
    }
}

/// POST /users/{id}/notes
async fn handle_create_note(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    raw_id: &str,
) -> Response<BoxBody> {
    let (id, _) = match authorize_self(&req, &state, raw_id) {
        Ok(pair) => pair,
        Err(e) => return error_response(&e),
    };

    let body: NoteRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    if body.title.is_empty() {
        return error_response(&CalmaError::BadRequest("Note title is required".into()));
    }

    let note = NoteEntry::new(body.title, body.content);
    let note_bson = match bson::to_bson(&note) {
        Ok(b) => b,
        Err(e) => return error_response(&CalmaError::Internal(e.to_string())),
    };

    let collection = match state.users().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let update = doc! {
        "$push": { "notes": note_bson },
        "$set": { "metadata.updated_at": DateTime::now() },
    };

    match collection.update_by_id(id, update).await {
        Ok(result) if result.matched_count == 0 => {
            error_response(&CalmaError::UserNotFound(raw_id.to_string()))
        }
        Ok(_) => json_response(StatusCode::CREATED, &NoteResponse::from_entry(&note)),
        Err(e) => error_response(&e),
    }
}

/// PUT /users/{id}/notes/{note_id}
async fn handle_update_note(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    raw_id: &str,
    note_id: &str,
) -> Response<BoxBody> {
    let (id, _) = match authorize_self(&req, &state, raw_id) {
        Ok(pair) => pair,
        Err(e) => return error_response(&e),
    };

    let body: NoteRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    let mut user = match find_user(&state, id).await {
        Ok(u) => u,
        Err(e) => return error_response(&e),
    };

    let Some(note) = user.notes.iter_mut().find(|n| n.id == note_id) else {
        return error_response(&CalmaError::NotFound("Note not found".into()));
    };

    note.title = body.title;
    note.content = body.content;
    note.updated_at = DateTime::now();
    let updated = note.clone();

    let notes_bson = match bson::to_bson(&user.notes) {
        Ok(b) => b,
        Err(e) => return error_response(&CalmaError::Internal(e.to_string())),
    };

    let collection = match state.users().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let update = doc! { "$set": {
        "notes": notes_bson,
        "metadata.updated_at": DateTime::now(),
    } };

    match collection.update_by_id(id, update).await {
        Ok(_) => json_response(StatusCode::OK, &NoteResponse::from_entry(&updated)),
        Err(e) => error_response(&e),
    }
}

/// DELETE /users/{id}/notes/{note_id}
async fn handle_delete_note(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    raw_id: &str,
    note_id: &str,
) -> Response<BoxBody> {
    let (id, _) = match authorize_self(&req, &state, raw_id) {
        Ok(pair) => pair,
        Err(e) => return error_response(&e),
    };

    let collection = match state.users().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let update = doc! {
        "$pull": { "notes": { "id": note_id } },
        "$set": { "metadata.updated_at": DateTime::now() },
    };

    match collection.update_by_id(id, update).await {
        Ok(result) if result.matched_count == 0 => {
            error_response(&CalmaError::UserNotFound(raw_id.to_string()))
        }
        Ok(result) if result.modified_count == 0 => {
            error_response(&CalmaError::NotFound("Note not found".into()))
        }
        Ok(_) => json_response(
            StatusCode::OK,
            &SuccessResponse {
                success: true,
                message: "Note deleted".into(),
            },
        ),
        Err(e) => error_response(&e),
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn find_user(state: &Arc<AppState>, id: ObjectId) -> Result<UserDoc, CalmaError> {
    let collection = state.users().await?;
    collection
        .find_by_id(id)
        .await?
        .ok_or_else(|| CalmaError::UserNotFound(id.to_hex()))
}

/// Authenticate and require that the path id is the caller's own id
fn authorize_self(
    req: &Request<hyper::body::Incoming>,
    state: &Arc<AppState>,
    raw_id: &str,
) -> Result<(ObjectId, crate::auth::Claims), CalmaError> {
    let claims = authenticate(req, state)?;
    let id = parse_user_id(raw_id)?;
    if caller_id(&claims)? != id {
        return Err(CalmaError::Forbidden(
            "Cannot modify another user's account".into(),
        ));
    }
    Ok((id, claims))
}

/// Escape regex metacharacters so search terms match literally
pub(crate) fn regex_escape(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if "\\.^$|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// =============================================================================
// Dispatch
// =============================================================================

pub async fn handle_users_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    let method = req.method();

    if !path.starts_with("/users") {
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

    // segments[0] == "users"
    let response = match (method.clone(), &segments[1..]) {
        (Method::GET, []) => handle_list_users(req, state).await,

        (Method::GET, [id]) => handle_get_user(req, state, id).await,
        (Method::PUT, [id]) => handle_update_user(req, state, id).await,
        (Method::DELETE, [id]) => handle_delete_user(req, state, id).await,

        (Method::POST, [id, sub]) if sub == "mood" => handle_record_mood(req, state, id).await,
        (Method::GET, [id, sub]) if sub == "mood" => handle_mood_history(req, state, id).await,

        (Method::PUT, [id, sub]) if sub == "schedule" => {
            handle_update_schedule(req, state, id).await
        }

        (Method::GET, [id, sub]) if sub == "notes" => handle_list_notes(req, state, id).await,
        (Method::POST, [id, sub]) if sub == "notes" => handle_create_note(req, state, id).await,
        (Method::PUT, [id, sub, note_id]) if sub == "notes" => {
            handle_update_note(req, state, id, note_id).await
        }
        (Method::DELETE, [id, sub, note_id]) if sub == "notes" => {
            handle_delete_note(req, state, id, note_id).await
        }

        _ => json_response(
            StatusCode::NOT_FOUND,
            &ErrorResponse {
                error: "User endpoint not found".into(),
                code: None,
            },
        ),
    };

    Some(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_response_hides_password_hash() {
        let user = UserDoc::new(
            "ana".into(),
            "ana@example.com".into(),
            "$argon2id$secret".into(),
            Some(30),
        );
        let response = UserResponse::from_doc(&user);
        let json = serde_json::to_string(&response).unwrap();

        assert!(!json.contains("argon2"));
        assert!(json.contains("\"username\":\"ana\""));
        assert!(json.contains("\"age\":30"));
    }

    #[test]
    fn test_regex_escape_neutralizes_metacharacters() {
        assert_eq!(regex_escape("a.b*"), "a\\.b\\*");
        assert_eq!(regex_escape("plain"), "plain");
    }
}
