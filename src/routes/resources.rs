//! HTTP routes for content resources
//!
//! - POST   /resources                      - Create a resource
//! - GET    /resources                      - List all resources
//! - GET    /resources/{id}                 - Get a resource
//! - PUT    /resources/{id}                 - Update a resource
//! - DELETE /resources/{id}                 - Soft-delete a resource
//! - GET    /resources/category/{category}  - Resources in one category
//!
//! The category path segment accepts the Spanish display label
//! (URL-encoded) or an accent-free slug such as `meditacion`.

use bson::{doc, oid::ObjectId, DateTime};
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::db::schemas::ResourceDoc;
use crate::plan::Category;
use crate::routes::helpers::{
    authenticate, cors_preflight, error_response, json_response, parse_json_body, BoxBody,
    ErrorResponse, SuccessResponse,
};
use crate::server::AppState;
use crate::types::CalmaError;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequest {
    pub category: String,
    pub title: String,
    pub author: String,
    pub duration_minutes: i64,
    #[serde(default)]
    pub description: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceResponse {
    pub id: String,
    pub category: Category,
    pub title: String,
    pub author: String,
    pub duration_minutes: i64,
    pub description: String,
    pub content: String,
}

impl ResourceResponse {
    fn from_doc(doc: &ResourceDoc) -> Option<Self> {
        Some(Self {
            id: doc._id?.to_hex(),
            category: doc.category?,
            title: doc.title.clone(),
            author: doc.author.clone(),
            duration_minutes: doc.duration_minutes,
            description: doc.description.clone(),
            content: doc.content.clone(),
        })
    }
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /resources
async fn handle_create(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    if let Err(e) = authenticate(&req, &state) {
        return error_response(&e);
    }

    let body: ResourceRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    let category: Category = match body.category.parse() {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    if body.title.is_empty() || body.content.is_empty() {
        return error_response(&CalmaError::BadRequest(
            "Missing required fields: title, content".into(),
        ));
    }

    if body.duration_minutes <= 0 {
        return error_response(&CalmaError::BadRequest(
            "Duration must be a positive number of minutes".into(),
        ));
    }

    let mut resource = ResourceDoc::new(
        category,
        body.title,
        body.author,
        body.duration_minutes,
        body.description,
        body.content,
    );

    let collection = match state.resources().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    match collection.insert_one(resource.clone()).await {
        Ok(id) => {
            resource._id = Some(id);
            info!("Created resource {} ({})", id.to_hex(), category.label());
            match ResourceResponse::from_doc(&resource) {
                Some(r) => json_response(StatusCode::CREATED, &r),
                None => error_response(&CalmaError::Internal("Resource missing id".into())),
            }
        }
        Err(e) => error_response(&e),
    }
}

/// GET /resources
async fn handle_list(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    if let Err(e) = authenticate(&req, &state) {
        return error_response(&e);
    }

    let collection = match state.resources().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    match collection.find_many(doc! {}).await {
        Ok(docs) => {
            let list: Vec<ResourceResponse> =
                docs.iter().filter_map(ResourceResponse::from_doc).collect();
            json_response(StatusCode::OK, &list)
        }
        Err(e) => error_response(&e),
    }
}

/// GET /resources/{id}
async fn handle_get(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    raw_id: &str,
) -> Response<BoxBody> {
    if let Err(e) = authenticate(&req, &state) {
        return error_response(&e);
    }

    let id = match ObjectId::parse_str(raw_id) {
        Ok(id) => id,
        Err(_) => return error_response(&CalmaError::NotFound("Resource not found".into())),
    };

    let collection = match state.resources().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    match collection.find_by_id(id).await {
        Ok(Some(doc)) => match ResourceResponse::from_doc(&doc) {
            Some(r) => json_response(StatusCode::OK, &r),
            None => error_response(&CalmaError::Internal("Malformed resource document".into())),
        },
        Ok(None) => error_response(&CalmaError::NotFound("Resource not found".into())),
        Err(e) => error_response(&e),
    }
}

/// PUT /resources/{id}
async fn handle_update(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    raw_id: &str,
) -> Response<BoxBody> {
    if let Err(e) = authenticate(&req, &state) {
        return error_response(&e);
    }

    let id = match ObjectId::parse_str(raw_id) {
        Ok(id) => id,
        Err(_) => return error_response(&CalmaError::NotFound("Resource not found".into())),
    };

    let body: ResourceRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    let category: Category = match body.category.parse() {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    if body.duration_minutes <= 0 {
        return error_response(&CalmaError::BadRequest(
            "Duration must be a positive number of minutes".into(),
        ));
    }

    let collection = match state.resources().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let update = doc! { "$set": {
        "category": category.label(),
        "title": &body.title,
        "author": &body.author,
        "duration_minutes": body.duration_minutes,
        "description": &body.description,
        "content": &body.content,
        "metadata.updated_at": DateTime::now(),
    } };

    match collection.update_by_id(id, update).await {
        Ok(result) if result.matched_count == 0 => {
            error_response(&CalmaError::NotFound("Resource not found".into()))
        }
        Ok(_) => json_response(
            StatusCode::OK,
            &ResourceResponse {
                id: id.to_hex(),
                category,
                title: body.title,
                author: body.author,
                duration_minutes: body.duration_minutes,
                description: body.description,
                content: body.content,
            },
        ),
        Err(e) => error_response(&e),
    }
}

/// DELETE /resources/{id}
async fn handle_delete(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    raw_id: &str,
) -> Response<BoxBody> {
    if let Err(e) = authenticate(&req, &state) {
        return error_response(&e);
    }

    let id = match ObjectId::parse_str(raw_id) {
        Ok(id) => id,
        Err(_) => return error_response(&CalmaError::NotFound("Resource not found".into())),
    };

    let collection = match state.resources().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    match collection.soft_delete(id).await {
        Ok(result) if result.matched_count == 0 => {
            error_response(&CalmaError::NotFound("Resource not found".into()))
        }
        Ok(_) => json_response(
            StatusCode::OK,
            &SuccessResponse {
                success: true,
                message: "Resource deleted".into(),
            },
        ),
        Err(e) => error_response(&e),
    }
}

/// GET /resources/category/{category}
async fn handle_by_category(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    raw_category: &str,
) -> Response<BoxBody> {
    if let Err(e) = authenticate(&req, &state) {
        return error_response(&e);
    }

    let decoded = match urlencoding::decode(raw_category) {
        Ok(d) => d.into_owned(),
        Err(_) => raw_category.to_string(),
    };

    let category: Category = match decoded.parse() {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let collection = match state.resources().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    match collection.find_many(doc! { "category": category.label() }).await {
        Ok(docs) => {
            let list: Vec<ResourceResponse> =
                docs.iter().filter_map(ResourceResponse::from_doc).collect();
            json_response(StatusCode::OK, &list)
        }
        Err(e) => error_response(&e),
    }
}

// =============================================================================
// Dispatch
// =============================================================================

pub async fn handle_resources_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    let method = req.method();

    if !path.starts_with("/resources") {
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

    // segments[0] == "resources"
    let response = match (method.clone(), &segments[1..]) {
        (Method::POST, []) => handle_create(req, state).await,
        (Method::GET, []) => handle_list(req, state).await,

        (Method::GET, [sub, category]) if sub == "category" => {
            handle_by_category(req, state, category).await
        }

        (Method::GET, [id]) => handle_get(req, state, id).await,
        (Method::PUT, [id]) => handle_update(req, state, id).await,
        (Method::DELETE, [id]) => handle_delete(req, state, id).await,

        _ => json_response(
            StatusCode::NOT_FOUND,
            &ErrorResponse {
                error: "Resource endpoint not found".into(),
                code: None,
            },
        ),
    };

    Some(response)
}
