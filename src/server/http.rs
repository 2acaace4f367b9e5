//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling and a manual match
//! router over path prefixes.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::JwtValidator;
use crate::config::Args;
use crate::db::schemas::{
    ChatMessageDoc, ResourceDoc, UserDoc, CHAT_COLLECTION, RESOURCE_COLLECTION, USER_COLLECTION,
};
use crate::db::{MongoClient, MongoCollection};
use crate::routes;
use crate::routes::chat_ws::ChatHub;
use crate::types::CalmaError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub mongo: Option<MongoClient>,
    pub jwt: JwtValidator,
    /// Per-room broadcast hub for chat fan-out
    pub chat_hub: Arc<ChatHub>,
    /// Outbound client for the daily phrase proxy and diary analysis
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(args: Args, mongo: Option<MongoClient>, jwt: JwtValidator) -> Self {
        Self {
            args,
            mongo,
            jwt,
            chat_hub: Arc::new(ChatHub::new()),
            http: reqwest::Client::new(),
        }
    }

    fn mongo(&self) -> Result<&MongoClient, CalmaError> {
        self.mongo
            .as_ref()
            .ok_or_else(|| CalmaError::Database("Database not available".into()))
    }

    pub async fn users(&self) -> Result<MongoCollection<UserDoc>, CalmaError> {
        self.mongo()?.collection(USER_COLLECTION).await
    }

    pub async fn resources(&self) -> Result<MongoCollection<ResourceDoc>, CalmaError> {
        self.mongo()?.collection(RESOURCE_COLLECTION).await
    }

    pub async fn chat_messages(&self) -> Result<MongoCollection<ChatMessageDoc>, CalmaError> {
        self.mongo()?.collection(CHAT_COLLECTION).await
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), CalmaError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Calma listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - insecure JWT fallback in use");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .with_upgrades()
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("{} {}", method, path);

    // CORS preflight
    if method == Method::OPTIONS {
        return Ok(routes::helpers::cors_preflight());
    }

    // Probes and version info
    match (&method, path.as_str()) {
        (&Method::GET, "/health") | (&Method::GET, "/healthz") => {
            return Ok(to_boxed(routes::health_check(Arc::clone(&state)).await));
        }
        (&Method::GET, "/version") => {
            return Ok(to_boxed(routes::version_info()));
        }
        _ => {}
    }

    // Prefix dispatch; each module consumes the request when it matches
    if path.starts_with("/auth") {
        if let Some(response) = routes::handle_auth_request(req, Arc::clone(&state)).await {
            return Ok(response);
        }
        return Ok(to_boxed(not_found_response(&path)));
    }

    if path.starts_with("/users") {
        if let Some(response) = routes::handle_users_request(req, Arc::clone(&state)).await {
            return Ok(response);
        }
        return Ok(to_boxed(not_found_response(&path)));
    }

    if path.starts_with("/friends") {
        if let Some(response) = routes::handle_friends_request(req, Arc::clone(&state)).await {
            return Ok(response);
        }
        return Ok(to_boxed(not_found_response(&path)));
    }

    if path.starts_with("/resources") {
        if let Some(response) = routes::handle_resources_request(req, Arc::clone(&state)).await {
            return Ok(response);
        }
        return Ok(to_boxed(not_found_response(&path)));
    }

    if path.starts_with("/plan") {
        if let Some(response) = routes::handle_plan_request(req, Arc::clone(&state)).await {
            return Ok(response);
        }
        return Ok(to_boxed(not_found_response(&path)));
    }

    if path.starts_with("/chat") {
        if let Some(response) = routes::handle_chat_request(req, Arc::clone(&state)).await {
            return Ok(response);
        }
        return Ok(to_boxed(not_found_response(&path)));
    }

    if path.starts_with("/diary") {
        if let Some(response) = routes::handle_diary_request(req, Arc::clone(&state)).await {
            return Ok(response);
        }
        return Ok(to_boxed(not_found_response(&path)));
    }

    Ok(to_boxed(not_found_response(&path)))
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Not Found",
        "path": path,
    });

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}
