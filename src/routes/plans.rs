//! HTTP routes for daily plans
//!
//! - POST /plan/generate   - Build a fresh plan from today's mood
//! - POST /plan/rebalance  - Adjust the stored plan to a changed schedule
//! - GET  /plan/{user_id}  - Fetch the stored plan
//!
//! Generation always starts from scratch; rebalancing keeps what was
//! already assigned and only fills or trims the difference.

use bson::{doc, DateTime};
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::db::schemas::{record_mood, MoodEntry};
use crate::plan::{
    allocator, DailyPlan, MongoResourcePool, MoodState, PlanResource, RandomSampler,
};
use crate::routes::helpers::{
    authenticate, caller_id, cors_preflight, error_response, json_response, parse_json_body,
    parse_user_id, BoxBody, ErrorResponse,
};
use crate::server::AppState;
use crate::types::CalmaError;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    /// Today's mood; falls back to the latest recorded mood when absent
    #[serde(default)]
    pub mood: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    pub mood: MoodState,
    pub mood_label: &'static str,
    pub generated_at: String,
    pub morning: Vec<PlanResource>,
    pub afternoon: Vec<PlanResource>,
    pub evening: Vec<PlanResource>,
}

impl PlanResponse {
    fn from_plan(plan: &DailyPlan) -> Self {
        Self {
            mood: plan.mood,
            mood_label: plan.mood.label(),
            generated_at: plan.generated_at.to_chrono().to_rfc3339(),
            morning: plan.morning.clone(),
            afternoon: plan.afternoon.clone(),
            evening: plan.evening.clone(),
        }
    }
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /plan/generate
///
/// Resolves the mood (request body first, then the latest log entry) and
/// replaces the stored plan. Only an explicitly supplied mood is written
/// to the log; falling back to a recorded one leaves the log as it is.
async fn handle_generate(
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

    // An empty body is valid and means "use the recorded mood"
    let body: GenerateRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(_) => GenerateRequest::default(),
    };

    let collection = match state.users().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let mut user = match collection.find_by_id(id).await {
        Ok(Some(u)) => u,
        Ok(None) => return error_response(&CalmaError::UserNotFound(claims.user_id)),
        Err(e) => return error_response(&e),
    };

    let (mood, mood_logged) =
        match resolve_mood(body.mood.as_deref(), &mut user.mood_history, DateTime::now()) {
            Ok(pair) => pair,
            Err(e) => return error_response(&e),
        };

    let slots = user.schedule.slots();

    let resources = match state.resources().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };
    let pool = MongoResourcePool::new(resources);
    let mut sampler = RandomSampler::new();

    let plan = match allocator::generate(mood, &slots, &pool, &mut sampler).await {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };

    let history = mood_logged.then_some(user.mood_history.as_slice());
    if let Err(e) = persist_plan(&state, id, history, &plan).await {
        return error_response(&e);
    }

    info!(
        "Generated plan for {} (mood {}, {}/{}/{} resources)",
        claims.username,
        mood.label(),
        plan.morning.len(),
        plan.afternoon.len(),
        plan.evening.len(),
    );

    json_response(StatusCode::OK, &PlanResponse::from_plan(&plan))
}

/// POST /plan/rebalance
async fn handle_rebalance(
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

    let user = match collection.find_by_id(id).await {
        Ok(Some(u)) => u,
        Ok(None) => return error_response(&CalmaError::UserNotFound(claims.user_id)),
        Err(e) => return error_response(&e),
    };

    let Some(existing) = user.daily_plan else {
        return error_response(&CalmaError::NoPlanFound);
    };

    let slots = user.schedule.slots();

    let resources = match state.resources().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };
    let pool = MongoResourcePool::new(resources);
    let mut sampler = RandomSampler::new();

    let plan = match allocator::rebalance(&existing, &slots, &pool, &mut sampler).await {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };

    if let Err(e) = persist_plan(&state, id, None, &plan).await {
        return error_response(&e);
    }

    info!(
        "Rebalanced plan for {} ({}/{}/{} resources)",
        claims.username,
        plan.morning.len(),
        plan.afternoon.len(),
        plan.evening.len(),
    );

    json_response(StatusCode::OK, &PlanResponse::from_plan(&plan))
}

/// GET /plan/{user_id}
async fn handle_get_plan(
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

    let collection = match state.users().await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let user = match collection.find_by_id(id).await {
        Ok(Some(u)) => u,
        Ok(None) => return error_response(&CalmaError::UserNotFound(raw_id.to_string())),
        Err(e) => return error_response(&e),
    };

    match user.daily_plan {
        Some(plan) => json_response(StatusCode::OK, &PlanResponse::from_plan(&plan)),
        None => error_response(&CalmaError::NoPlanFound),
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Resolve the mood driving generation. A mood supplied in the request is
/// parsed and written to the log; with no mood supplied the latest log
/// entry is used as-is. Returns the mood and whether the log changed.
fn resolve_mood(
    supplied: Option<&str>,
    history: &mut Vec<MoodEntry>,
    now: DateTime,
) -> Result<(MoodState, bool), CalmaError> {
    match supplied {
        Some(raw) => {
            let mood = raw.parse::<MoodState>()?;
            record_mood(history, mood, now);
            Ok((mood, true))
        }
        None => history
            .last()
            .map(|entry| (entry.mood, false))
            .ok_or(CalmaError::NoMoodState),
    }
}

/// Write the plan, and the mood log when generation changed it, in one update
async fn persist_plan(
    state: &Arc<AppState>,
    id: bson::oid::ObjectId,
    mood_history: Option<&[MoodEntry]>,
    plan: &DailyPlan,
) -> Result<(), CalmaError> {
    let plan_bson = bson::to_bson(plan).map_err(|e| CalmaError::Internal(e.to_string()))?;

    let mut set = doc! {
        "daily_plan": plan_bson,
        "metadata.updated_at": DateTime::now(),
    };
    if let Some(history) = mood_history {
        let history_bson =
            bson::to_bson(history).map_err(|e| CalmaError::Internal(e.to_string()))?;
        set.insert("mood_history", history_bson);
    }

    let collection = state.users().await?;
    collection.update_by_id(id, doc! { "$set": set }).await?;

    Ok(())
}

// =============================================================================
// Dispatch
// =============================================================================

pub async fn handle_plan_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    let method = req.method();

    if !path.starts_with("/plan") {
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

    // segments[0] == "plan"
    let response = match (method.clone(), &segments[1..]) {
        (Method::POST, [action]) if action == "generate" => handle_generate(req, state).await,
        (Method::POST, [action]) if action == "rebalance" => handle_rebalance(req, state).await,
        (Method::GET, [user_id]) => handle_get_plan(req, state, user_id).await,

        _ => json_response(
            StatusCode::NOT_FOUND,
            &ErrorResponse {
                error: "Plan endpoint not found".into(),
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
    fn test_supplied_mood_is_logged() {
        let mut history = Vec::new();

        let (mood, logged) = resolve_mood(Some("bien"), &mut history, DateTime::now()).unwrap();

        assert_eq!(mood, MoodState::Good);
        assert!(logged);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].mood, MoodState::Good);
    }

    #[test]
    fn test_fallback_mood_leaves_log_untouched() {
        let yesterday =
            DateTime::from_millis(DateTime::now().timestamp_millis() - 24 * 60 * 60 * 1000);
        let mut history = vec![MoodEntry {
            mood: MoodState::Bad,
            recorded_at: yesterday,
        }];

        let (mood, logged) = resolve_mood(None, &mut history, DateTime::now()).unwrap();

        assert_eq!(mood, MoodState::Bad);
        assert!(!logged);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].recorded_at, yesterday);
    }

    #[test]
    fn test_empty_log_and_no_supplied_mood_fails() {
        let mut history = Vec::new();

        let err = resolve_mood(None, &mut history, DateTime::now()).unwrap_err();

        assert!(matches!(err, CalmaError::NoMoodState));
        assert!(history.is_empty());
    }

    #[test]
    fn test_unknown_supplied_mood_rejected() {
        let mut history = Vec::new();

        let err = resolve_mood(Some("feliz"), &mut history, DateTime::now()).unwrap_err();

        assert!(matches!(err, CalmaError::InvalidMoodState(_)));
        assert!(history.is_empty());
    }
}
