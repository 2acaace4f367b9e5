//! Diary analysis route
//!
//! - POST /diary/analyze - Run a free-text diary entry through the
//!   analysis model and return its structured reading
//!
//! The entry is forwarded to an OpenRouter-style chat-completions
//! endpoint with a prompt that asks for a JSON reply (detected emotional
//! state, an empathetic response and a suggested activity, in Spanish).
//! Diary text is never stored; the reply goes straight back to the client.

use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use crate::routes::helpers::{
    authenticate, cors_preflight, error_response, json_response, parse_json_body, BoxBody,
    ErrorResponse,
};
use crate::server::AppState;
use crate::types::CalmaError;

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub text: String,
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /diary/analyze
async fn handle_analyze(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    if let Err(e) = authenticate(&req, &state) {
        return error_response(&e);
    }

    let body: AnalyzeRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    if body.text.trim().is_empty() {
        return error_response(&CalmaError::BadRequest(
            "Missing required field: text".into(),
        ));
    }

    let Some(api_key) = state.args.openrouter_api_key.as_deref() else {
        return json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &ErrorResponse {
                error: "Diary analysis is not configured".into(),
                code: None,
            },
        );
    };

    let payload = completion_request(&state.args.analysis_model, &body.text);

    let result = state
        .http
        .post(&state.args.analysis_url)
        .bearer_auth(api_key)
        .json(&payload)
        .send()
        .await;

    let response = match result {
        Ok(r) => r,
        Err(e) => {
            warn!("Analysis upstream unreachable: {}", e);
            return json_response(
                StatusCode::BAD_GATEWAY,
                &ErrorResponse {
                    error: "Analysis service unavailable".into(),
                    code: None,
                },
            );
        }
    };

    let completion = match response.json::<serde_json::Value>().await {
        Ok(v) => v,
        Err(e) => {
            warn!("Analysis upstream returned invalid JSON: {}", e);
            return json_response(
                StatusCode::BAD_GATEWAY,
                &ErrorResponse {
                    error: "Analysis service returned an invalid response".into(),
                    code: None,
                },
            );
        }
    };

    match extract_analysis(&completion) {
        Some(analysis) => json_response(StatusCode::OK, &analysis),
        None => json_response(
            StatusCode::BAD_GATEWAY,
            &ErrorResponse {
                error: "Analysis service returned an invalid response".into(),
                code: None,
            },
        ),
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Build the instruction the model answers with its JSON reading
fn analysis_prompt(text: &str) -> String {
    format!(
        "Eres un asistente empático que analiza entradas de un diario personal. \
         Tu tarea es: \
         1. Detectar el estado emocional general (ej. estresado, feliz, triste, \
         ansioso, tranquilo, motivado). \
         2. Validar lo que siente con una frase empática. \
         3. Sugerir una actividad que pueda ayudar a mejorar o reforzar su estado \
         emocional. \
         Responde en español, solo con JSON en este formato: \
         {{ \"estado\": \"...\", \"respuesta\": \"...\", \"actividad\": \"...\" }} \
         Texto del usuario: \"{}\"",
        text
    )
}

/// The chat-completions request body for one diary entry
fn completion_request(model: &str, text: &str) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": [
            { "role": "user", "content": analysis_prompt(text) }
        ],
        "temperature": 0.7,
    })
}

/// Pull the model's reply out of a chat-completions response.
/// A reply that isn't the requested JSON object is passed through raw
/// rather than dropped; models ignore format instructions often enough.
fn extract_analysis(completion: &serde_json::Value) -> Option<serde_json::Value> {
    let content = completion
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()?;

    match serde_json::from_str::<serde_json::Value>(content.trim()) {
        Ok(parsed) if parsed.is_object() => Some(parsed),
        _ => Some(serde_json::json!({ "raw": content })),
    }
}

// =============================================================================
// Dispatch
// =============================================================================

pub async fn handle_diary_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    let method = req.method();

    if !path.starts_with("/diary") {
        return None;
    }

    if method == Method::OPTIONS {
        return Some(cors_preflight());
    }

    let path = path.split('?').next().unwrap_or(path).to_string();

    let response = match (method.clone(), path.as_str()) {
        (Method::POST, "/diary/analyze") => handle_analyze(req, state).await,

        (_, "/diary/analyze") => json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            &ErrorResponse {
                error: "Method not allowed".into(),
                code: None,
            },
        ),

        _ => json_response(
            StatusCode::NOT_FOUND,
            &ErrorResponse {
                error: "Diary endpoint not found".into(),
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
    fn test_completion_request_shape() {
        let payload = completion_request("meta-llama/llama-3.3-70b-instruct:free", "hoy fue un buen día");

        assert_eq!(
            payload["model"],
            "meta-llama/llama-3.3-70b-instruct:free"
        );
        let prompt = payload["messages"][0]["content"].as_str().unwrap();
        assert!(prompt.contains("hoy fue un buen día"));
        assert!(prompt.contains("\"estado\""));
    }

    #[test]
    fn test_extract_analysis_parses_model_json() {
        let completion = serde_json::json!({
            "choices": [{
                "message": {
                    "content": r#"{ "estado": "tranquilo", "respuesta": "Me alegra.", "actividad": "Sal a caminar." }"#
                }
            }]
        });

        let analysis = extract_analysis(&completion).unwrap();
        assert_eq!(analysis["estado"], "tranquilo");
        assert_eq!(analysis["actividad"], "Sal a caminar.");
    }

    #[test]
    fn test_extract_analysis_passes_raw_reply_through() {
        let completion = serde_json::json!({
            "choices": [{
                "message": { "content": "Lo siento, no puedo responder en JSON." }
            }]
        });

        let analysis = extract_analysis(&completion).unwrap();
        assert_eq!(analysis["raw"], "Lo siento, no puedo responder en JSON.");
    }

    #[test]
    fn test_extract_analysis_rejects_malformed_completion() {
        let completion = serde_json::json!({ "error": "rate limited" });
        assert!(extract_analysis(&completion).is_none());
    }
}
