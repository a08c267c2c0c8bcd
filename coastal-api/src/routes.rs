//! Route definitions for the Coastal API.
//!
//! Chatbot endpoints, conversation history management, the safety-evaluation
//! questionnaire, admin log queries, and health checks.

use crate::context::{ChatContext, TrafficClient, WeatherClient};
use crate::evaluation::{self, EvaluationData};
use crate::history::{ConversationMessage, HistoryStore};
use crate::interaction_log::{InteractionLog, SearchQuery};
use crate::pipeline::ChatPipeline;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use coastal_common::{CityConfig, Error};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

/// Traffic summary radius around the city center, in km.
const TRAFFIC_RADIUS_KM: f64 = 10.0;

/// Shared application state, constructed once per process.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ChatPipeline>,
    pub history: Arc<dyn HistoryStore>,
    pub interaction_log: Arc<InteractionLog>,
    pub weather: Option<Arc<WeatherClient>>,
    pub traffic: Option<Arc<TrafficClient>>,
    pub city: CityConfig,
    pub admin_password: String,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(err: Error) -> ApiError {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

// ============================================================================
// Chat
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ChatMessageRequest {
    pub message: Option<String>,
    /// Arbitrary front-end context; known fields are parsed, the rest is
    /// kept verbatim for logging.
    pub context: Option<Value>,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessageResponse {
    pub response: String,
    pub status: String,
    pub session_id: String,
    pub conversation_history: Vec<ConversationMessage>,
}

/// Extract the client IP: `X-Forwarded-For` (first entry), then
/// `X-Real-IP`, then "unknown".
fn client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        return real_ip.to_string();
    }
    "unknown".to_string()
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChatMessageRequest>,
) -> Result<Json<ChatMessageResponse>, ApiError> {
    let message = body
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| error_response(Error::InvalidInput("Message is required".into())))?;

    let session_id = body.session_id.unwrap_or_else(|| "default".into());
    let ip = client_ip(&headers);

    let mut context: ChatContext = body
        .context
        .as_ref()
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

    let is_system_message = context.is_system_generated
        || matches!(context.kind.as_deref(), Some("general_safety_info"));

    // Live conditions enrich the system prompt; failures just omit the block
    if let Some(weather) = &state.weather {
        match weather.forecast(state.city.lat, state.city.lng).await {
            Ok(report) => context.weather = Some(report),
            Err(e) => warn!(error = %e, "Weather context unavailable"),
        }
    }
    if let Some(traffic) = &state.traffic {
        match traffic
            .summary(state.city.lat, state.city.lng, TRAFFIC_RADIUS_KM)
            .await
        {
            Ok(summary) => context.traffic_summary = Some(summary),
            Err(e) => warn!(error = %e, "Traffic context unavailable"),
        }
    }

    let history = state
        .history
        .get_history(&session_id, true)
        .map_err(error_response)?;

    // System-seeded messages are stored flagged so they never feed back
    // into the conversation context
    let user_metadata = if is_system_message {
        let mut meta = body.context.clone().unwrap_or_else(|| json!({}));
        if let Some(obj) = meta.as_object_mut() {
            obj.insert("is_system_generated".into(), Value::Bool(true));
        }
        Some(meta)
    } else {
        body.context.clone()
    };
    state
        .history
        .append(&session_id, "user", &message, user_metadata)
        .map_err(error_response)?;

    let outcome = state
        .pipeline
        .respond(&message, Some(&context), &history)
        .await;
    let response = outcome.text().to_string();

    // Rejections carry fixed redirect text; only delivered responses are
    // recorded as assistant messages
    if !outcome.is_rejected() {
        state
            .history
            .append(
                &session_id,
                "assistant",
                &response,
                Some(json!({ "context": body.context.clone() })),
            )
            .map_err(error_response)?;
    }

    if let Err(e) = state.interaction_log.log_interaction(
        &ip,
        &message,
        &response,
        Some(&session_id),
        "message",
        Some(json!({ "context": body.context })),
    ) {
        warn!(error = %e, "Could not record interaction");
    }

    let conversation_history = state
        .history
        .get_history(&session_id, true)
        .map_err(error_response)?;

    Ok(Json(ChatMessageResponse {
        response,
        status: "success".into(),
        session_id,
        conversation_history,
    }))
}

// ============================================================================
// Safety evaluation
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SafetyEvaluationRequest {
    pub evaluation_data: Option<EvaluationPayload>,
    pub session_id: Option<String>,
}

/// Raw questionnaire payload. Answer keys arrive as JSON strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationPayload {
    pub zipcode: Option<String>,
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
    #[serde(default)]
    pub questions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SafetyEvaluationResponse {
    pub response: String,
    pub status: String,
    pub stats: Value,
    pub zipcode: String,
    pub session_id: String,
    pub evaluation_data: Value,
    pub conversation_history: Vec<ConversationMessage>,
}

async fn safety_evaluation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SafetyEvaluationRequest>,
) -> Result<Json<SafetyEvaluationResponse>, ApiError> {
    let payload = body
        .evaluation_data
        .ok_or_else(|| error_response(Error::InvalidInput("Evaluation data is required".into())))?;

    let zipcode = payload
        .zipcode
        .clone()
        .filter(|z| !z.trim().is_empty())
        .ok_or_else(|| error_response(Error::InvalidInput("Zipcode is required".into())))?;

    if payload.answers.is_empty() {
        return Err(error_response(Error::InvalidInput(
            "Questionnaire answers are required".into(),
        )));
    }

    // Normalize string keys to question numbers
    let answers: BTreeMap<usize, String> = payload
        .answers
        .iter()
        .filter_map(|(k, v)| k.parse::<usize>().ok().map(|k| (k, v.clone())))
        .collect();

    let data = EvaluationData {
        zipcode: zipcode.clone(),
        answers,
        questions: payload.questions.clone(),
    };

    let prompt = evaluation::generate_prompt(&data);
    let stats = evaluation::summary_stats(&data);
    let stats_json = serde_json::to_value(&stats)
        .map_err(|e| error_response(Error::Internal(e.to_string())))?;

    let session_id = body
        .session_id
        .unwrap_or_else(|| format!("safety_eval_{}", zipcode));
    let ip = client_ip(&headers);

    let context = ChatContext {
        kind: Some("safety_evaluation".into()),
        ..Default::default()
    };
    let context_meta = json!({
        "zipcode": zipcode.clone(),
        "type": "safety_evaluation",
        "stats": stats_json.clone(),
    });

    let history = state
        .history
        .get_history(&session_id, true)
        .map_err(error_response)?;

    let summary_line = format!(
        "Safety Evaluation Request for Zipcode {}: {}...",
        zipcode,
        coastal_common::util::truncate_with_marker(&prompt, 200, "")
    );
    state
        .history
        .append(&session_id, "user", &summary_line, Some(context_meta.clone()))
        .map_err(error_response)?;

    let outcome = state
        .pipeline
        .respond(&prompt, Some(&context), &history)
        .await;
    let response = outcome.text().to_string();

    if !outcome.is_rejected() {
        state
            .history
            .append(
                &session_id,
                "assistant",
                &response,
                Some(json!({ "context": context_meta, "type": "safety_evaluation" })),
            )
            .map_err(error_response)?;
    }

    if let Err(e) = state.interaction_log.log_interaction(
        &ip,
        &format!("Safety Evaluation Request for Zipcode {}", zipcode),
        &response,
        Some(&session_id),
        "safety_evaluation",
        Some(json!({ "zipcode": zipcode.clone(), "stats": stats_json.clone() })),
    ) {
        warn!(error = %e, "Could not record safety evaluation");
    }

    let conversation_history = state
        .history
        .get_history(&session_id, true)
        .map_err(error_response)?;

    Ok(Json(SafetyEvaluationResponse {
        response,
        status: "success".into(),
        stats: stats_json,
        zipcode,
        session_id,
        evaluation_data: serde_json::to_value(&payload)
            .map_err(|e| error_response(Error::Internal(e.to_string())))?,
        conversation_history,
    }))
}

// ============================================================================
// History management
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub status: String,
    pub session_id: String,
    pub conversation_history: Vec<ConversationMessage>,
}

async fn get_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let conversation_history = state
        .history
        .get_history(&session_id, true)
        .map_err(error_response)?;
    Ok(Json(HistoryResponse {
        status: "success".into(),
        session_id,
        conversation_history,
    }))
}

async fn clear_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .history
        .clear_session(&session_id)
        .map_err(error_response)?;
    Ok(Json(json!({
        "status": "success",
        "message": "Session cleared",
        "session_id": session_id,
    })))
}

async fn list_sessions(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let sessions = state.history.sessions().map_err(error_response)?;
    Ok(Json(json!({
        "status": "success",
        "sessions": sessions,
    })))
}

// ============================================================================
// Admin
// ============================================================================

fn check_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let provided = headers
        .get("x-admin-password")
        .and_then(|v| v.to_str().ok());
    if provided == Some(state.admin_password.as_str()) {
        Ok(())
    } else {
        Err(error_response(Error::Unauthorized("Unauthorized".into())))
    }
}

async fn admin_interactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>, ApiError> {
    check_admin(&state, &headers)?;
    let interactions = state.interaction_log.search(&query).map_err(error_response)?;
    Ok(Json(json!({
        "status": "success",
        "count": interactions.len(),
        "interactions": interactions,
    })))
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

async fn admin_ip_interactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(ip_address): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    check_admin(&state, &headers)?;
    let limit = query.limit.or(Some(100));
    let interactions = state
        .interaction_log
        .ip_interactions(&ip_address, limit)
        .map_err(error_response)?;
    let stats = state
        .interaction_log
        .ip_stats(&ip_address)
        .map_err(error_response)?;
    Ok(Json(json!({
        "status": "success",
        "ip_address": ip_address,
        "stats": stats,
        "interactions": interactions,
        "count": interactions.len(),
    })))
}

async fn admin_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    check_admin(&state, &headers)?;
    let all_stats = state.interaction_log.all_stats().map_err(error_response)?;

    let total_ips = all_stats.len();
    let total_interactions: usize = all_stats.values().map(|s| s.total_interactions).sum();

    let mut by_count: Vec<_> = all_stats.iter().collect();
    by_count.sort_by(|a, b| b.1.total_interactions.cmp(&a.1.total_interactions));
    let top_ips: Vec<Value> = by_count
        .iter()
        .take(10)
        .map(|(ip, stats)| json!({ "ip": ip, "stats": stats }))
        .collect();

    let avg = if total_ips > 0 {
        total_interactions as f64 / total_ips as f64
    } else {
        0.0
    };

    Ok(Json(json!({
        "status": "success",
        "summary": {
            "total_ips": total_ips,
            "total_interactions": total_interactions,
            "avg_interactions_per_ip": avg,
        },
        "all_ips": all_stats,
        "top_ips": top_ips,
    })))
}

// ============================================================================
// Health
// ============================================================================

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        service: "coastal-api".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// Build the complete router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/chatbot/health", get(health))
        .route("/api/chatbot/message", post(send_message))
        .route("/api/chatbot/safety-evaluation", post(safety_evaluation))
        .route(
            "/api/chatbot/history/:session_id",
            get(get_history).delete(clear_history),
        )
        .route("/api/chatbot/sessions", get(list_sessions))
        .route("/api/admin/interactions", get(admin_interactions))
        .route("/api/admin/interactions/:ip", get(admin_ip_interactions))
        .route("/api/admin/stats", get(admin_stats))
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "1.2.3.4, 5.6.7.8".parse().unwrap());
        headers.insert("x-real-ip", "9.9.9.9".parse().unwrap());
        assert_eq!(client_ip(&headers), "1.2.3.4");
    }

    #[test]
    fn client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "9.9.9.9".parse().unwrap());
        assert_eq!(client_ip(&headers), "9.9.9.9");
    }

    #[test]
    fn client_ip_defaults_to_unknown() {
        assert_eq!(client_ip(&HeaderMap::new()), "unknown");
    }
}
