use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use tracing::info;
use uuid::Uuid;

use super::error::ApiError;
use super::types::*;
use super::AppState;
use crate::config::{GenerationConfig, GenerationParameters};
use crate::prompt::{
    render_prompt, ChatMessage, UserProfile, CHAT_SYSTEM_PROMPT, EMERGENCY_SYSTEM_PROMPT,
};

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/chat", post(chat))
        .route("/emergency_assessment", post(emergency_assessment))
        .with_state(state)
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (model_status, model_id) = match state.session.loaded_model_id() {
        Some(id) => ("loaded", id),
        None => ("not loaded", "None".to_string()),
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        model_status: model_status.to_string(),
        model_id,
    })
}

async fn chat(
    State(state): State<Arc<AppState>>,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ApiResponse>, ApiError> {
    let Json(request) = request?;

    info!(
        "/chat called. History: {} turns. Profile provided: {}",
        request.history.len(),
        request.user_profile.is_some()
    );

    let answer = generate_answer(
        &state,
        CHAT_SYSTEM_PROMPT,
        &request.prompt,
        &request.history,
        request.user_profile.as_ref(),
        request.parameters(),
    )
    .await?;

    Ok(Json(ApiResponse { answer }))
}

async fn emergency_assessment(
    State(state): State<Arc<AppState>>,
    request: Result<Json<EmergencyAssessmentRequest>, JsonRejection>,
) -> Result<Json<ApiResponse>, ApiError> {
    let Json(request) = request?;

    info!(
        "/emergency_assessment called. Profile provided: {}",
        request.user_profile.is_some()
    );

    let answer = generate_answer(
        &state,
        EMERGENCY_SYSTEM_PROMPT,
        &request.prompt,
        &[],
        request.user_profile.as_ref(),
        request.parameters(),
    )
    .await?;

    Ok(Json(ApiResponse { answer }))
}

/// Shared path of both endpoints: lazy load, render, generate.
async fn generate_answer(
    state: &AppState,
    system_prompt: &str,
    user_content: &str,
    history: &[ChatMessage],
    profile: Option<&UserProfile>,
    params: GenerationParameters,
) -> Result<String, ApiError> {
    let request_id = Uuid::new_v4();

    state
        .session
        .ensure_loaded(&state.load_options)
        .await
        .map_err(ApiError::ModelUnavailable)?;

    let prompt = render_prompt(system_prompt, profile, history, user_content);
    let config = GenerationConfig::new(params, &state.sampling);

    let output = state
        .session
        .generate(prompt, config)
        .await
        .map_err(ApiError::Generation)?;

    info!(
        "Request {} complete: {} prompt tokens{}, {} new tokens, {:.2} tokens/sec, {}ms",
        request_id,
        output.prompt_tokens,
        if output.truncated { " (truncated)" } else { "" },
        output.tokens.len(),
        output.tokens_per_second,
        output.total_time_ms
    );

    Ok(output.text)
}
