//! HTTP gateway server built on axum.

use crate::error::AttnError;
use crate::pipeline::AttentionPipeline;
use crate::types::{
    AttentionEnvelope, AttentionRequest, ComparisonRequest, ComparisonResponse,
    MaskPredictionRequest, MaskPredictionResponse, ModelsResponse, TokenizeRequest,
    TokenizeResponse,
};
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub pipeline: Arc<AttentionPipeline>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(pipeline: Arc<AttentionPipeline>) -> Self {
        Self {
            pipeline,
            started_at: Utc::now(),
        }
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    detail: String,
}

/// An [`AttnError`] rendered as a JSON error response.
#[derive(Debug)]
pub struct ApiError(pub AttnError);

impl From<AttnError> for ApiError {
    fn from(e: AttnError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            AttnError::Service(_) | AttnError::Http(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match &self.0 {
            AttnError::InvalidIndex { .. } => "invalid_index",
            AttnError::NoViableMask => "no_viable_mask",
            AttnError::InvalidRequest(_) => "invalid_request",
            AttnError::UnsupportedModel { .. } => "unsupported_model",
            AttnError::MalformedTensor(_) => "malformed_tensor",
            AttnError::Service(_) | AttnError::Http(_) => "model_service",
            _ => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self.0, status = status.as_u16(), "request failed");
        }
        let body = Json(ErrorBody {
            error: self.code(),
            detail: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(AttnError::invalid_request(rejection.body_text()))
    }
}

/// Header naming the word to mask in `/predict_masked`.
pub const TOKEN_TO_MASK_HEADER: &str = "x-token-to-mask";
/// Header carrying explicit masked text for `/predict_masked`.
pub const EXPLICIT_MASKED_TEXT_HEADER: &str = "x-explicit-masked-text";

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|v| !v.trim().is_empty())
}

/// Build the gateway router.
pub fn router(state: AppState) -> Router {
    let cors_allow_any = state.pipeline.config().gateway.cors_allow_any;
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/models", get(models_handler))
        .route("/tokenize", post(tokenize_handler))
        .route("/attention", post(attention_handler))
        .route("/attention_comparison", post(comparison_handler))
        .route("/predict_masked", post(predict_masked_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    if cors_allow_any {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let loaded = state.pipeline.cache().loaded_ids().await;
    Json(serde_json::json!({
        "status": "ok",
        "uptime_secs": state.uptime_secs(),
        "loaded_models": loaded,
    }))
}

async fn models_handler(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.pipeline.models(),
    })
}

async fn tokenize_handler(
    State(state): State<AppState>,
    payload: Result<Json<TokenizeRequest>, JsonRejection>,
) -> Result<Json<TokenizeResponse>, ApiError> {
    let Json(request) = payload?;
    let tokens = state
        .pipeline
        .tokenize(&request.text, &request.model_name)
        .await?;
    Ok(Json(TokenizeResponse { tokens }))
}

async fn attention_handler(
    State(state): State<AppState>,
    payload: Result<Json<AttentionRequest>, JsonRejection>,
) -> Result<Json<AttentionEnvelope>, ApiError> {
    let Json(request) = payload?;
    let attention_data = state
        .pipeline
        .attention(&request.text, &request.model_name, request.visualization_method)
        .await?;
    Ok(Json(AttentionEnvelope { attention_data }))
}

async fn comparison_handler(
    State(state): State<AppState>,
    payload: Result<Json<ComparisonRequest>, JsonRejection>,
) -> Result<Json<ComparisonResponse>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.pipeline.compare(&request).await?))
}

async fn predict_masked_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<MaskPredictionRequest>, JsonRejection>,
) -> Result<Json<MaskPredictionResponse>, ApiError> {
    let Json(mut request) = payload?;
    if request.word_to_mask.is_none() {
        request.word_to_mask = header_value(&headers, TOKEN_TO_MASK_HEADER);
    }
    if request.explicit_masked_text.is_none() {
        request.explicit_masked_text = header_value(&headers, EXPLICIT_MASKED_TEXT_HEADER);
    }
    Ok(Json(state.pipeline.predict_masked(&request).await?))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("could not install Ctrl-C handler; gateway will run until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

/// Serve the gateway on the configured address until Ctrl-C.
pub async fn run(pipeline: Arc<AttentionPipeline>) -> Result<(), std::io::Error> {
    let addr = pipeline.config().gateway.bind_addr();
    let app = router(AppState::new(pipeline));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "attnscope gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
