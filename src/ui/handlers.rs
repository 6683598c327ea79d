//! HTTP API handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::control::StatusSnapshot;
use crate::ui::server::AppState;

/// API response wrapper
#[derive(Debug, serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Body of `POST /control`
#[derive(Debug, serde::Deserialize)]
pub struct ControlRequest {
    pub gain: f64,
}

/// Body of `GET /health`
#[derive(Debug, serde::Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
}

/// Clamp a requested gain into `[min, max]`. NaN falls back to `min`.
pub fn clamp_gain(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        return min;
    }
    value.clamp(min, max)
}

/// Get receiver status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<StatusSnapshot>> {
    Json(ApiResponse::ok(state.control.get_status()))
}

/// Set the makeup gain
pub async fn set_control(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ControlRequest>, JsonRejection>,
) -> (StatusCode, Json<ApiResponse<StatusSnapshot>>) {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            tracing::debug!("Rejected control request: {}", rejection.body_text());
            return (
                rejection.status(),
                Json(ApiResponse::error(rejection.body_text())),
            );
        }
    };

    let gain = clamp_gain(req.gain, state.min_gain, state.max_gain);
    if gain != req.gain {
        tracing::debug!("Requested gain {} clamped to {}", req.gain, gain);
    }
    state.control.set_gain(gain);
    tracing::info!("Gain set to {:.3}", gain);
    (StatusCode::OK, Json(ApiResponse::ok(state.control.get_status())))
}

pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
