use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::warn;

use heatbridge_common::HeatMode;

use crate::room::AccessoryCallbacks;
use crate::supervisor::Supervisor;
use crate::telemetry::Telemetry;
use crate::weather::WeatherService;

#[derive(Clone)]
pub struct ApiState {
    pub supervisor: Arc<Supervisor>,
    pub telemetry: Arc<Telemetry>,
    pub weather: Arc<WeatherService>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct WeatherBody {
    #[serde(rename = "outdoorTemp")]
    outdoor_temp: Option<f64>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/rooms/{room}", get(handle_get_room))
        .route("/api/rooms/{room}/target", post(handle_set_target))
        .route("/api/rooms/{room}/mode", post(handle_set_mode))
        .route("/api/weather", get(handle_get_weather))
        .route("/metrics", get(handle_get_metrics))
        .with_state(state)
}

async fn handle_get_status(State(state): State<ApiState>) -> impl IntoResponse {
    let mut statuses = Vec::with_capacity(state.supervisor.rooms().len());
    for room in state.supervisor.rooms() {
        statuses.push(room.status().await);
    }
    Json(statuses)
}

async fn handle_get_room(
    State(state): State<ApiState>,
    Path(room): Path<String>,
) -> axum::response::Response {
    match state.supervisor.controller(&room) {
        Some(controller) => Json(controller.status().await).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Unknown room"),
    }
}

async fn handle_set_target(
    State(state): State<ApiState>,
    Path(room): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> axum::response::Response {
    let Some(controller) = state.supervisor.controller(&room) else {
        return error_response(StatusCode::NOT_FOUND, "Unknown room");
    };
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Ok(target) = value.parse::<f64>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid temperature value");
    };

    if let Err(err) = controller.on_target_temperature_changed(target).await {
        warn!("failed to apply target update for {room}: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist target temperature",
        );
    }

    Json(controller.status().await).into_response()
}

async fn handle_set_mode(
    State(state): State<ApiState>,
    Path(room): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> axum::response::Response {
    let Some(controller) = state.supervisor.controller(&room) else {
        return error_response(StatusCode::NOT_FOUND, "Unknown room");
    };
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(mode) = HeatMode::parse(value) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid mode. Use 'HEAT' or 'OFF'");
    };

    if let Err(err) = controller.on_target_mode_changed(mode).await {
        warn!("failed to apply mode update for {room}: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist target mode",
        );
    }

    Json(controller.status().await).into_response()
}

async fn handle_get_weather(State(state): State<ApiState>) -> impl IntoResponse {
    Json(WeatherBody {
        outdoor_temp: state.weather.outdoor_temperature().await,
    })
}

async fn handle_get_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.telemetry.render().await,
    )
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
