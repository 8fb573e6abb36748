//! REST API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use avr_core::{DeviceId, PowerState};
use avr_state::StateError;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::state::AppState;

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    code: u16,
    message: String,
}

impl ApiError {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Discovery could not run, e.g. no usable interface
    fn scan_failed(e: impl std::fmt::Display) -> Self {
        Self::new(503, format!("Scan failed: {}", e))
    }

    /// HTTP status for an error code; anything outside 400..=451 is a 500
    fn status(&self) -> StatusCode {
        if (400..=451).contains(&self.code) {
            StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<StateError> for ApiError {
    fn from(e: StateError) -> Self {
        Self::new(e.code().unwrap_or(0), e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

/// List all ready devices with their current status
pub async fn list_devices(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.cache.devices().await)
}

/// Get a specific device by ID
pub async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.cache.device(&DeviceId(id)).await?;
    Ok(Json(view))
}

/// Get a device's current status
pub async fn get_device_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state.cache.device_status(&DeviceId(id)).await?;
    Ok(Json(status))
}

/// Switch a device on or off
pub async fn set_power(
    State(state): State<Arc<AppState>>,
    Path((id, desired)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let desired: PowerState = desired
        .parse()
        .map_err(|e: String| ApiError::new(400, e))?;

    info!(device = %id, state = %desired, "Power command requested");
    state
        .gateway
        .set_power_state(&DeviceId(id), desired)
        .await?;

    Ok(Json(serde_json::json!({ "data": null, "result": "ok" })))
}

/// Remove a device from the directory
pub async fn remove_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    info!(device = %id, "Remove device requested");
    state.remove_device(&DeviceId(id.clone())).await?;

    Ok(Json(serde_json::json!({
        "status": "removed",
        "deviceId": id
    })))
}

/// Trigger a discovery scan
pub async fn trigger_scan(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    info!("Manual scan triggered");

    match state.scanner.scan_once().await {
        Ok(found) => Ok(Json(serde_json::json!({
            "status": "completed",
            "devicesFound": found.len()
        }))),
        Err(e) => Err(ApiError::scan_failed(e)),
    }
}

/// Get current configuration
pub async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.config.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use avr_core::DriverError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::new(404, "x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::new(451, "x").status().as_u16(), 451);
        assert_eq!(ApiError::new(503, "x").status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ApiError::new(0, "x").status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ApiError::new(399, "x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_state_error_codes() {
        let err = ApiError::from(StateError::NotFound(DeviceId::from("d1")));
        assert_eq!(err.code, 404);

        let err = ApiError::from(StateError::Driver {
            id: DeviceId::from("d1"),
            source: DriverError::Disconnected,
        });
        assert_eq!(err.code, 0);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_scan_failure_is_unavailable() {
        let err = ApiError::scan_failed("no broadcast interface");
        assert_eq!(err.code, 503);
        assert_eq!(err.message, "Scan failed: no broadcast interface");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
