use crate::commands::monitor::{current_status, is_running};
use crate::monitor::types::MonitorConnectionState;
use crate::state::AppState;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_ms: u128,
    pub monitor: MonitorConnectionState,
    pub monitor_running: bool,
}

pub async fn build_health_response(state: &AppState) -> HealthResponse {
    let status = current_status(state).await;

    HealthResponse {
        status: "ok",
        uptime_ms: state.started_at.elapsed().as_millis(),
        monitor: status.state,
        monitor_running: is_running(&status),
    }
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn health(
    state: tauri::State<'_, AppState>,
) -> Result<HealthResponse, crate::error::AppError> {
    Ok(build_health_response(&state).await)
}
