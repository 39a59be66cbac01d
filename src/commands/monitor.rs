use crate::monitor::types::{MonitorConnectionState, MonitorStatusSnapshot};
use crate::state::AppState;
#[cfg(feature = "desktop")]
use crate::{
    error::AppError,
    monitor::{
        client::MonitorApiClient,
        pipeline::run_monitor,
        types::{MonitorSession, MonitorStopResult, StartMonitorArgs},
    },
    state::MonitorHandle,
};
#[cfg(feature = "desktop")]
use std::sync::Arc;
#[cfg(feature = "desktop")]
use tokio_util::sync::CancellationToken;

/// Overwrites the published status after an explicit stop.
pub async fn mark_stopped(state: &AppState, reason: &str) {
    let push_url = state.monitor_status.read().await.push_url.clone();
    let mut writable = state.monitor_status.write().await;
    *writable = MonitorStatusSnapshot::stopped(push_url, Some(reason.to_string()));
}

pub async fn current_status(state: &AppState) -> MonitorStatusSnapshot {
    state.monitor_status.read().await.clone()
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn start_monitor(
    app: tauri::AppHandle,
    state: tauri::State<'_, AppState>,
    args: Option<StartMonitorArgs>,
) -> Result<MonitorSession, AppError> {
    use tauri::Manager;

    let config = args.unwrap_or_default().normalize()?;
    let window = app
        .get_webview_window("main")
        .ok_or_else(|| AppError::WindowNotFound("main".to_string()))?;

    state.stop_monitor().await;

    let api = Arc::new(MonitorApiClient::new(
        config.api_base_url.clone(),
        config.push_url.clone(),
    )?);
    let cancellation_token = CancellationToken::new();
    let join_handle = tokio::spawn(run_monitor(
        Arc::clone(&api),
        window,
        config.clone(),
        Arc::clone(&state.monitor_status),
        cancellation_token.clone(),
    ));

    {
        let mut monitor_slot = state.monitor.lock().await;
        *monitor_slot = Some(MonitorHandle {
            cancellation_token,
            join_handle,
            api,
        });
    }

    tracing::info!(
        api_base_url = %config.api_base_url,
        push_url = %config.push_url,
        "monitor started"
    );
    Ok(MonitorSession::from_config(&config))
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn stop_monitor(
    state: tauri::State<'_, AppState>,
) -> Result<MonitorStopResult, AppError> {
    let stopped = state.stop_monitor().await;
    mark_stopped(&state, "monitor stopped by command").await;
    Ok(MonitorStopResult { stopped })
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn monitor_status(
    state: tauri::State<'_, AppState>,
) -> Result<MonitorStatusSnapshot, AppError> {
    Ok(current_status(&state).await)
}

pub fn is_running(status: &MonitorStatusSnapshot) -> bool {
    status.state != MonitorConnectionState::Stopped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mark_stopped_keeps_push_url_and_sets_reason() {
        let state = AppState::new();
        {
            let mut writable = state.monitor_status.write().await;
            writable.state = MonitorConnectionState::Connected;
            writable.push_url = "ws://jobs.internal/ws".to_string();
            writable.stale_jobs = 3;
        }

        mark_stopped(&state, "monitor stopped by command").await;

        let status = current_status(&state).await;
        assert_eq!(status.state, MonitorConnectionState::Stopped);
        assert_eq!(status.push_url, "ws://jobs.internal/ws");
        assert_eq!(status.stale_jobs, 0);
        assert_eq!(status.reason.as_deref(), Some("monitor stopped by command"));
        assert!(!is_running(&status));
    }

    #[test]
    fn only_stopped_counts_as_not_running() {
        let mut status = MonitorStatusSnapshot::stopped("ws://jobs.internal/ws".to_string(), None);
        assert!(!is_running(&status));

        for state in [
            MonitorConnectionState::Connecting,
            MonitorConnectionState::Connected,
            MonitorConnectionState::Disconnected,
        ] {
            status.state = state;
            assert!(is_running(&status));
        }
    }
}
