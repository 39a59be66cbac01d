use crate::error::AppError;
use crate::monitor::client::MonitorApiClient;
use crate::monitor::types::{MonitorStatusSnapshot, StartMonitorArgs, DEFAULT_PUSH_URL};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct MonitorHandle {
    pub cancellation_token: CancellationToken,
    pub join_handle: JoinHandle<()>,
    pub api: Arc<MonitorApiClient>,
}

pub struct AppState {
    pub started_at: Instant,
    pub monitor: Mutex<Option<MonitorHandle>>,
    pub monitor_status: Arc<RwLock<MonitorStatusSnapshot>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        let monitor_status = MonitorStatusSnapshot::stopped(
            DEFAULT_PUSH_URL.to_string(),
            Some("monitor idle".to_string()),
        );

        Self {
            started_at: Instant::now(),
            monitor: Mutex::new(None),
            monitor_status: Arc::new(RwLock::new(monitor_status)),
        }
    }

    /// Client of the running monitor, or one built from the environment
    /// defaults when nothing is running.
    pub async fn api_client(&self) -> Result<Arc<MonitorApiClient>, AppError> {
        if let Some(handle) = self.monitor.lock().await.as_ref() {
            return Ok(Arc::clone(&handle.api));
        }

        let config = StartMonitorArgs::default().normalize()?;
        Ok(Arc::new(MonitorApiClient::new(
            config.api_base_url,
            config.push_url,
        )?))
    }

    /// Cancels the running monitor, if any, and waits for it to wind down.
    pub async fn stop_monitor(&self) -> bool {
        let existing_handle = {
            let mut monitor_slot = self.monitor.lock().await;
            monitor_slot.take()
        };

        let Some(handle) = existing_handle else {
            return false;
        };
        handle.cancellation_token.cancel();
        if let Err(error) = handle.join_handle.await {
            tracing::error!(%error, "monitor task ended abnormally");
        }
        true
    }
}
