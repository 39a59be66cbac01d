use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Terminal statuses are sinks; everything else may move freely.
    pub fn accepts(self, next: JobStatus) -> bool {
        !self.is_terminal() || next.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PositionDirection {
    Long,
    Short,
}

/// Liveness check shared by every heartbeat-carrying record.
pub fn heartbeat_is_stale(
    status: JobStatus,
    heartbeat_at: Option<i64>,
    stale_flag: bool,
    now_ms: i64,
    stale_after_ms: i64,
) -> bool {
    if status.is_terminal() {
        return false;
    }
    if stale_flag {
        return true;
    }
    heartbeat_at
        .map(|heartbeat| now_ms.saturating_sub(heartbeat) > stale_after_ms)
        .unwrap_or(false)
}

/// A record owned by a [`super::StreamReconciler`].
pub trait MonitoredRecord: Clone + Send + Sync + 'static {
    /// Fields a push message may carry for an existing record.
    type Patch;

    fn record_id(&self) -> &str;

    fn apply_patch(&mut self, patch: &Self::Patch);

    fn is_stale(&self, _now_ms: i64, _stale_after_ms: i64) -> bool {
        false
    }

    /// Reconciles a freshly polled record with the copy it replaces.
    fn carry_forward(&mut self, _previous: &Self) {}
}

/// Latest generation reported over the push channel for a discovery run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub generation: u32,
    pub best_fitness: f64,
    pub avg_fitness: f64,
    pub worst_fitness: f64,
    pub best_metrics: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub job_type: String,
    pub status: JobStatus,
    pub started_at: Option<i64>,
    pub heartbeat_at: Option<i64>,
    pub is_stale_flag: bool,
    /// Push-only; dropped by the next poll.
    pub progress: Option<JobProgress>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub heartbeat_at: Option<i64>,
    pub is_stale_flag: Option<bool>,
    pub progress: Option<JobProgress>,
}

impl MonitoredRecord for JobRecord {
    type Patch = JobPatch;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn apply_patch(&mut self, patch: &JobPatch) {
        if let Some(status) = patch.status {
            if self.status.accepts(status) {
                self.status = status;
            }
        }
        if let Some(heartbeat_at) = patch.heartbeat_at {
            self.heartbeat_at = Some(heartbeat_at);
        }
        if let Some(is_stale_flag) = patch.is_stale_flag {
            self.is_stale_flag = is_stale_flag;
        }
        if let Some(progress) = &patch.progress {
            self.progress = Some(progress.clone());
        }
    }

    fn is_stale(&self, now_ms: i64, stale_after_ms: i64) -> bool {
        heartbeat_is_stale(
            self.status,
            self.heartbeat_at,
            self.is_stale_flag,
            now_ms,
            stale_after_ms,
        )
    }

    fn carry_forward(&mut self, previous: &Self) {
        if !previous.status.accepts(self.status) {
            self.status = previous.status;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PositionRecord {
    pub symbol: String,
    pub direction: PositionDirection,
    pub entry_price: f64,
    pub quantity: f64,
    pub leverage: f64,
    pub unrealized_pnl: f64,
    /// Push-only; set when a `position_update` names this symbol.
    pub pushed_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionPatch {
    pub pushed_at: i64,
}

impl MonitoredRecord for PositionRecord {
    type Patch = PositionPatch;

    fn record_id(&self) -> &str {
        &self.symbol
    }

    fn apply_patch(&mut self, patch: &PositionPatch) {
        self.pushed_at = Some(patch.pushed_at);
    }
}

/// A paper-trading session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub status: JobStatus,
    pub started_at: Option<i64>,
    pub heartbeat_at: Option<i64>,
    pub is_stale_flag: bool,
    pub total_pnl: Option<f64>,
    pub equity: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionPatch {
    pub total_pnl: Option<f64>,
    pub equity: Option<f64>,
}

impl MonitoredRecord for SessionRecord {
    type Patch = SessionPatch;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn apply_patch(&mut self, patch: &SessionPatch) {
        if let Some(total_pnl) = patch.total_pnl {
            self.total_pnl = Some(total_pnl);
        }
        if let Some(equity) = patch.equity {
            self.equity = Some(equity);
        }
    }

    fn is_stale(&self, now_ms: i64, stale_after_ms: i64) -> bool {
        heartbeat_is_stale(
            self.status,
            self.heartbeat_at,
            self.is_stale_flag,
            now_ms,
            stale_after_ms,
        )
    }

    fn carry_forward(&mut self, previous: &Self) {
        if !previous.status.accepts(self.status) {
            self.status = previous.status;
        }
    }
}
