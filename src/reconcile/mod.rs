pub mod progress;
pub mod records;

use crate::error::AppError;
use records::MonitoredRecord;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Jobs,
    DiscoveryRuns,
    Positions,
    Sessions,
}

impl CollectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jobs => "jobs",
            Self::DiscoveryRuns => "discovery_runs",
            Self::Positions => "positions",
            Self::Sessions => "sessions",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Connecting,
    Connected,
    Disconnected,
}

/// Edge detector for remediation. Only the staleness predicate moves it.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RemediationGuard {
    #[default]
    Armed,
    Triggered,
}

impl RemediationGuard {
    fn advance(&mut self, any_stale: bool) -> RemediationDirective {
        match (*self, any_stale) {
            (Self::Armed, true) => {
                *self = Self::Triggered;
                RemediationDirective::Fire
            }
            (Self::Triggered, false) => {
                *self = Self::Armed;
                RemediationDirective::Hold
            }
            _ => RemediationDirective::Hold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemediationDirective {
    Fire,
    Hold,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub stale_count: usize,
    pub remediation: RemediationDirective,
}

impl ReconcileOutcome {
    pub fn should_remediate(&self) -> bool {
        self.remediation == RemediationDirective::Fire
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSnapshot<R> {
    pub collection: CollectionKind,
    pub channel: ChannelState,
    pub records: Vec<R>,
    pub stale_ids: Vec<String>,
    pub last_poll_at: Option<i64>,
    pub last_poll_error: Option<String>,
    pub last_remediation_error: Option<String>,
    pub revision: u64,
}

/// Canonical state for one monitored collection.
///
/// Pushes patch existing records in place; polls replace the collection
/// wholesale. Every mutation re-evaluates staleness and advances the
/// remediation guard, so callers only act on the returned directive.
#[derive(Debug, Clone)]
pub struct StreamReconciler<R: MonitoredRecord> {
    collection: CollectionKind,
    records: Vec<R>,
    channel: ChannelState,
    guard: RemediationGuard,
    stale_after_ms: i64,
    last_poll_at: Option<i64>,
    last_poll_error: Option<String>,
    last_remediation_error: Option<String>,
    revision: u64,
}

impl<R: MonitoredRecord> StreamReconciler<R> {
    pub fn new(collection: CollectionKind, stale_after_ms: i64) -> Self {
        Self {
            collection,
            records: Vec::new(),
            channel: ChannelState::Connecting,
            guard: RemediationGuard::default(),
            stale_after_ms,
            last_poll_at: None,
            last_poll_error: None,
            last_remediation_error: None,
            revision: 0,
        }
    }

    pub fn collection(&self) -> CollectionKind {
        self.collection
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&R> {
        self.records.iter().find(|record| record.record_id() == id)
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel
    }

    pub fn guard(&self) -> RemediationGuard {
        self.guard
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn last_poll_at(&self) -> Option<i64> {
        self.last_poll_at
    }

    pub fn last_poll_error(&self) -> Option<&str> {
        self.last_poll_error.as_deref()
    }

    /// Returns whether the state actually changed.
    pub fn set_channel_state(&mut self, state: ChannelState) -> bool {
        if self.channel == state {
            return false;
        }
        self.channel = state;
        self.revision = self.revision.wrapping_add(1);
        true
    }

    /// Merges `patch` into the record with `id`. Unknown ids are ignored and
    /// yield `None`; pushes never add records.
    pub fn apply_push(
        &mut self,
        id: &str,
        patch: &R::Patch,
        now_ms: i64,
    ) -> Option<ReconcileOutcome> {
        let record = self
            .records
            .iter_mut()
            .find(|record| record.record_id() == id)?;
        record.apply_patch(patch);
        self.revision = self.revision.wrapping_add(1);
        Some(self.evaluate(now_ms))
    }

    /// Applies one poll result. A successful poll replaces the collection; a
    /// failed one keeps the last known records on display.
    pub fn apply_poll(
        &mut self,
        result: Result<Vec<R>, AppError>,
        now_ms: i64,
    ) -> ReconcileOutcome {
        match result {
            Ok(mut polled) => {
                for record in polled.iter_mut() {
                    if let Some(previous) = self
                        .records
                        .iter()
                        .find(|previous| previous.record_id() == record.record_id())
                    {
                        record.carry_forward(previous);
                    }
                }
                self.records = polled;
                self.last_poll_at = Some(now_ms);
                self.last_poll_error = None;
            }
            Err(error) => {
                tracing::warn!(
                    collection = self.collection.as_str(),
                    %error,
                    "poll failed; keeping last known records"
                );
                self.last_poll_error = Some(error.to_string());
            }
        }
        self.revision = self.revision.wrapping_add(1);
        self.evaluate(now_ms)
    }

    /// Re-runs the staleness predicate against `now_ms`.
    pub fn evaluate(&mut self, now_ms: i64) -> ReconcileOutcome {
        let stale_count = self
            .records
            .iter()
            .filter(|record| record.is_stale(now_ms, self.stale_after_ms))
            .count();
        let remediation = self.guard.advance(stale_count > 0);
        if remediation == RemediationDirective::Fire {
            tracing::info!(
                collection = self.collection.as_str(),
                stale_count,
                "stale records detected; requesting cleanup"
            );
        }
        ReconcileOutcome {
            stale_count,
            remediation,
        }
    }

    /// Records a failed remediation call for display. The guard is left alone.
    pub fn record_remediation_failure(&mut self, error: &AppError) {
        tracing::error!(
            collection = self.collection.as_str(),
            %error,
            "stale cleanup failed"
        );
        self.last_remediation_error = Some(error.to_string());
        self.revision = self.revision.wrapping_add(1);
    }

    pub fn record_remediation_success(&mut self) {
        if self.last_remediation_error.take().is_some() {
            self.revision = self.revision.wrapping_add(1);
        }
    }

    pub fn stale_ids(&self, now_ms: i64) -> Vec<String> {
        self.records
            .iter()
            .filter(|record| record.is_stale(now_ms, self.stale_after_ms))
            .map(|record| record.record_id().to_string())
            .collect()
    }

    pub fn snapshot(&self, now_ms: i64) -> CollectionSnapshot<R> {
        CollectionSnapshot {
            collection: self.collection,
            channel: self.channel,
            records: self.records.clone(),
            stale_ids: self.stale_ids(now_ms),
            last_poll_at: self.last_poll_at,
            last_poll_error: self.last_poll_error.clone(),
            last_remediation_error: self.last_remediation_error.clone(),
            revision: self.revision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::records::{JobPatch, JobProgress, JobRecord, JobStatus};
    use super::*;

    const STALE_AFTER_MS: i64 = 60_000;

    fn job(id: &str, status: JobStatus, heartbeat_at: Option<i64>) -> JobRecord {
        JobRecord {
            id: id.to_string(),
            job_type: "discovery".to_string(),
            status,
            started_at: Some(0),
            heartbeat_at,
            is_stale_flag: false,
            progress: None,
        }
    }

    fn reconciler() -> StreamReconciler<JobRecord> {
        StreamReconciler::new(CollectionKind::Jobs, STALE_AFTER_MS)
    }

    fn progress(generation: u32) -> JobProgress {
        JobProgress {
            generation,
            best_fitness: 1.5,
            avg_fitness: 1.0,
            worst_fitness: 0.2,
            best_metrics: None,
        }
    }

    #[test]
    fn poll_replaces_membership() {
        let mut state = reconciler();
        state.apply_poll(
            Ok(vec![
                job("a", JobStatus::Running, Some(0)),
                job("b", JobStatus::Queued, None),
            ]),
            1_000,
        );
        state.apply_poll(Ok(vec![job("c", JobStatus::Running, Some(1_000))]), 2_000);

        let ids: Vec<&str> = state.records().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c"]);
    }

    #[test]
    fn push_never_creates_records() {
        let mut state = reconciler();
        state.apply_poll(Ok(vec![job("a", JobStatus::Running, Some(0))]), 0);

        let outcome = state.apply_push(
            "ghost",
            &JobPatch {
                progress: Some(progress(3)),
                ..Default::default()
            },
            10,
        );

        assert!(outcome.is_none());
        assert_eq!(state.records().len(), 1);
    }

    #[test]
    fn push_fields_survive_until_next_poll() {
        let mut state = reconciler();
        state.apply_poll(Ok(vec![job("a", JobStatus::Running, Some(0))]), 0);
        state.apply_push(
            "a",
            &JobPatch {
                progress: Some(progress(7)),
                ..Default::default()
            },
            10,
        );
        assert_eq!(
            state.get("a").and_then(|r| r.progress.as_ref()).map(|p| p.generation),
            Some(7)
        );

        state.apply_poll(Ok(vec![job("a", JobStatus::Running, Some(20))]), 20);
        assert!(state.get("a").and_then(|r| r.progress.as_ref()).is_none());
    }

    #[test]
    fn failed_poll_keeps_last_known_records() {
        let mut state = reconciler();
        state.apply_poll(Ok(vec![job("a", JobStatus::Running, Some(0))]), 0);
        state.apply_poll(
            Err(AppError::InvalidArgument("connection refused".to_string())),
            5_000,
        );

        assert_eq!(state.records().len(), 1);
        assert!(state.last_poll_error().is_some());

        state.apply_poll(Ok(vec![job("a", JobStatus::Running, Some(6_000))]), 6_000);
        assert!(state.last_poll_error().is_none());
    }

    #[test]
    fn poll_cannot_revive_terminal_record() {
        let mut state = reconciler();
        state.apply_poll(Ok(vec![job("a", JobStatus::Running, Some(0))]), 0);
        state.apply_push(
            "a",
            &JobPatch {
                status: Some(JobStatus::Cancelled),
                ..Default::default()
            },
            100,
        );
        state.apply_poll(Ok(vec![job("a", JobStatus::Running, Some(0))]), 200);

        assert_eq!(state.get("a").map(|r| r.status), Some(JobStatus::Cancelled));
    }

    #[test]
    fn remediation_fires_once_per_stale_episode() {
        let mut state = reconciler();
        let stale_job = job("a", JobStatus::Running, Some(0));

        let first = state.apply_poll(Ok(vec![stale_job.clone()]), 61_000);
        assert_eq!(first.stale_count, 1);
        assert!(first.should_remediate());
        assert_eq!(state.guard(), RemediationGuard::Triggered);

        for tick in 1..5 {
            let repeat = state.apply_poll(Ok(vec![stale_job.clone()]), 61_000 + tick * 1_000);
            assert!(!repeat.should_remediate());
        }

        let recovered = state.apply_poll(
            Ok(vec![job("a", JobStatus::Running, Some(70_000))]),
            70_000,
        );
        assert_eq!(recovered.stale_count, 0);
        assert!(!recovered.should_remediate());
        assert_eq!(state.guard(), RemediationGuard::Armed);

        let relapse = state.evaluate(200_000);
        assert!(relapse.should_remediate());
    }

    #[test]
    fn remediation_failure_leaves_guard_untouched() {
        let mut state = reconciler();
        let outcome = state.apply_poll(Ok(vec![job("a", JobStatus::Running, Some(0))]), 90_000);
        assert!(outcome.should_remediate());

        state.record_remediation_failure(&AppError::Remediation {
            collection: "jobs".to_string(),
            reason: "timeout".to_string(),
        });
        assert_eq!(state.guard(), RemediationGuard::Triggered);
        assert!(!state.evaluate(91_000).should_remediate());
        assert!(state.snapshot(91_000).last_remediation_error.is_some());
    }

    #[test]
    fn push_heartbeat_can_clear_staleness() {
        let mut state = reconciler();
        state.apply_poll(Ok(vec![job("a", JobStatus::Running, Some(0))]), 61_000);
        assert_eq!(state.guard(), RemediationGuard::Triggered);

        let outcome = state
            .apply_push(
                "a",
                &JobPatch {
                    heartbeat_at: Some(61_500),
                    ..Default::default()
                },
                62_000,
            )
            .expect("record exists");
        assert_eq!(outcome.stale_count, 0);
        assert_eq!(state.guard(), RemediationGuard::Armed);
    }

    #[test]
    fn terminal_records_do_not_trigger_remediation() {
        let mut state = reconciler();
        let mut finished = job("a", JobStatus::Completed, Some(0));
        finished.is_stale_flag = true;

        let outcome = state.apply_poll(Ok(vec![finished]), 1_000_000);
        assert_eq!(outcome.stale_count, 0);
        assert!(!outcome.should_remediate());
    }

    #[test]
    fn channel_transitions_are_tracked() {
        let mut state = reconciler();
        assert_eq!(state.channel_state(), ChannelState::Connecting);
        assert!(state.set_channel_state(ChannelState::Connected));
        assert!(!state.set_channel_state(ChannelState::Connected));
        assert!(state.set_channel_state(ChannelState::Disconnected));
        assert!(state.set_channel_state(ChannelState::Connected));
    }

    #[test]
    fn snapshot_lists_stale_ids() {
        let mut state = reconciler();
        state.apply_poll(
            Ok(vec![
                job("fresh", JobStatus::Running, Some(50_000)),
                job("old", JobStatus::Running, Some(0)),
                job("done", JobStatus::Completed, Some(0)),
            ]),
            80_000,
        );

        let snapshot = state.snapshot(80_000);
        assert_eq!(snapshot.stale_ids, vec!["old".to_string()]);
        assert_eq!(snapshot.records.len(), 3);
    }
}
