use crate::analytics::rolling::{DEFAULT_CONVERGENCE_THRESHOLD, DEFAULT_CONVERGENCE_WINDOW};
use crate::error::AppError;
use crate::monitor::types::{MonitorConfig, PnlPush, ProgressPush, PushMessage};
use crate::reconcile::progress::{GenerationSample, ProgressHistory};
use crate::reconcile::records::{
    JobPatch, JobRecord, PositionPatch, PositionRecord, SessionPatch, SessionRecord,
};
use crate::reconcile::{
    ChannelState, CollectionKind, CollectionSnapshot, ReconcileOutcome, StreamReconciler,
};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub collection: CollectionKind,
    pub run_id: String,
    pub sample: GenerationSample,
    pub converged: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationFailure {
    pub collection: CollectionKind,
    pub reason: String,
}

/// Snapshot of any one collection, serialized without a wrapper.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CollectionView {
    Jobs(CollectionSnapshot<JobRecord>),
    Positions(CollectionSnapshot<PositionRecord>),
    Sessions(CollectionSnapshot<SessionRecord>),
}

/// What the runtime has to do after one push message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushEffects {
    pub changed: Option<CollectionKind>,
    pub remediate: Option<CollectionKind>,
    pub progress: Option<ProgressUpdate>,
    pub flash: Option<String>,
    pub refresh: Option<CollectionKind>,
}

impl PushEffects {
    fn merged(collection: CollectionKind, outcome: Option<ReconcileOutcome>) -> Self {
        let Some(outcome) = outcome else {
            return Self::default();
        };
        Self {
            changed: Some(collection),
            remediate: outcome.should_remediate().then_some(collection),
            ..Self::default()
        }
    }
}

/// Canonical monitor state: one reconciler per collection plus the
/// generation history fed by progress pushes. Holds no I/O.
#[derive(Debug)]
pub struct MonitorEngine {
    jobs: StreamReconciler<JobRecord>,
    discovery_runs: StreamReconciler<JobRecord>,
    positions: StreamReconciler<PositionRecord>,
    sessions: StreamReconciler<SessionRecord>,
    progress: ProgressHistory,
    session_id: Option<String>,
    last_message_at: Option<i64>,
}

impl MonitorEngine {
    pub fn new(config: &MonitorConfig) -> Self {
        let stale_after_ms = i64::try_from(config.stale_after_ms).unwrap_or(i64::MAX);
        Self {
            jobs: StreamReconciler::new(CollectionKind::Jobs, stale_after_ms),
            discovery_runs: StreamReconciler::new(CollectionKind::DiscoveryRuns, stale_after_ms),
            positions: StreamReconciler::new(CollectionKind::Positions, stale_after_ms),
            sessions: StreamReconciler::new(CollectionKind::Sessions, stale_after_ms),
            progress: ProgressHistory::default(),
            session_id: config.session_id.clone(),
            last_message_at: None,
        }
    }

    pub fn jobs_mut(&mut self) -> &mut StreamReconciler<JobRecord> {
        &mut self.jobs
    }

    pub fn discovery_runs_mut(&mut self) -> &mut StreamReconciler<JobRecord> {
        &mut self.discovery_runs
    }

    pub fn positions_mut(&mut self) -> &mut StreamReconciler<PositionRecord> {
        &mut self.positions
    }

    pub fn sessions_mut(&mut self) -> &mut StreamReconciler<SessionRecord> {
        &mut self.sessions
    }

    pub fn progress(&self) -> &ProgressHistory {
        &self.progress
    }

    pub fn last_message_at(&self) -> Option<i64> {
        self.last_message_at
    }

    /// Fans a channel transition out to every collection.
    pub fn set_channel_state(&mut self, state: ChannelState) -> bool {
        let mut changed = self.jobs.set_channel_state(state);
        changed |= self.discovery_runs.set_channel_state(state);
        changed |= self.positions.set_channel_state(state);
        changed |= self.sessions.set_channel_state(state);
        if changed {
            tracing::info!(?state, "push channel state changed");
        }
        changed
    }

    pub fn handle_push(&mut self, message: PushMessage, now_ms: i64) -> PushEffects {
        self.last_message_at = Some(now_ms);
        match message {
            PushMessage::JobProgress(progress) => {
                self.apply_progress(CollectionKind::Jobs, &progress, now_ms)
            }
            PushMessage::DiscoveryProgress(progress) => {
                self.apply_progress(CollectionKind::DiscoveryRuns, &progress, now_ms)
            }
            PushMessage::PnlUpdate(pnl) => self.apply_pnl(&pnl, now_ms),
            PushMessage::PositionUpdate(position) => {
                let symbol = position.symbol.trim().to_ascii_uppercase();
                let outcome = self.positions.apply_push(
                    &symbol,
                    &PositionPatch { pushed_at: now_ms },
                    now_ms,
                );
                PushEffects {
                    flash: Some(symbol),
                    refresh: Some(CollectionKind::Positions),
                    ..PushEffects::merged(CollectionKind::Positions, outcome)
                }
            }
            PushMessage::Unknown => PushEffects::default(),
        }
    }

    fn apply_progress(
        &mut self,
        collection: CollectionKind,
        progress: &ProgressPush,
        now_ms: i64,
    ) -> PushEffects {
        let sample = progress.sample();
        if !self.progress.record(&progress.run_id, sample) {
            return PushEffects::default();
        }

        let reconciler = match collection {
            CollectionKind::DiscoveryRuns => &mut self.discovery_runs,
            _ => &mut self.jobs,
        };
        let patch = JobPatch {
            progress: Some(progress.progress()),
            ..JobPatch::default()
        };
        let outcome = reconciler.apply_push(&progress.run_id, &patch, now_ms);

        PushEffects {
            progress: Some(ProgressUpdate {
                collection,
                run_id: progress.run_id.clone(),
                sample,
                converged: self.progress.is_converged(
                    &progress.run_id,
                    DEFAULT_CONVERGENCE_WINDOW,
                    DEFAULT_CONVERGENCE_THRESHOLD,
                ),
            }),
            ..PushEffects::merged(collection, outcome)
        }
    }

    fn apply_pnl(&mut self, pnl: &PnlPush, now_ms: i64) -> PushEffects {
        let Some(session_id) = pnl.session_id.as_deref().or(self.session_id.as_deref()) else {
            tracing::debug!("pnl update without a target session; ignoring");
            return PushEffects::default();
        };
        let patch = SessionPatch {
            total_pnl: pnl.total_pnl,
            equity: pnl.equity,
        };
        let outcome = self.sessions.apply_push(session_id, &patch, now_ms);
        PushEffects::merged(CollectionKind::Sessions, outcome)
    }

    /// Drops generation history for runs neither job list still reports.
    /// Waits until both lists have been polled once.
    pub fn prune_progress(&mut self) {
        if self.jobs.last_poll_at().is_none() || self.discovery_runs.last_poll_at().is_none() {
            return;
        }
        let live = self
            .jobs
            .records()
            .iter()
            .chain(self.discovery_runs.records())
            .map(|record| record.id.as_str());
        self.progress.retain_runs(live);
    }

    pub fn record_remediation(
        &mut self,
        collection: CollectionKind,
        result: Result<(), AppError>,
    ) -> Option<RemediationFailure> {
        match result {
            Ok(()) => {
                match collection {
                    CollectionKind::Jobs => self.jobs.record_remediation_success(),
                    CollectionKind::DiscoveryRuns => {
                        self.discovery_runs.record_remediation_success()
                    }
                    CollectionKind::Positions => self.positions.record_remediation_success(),
                    CollectionKind::Sessions => self.sessions.record_remediation_success(),
                }
                None
            }
            Err(error) => {
                match collection {
                    CollectionKind::Jobs => self.jobs.record_remediation_failure(&error),
                    CollectionKind::DiscoveryRuns => {
                        self.discovery_runs.record_remediation_failure(&error)
                    }
                    CollectionKind::Positions => self.positions.record_remediation_failure(&error),
                    CollectionKind::Sessions => self.sessions.record_remediation_failure(&error),
                }
                Some(RemediationFailure {
                    collection,
                    reason: error.to_string(),
                })
            }
        }
    }

    pub fn snapshot(&self, collection: CollectionKind, now_ms: i64) -> CollectionView {
        match collection {
            CollectionKind::Jobs => CollectionView::Jobs(self.jobs.snapshot(now_ms)),
            CollectionKind::DiscoveryRuns => {
                CollectionView::Jobs(self.discovery_runs.snapshot(now_ms))
            }
            CollectionKind::Positions => CollectionView::Positions(self.positions.snapshot(now_ms)),
            CollectionKind::Sessions => CollectionView::Sessions(self.sessions.snapshot(now_ms)),
        }
    }

    /// Stale job-like records (jobs and discovery runs) and stale sessions.
    pub fn stale_counts(&self, now_ms: i64) -> (usize, usize) {
        let jobs = self.jobs.stale_ids(now_ms).len() + self.discovery_runs.stale_ids(now_ms).len();
        (jobs, self.sessions.stale_ids(now_ms).len())
    }
}
