use crate::error::AppError;
use crate::flash::{FlashChange, TransientFlashState};
use crate::monitor::client::MonitorApi;
use crate::monitor::engine::MonitorEngine;
use crate::monitor::sink::{emit_or_log, MonitorSink};
use crate::monitor::types::{
    parse_push_payload, MonitorConfig, MonitorConnectionState, MonitorStatusSnapshot,
};
use crate::monitor::{
    snapshot_event, DISCOVERY_PROGRESS_EVENT, FLASH_UPDATE_EVENT, MONITOR_STATUS_EVENT,
    REMEDIATION_FAILED_EVENT,
};
use crate::reconcile::records::MonitoredRecord;
use crate::reconcile::{ChannelState, CollectionKind, StreamReconciler};
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, Notify, RwLock};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

const STATUS_HEARTBEAT_MS: u64 = 1_000;
const ALL_COLLECTIONS: [CollectionKind; 4] = [
    CollectionKind::Jobs,
    CollectionKind::DiscoveryRuns,
    CollectionKind::Positions,
    CollectionKind::Sessions,
];

type ReconcilerSelector<R> = fn(&mut MonitorEngine) -> &mut StreamReconciler<R>;

/// "Poll now" requests, one per collection.
#[derive(Debug, Default)]
struct RefreshSignals {
    jobs: Notify,
    discovery_runs: Notify,
    positions: Notify,
    sessions: Notify,
}

impl RefreshSignals {
    fn get(&self, collection: CollectionKind) -> &Notify {
        match collection {
            CollectionKind::Jobs => &self.jobs,
            CollectionKind::DiscoveryRuns => &self.discovery_runs,
            CollectionKind::Positions => &self.positions,
            CollectionKind::Sessions => &self.sessions,
        }
    }
}

struct MonitorContext<A, S> {
    api: Arc<A>,
    sink: S,
    engine: Arc<Mutex<MonitorEngine>>,
    flash: TransientFlashState,
    refresh: Arc<RefreshSignals>,
    status_store: Arc<RwLock<MonitorStatusSnapshot>>,
    push_url: String,
    cancel_token: CancellationToken,
}

impl<A, S: Clone> Clone for MonitorContext<A, S> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            sink: self.sink.clone(),
            engine: Arc::clone(&self.engine),
            flash: self.flash.clone(),
            refresh: Arc::clone(&self.refresh),
            status_store: Arc::clone(&self.status_store),
            push_url: self.push_url.clone(),
            cancel_token: self.cancel_token.clone(),
        }
    }
}

enum ChannelDirective {
    Continue,
    Reconnect,
}

/// Runs one monitoring session until `cancel_token` fires: the push channel,
/// one poller per collection, the status heartbeat and flash forwarding.
pub async fn run_monitor<A, S>(
    api: Arc<A>,
    sink: S,
    config: MonitorConfig,
    status_store: Arc<RwLock<MonitorStatusSnapshot>>,
    cancel_token: CancellationToken,
) where
    A: MonitorApi,
    S: MonitorSink,
{
    let (flash_tx, mut flash_rx) = mpsc::unbounded_channel::<FlashChange>();
    let context = MonitorContext {
        api,
        sink,
        engine: Arc::new(Mutex::new(MonitorEngine::new(&config))),
        flash: TransientFlashState::with_notifier(
            Duration::from_millis(config.flash_ms),
            flash_tx,
        ),
        refresh: Arc::new(RefreshSignals::default()),
        status_store,
        push_url: config.push_url.clone(),
        cancel_token,
    };

    publish_status(
        &context,
        MonitorConnectionState::Connecting,
        0,
        Some("starting monitor".to_string()),
    )
    .await;

    let flash_context = context.clone();
    let flash_handle = tokio::spawn(async move {
        loop {
            let change = tokio::select! {
                _ = flash_context.cancel_token.cancelled() => break,
                change = flash_rx.recv() => change,
            };
            let Some(change) = change else {
                break;
            };
            emit_or_log(&flash_context.sink, FLASH_UPDATE_EVENT, &change);
        }
    });

    let heartbeat_context = context.clone();
    let heartbeat_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(STATUS_HEARTBEAT_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = heartbeat_context.cancel_token.cancelled() => break,
                _ = ticker.tick() => refresh_status_telemetry(&heartbeat_context).await,
            }
        }
    });

    let poller_handles = vec![
        tokio::spawn(run_poller(
            context.clone(),
            CollectionKind::Jobs,
            config.jobs_poll_ms,
            MonitorEngine::jobs_mut as ReconcilerSelector<_>,
            |api: Arc<A>| async move { api.fetch_jobs().await },
        )),
        tokio::spawn(run_poller(
            context.clone(),
            CollectionKind::DiscoveryRuns,
            config.discovery_poll_ms,
            MonitorEngine::discovery_runs_mut as ReconcilerSelector<_>,
            |api: Arc<A>| async move { api.fetch_discovery_runs().await },
        )),
        tokio::spawn(run_poller(
            context.clone(),
            CollectionKind::Positions,
            config.positions_poll_ms,
            MonitorEngine::positions_mut as ReconcilerSelector<_>,
            |api: Arc<A>| async move { api.fetch_positions().await },
        )),
        tokio::spawn(run_poller(
            context.clone(),
            CollectionKind::Sessions,
            config.sessions_poll_ms,
            MonitorEngine::sessions_mut as ReconcilerSelector<_>,
            |api: Arc<A>| async move { api.fetch_sessions().await },
        )),
    ];

    let mut remediation_tasks = JoinSet::new();
    run_push_channel(&context, &mut remediation_tasks).await;

    context.cancel_token.cancel();
    for handle in poller_handles {
        let _ = handle.await;
    }
    while remediation_tasks.join_next().await.is_some() {}
    let _ = heartbeat_handle.await;
    context.flash.teardown();
    let _ = flash_handle.await;

    set_channel_state(&context, ChannelState::Disconnected);
    publish_status(
        &context,
        MonitorConnectionState::Stopped,
        0,
        Some("monitor stopped".to_string()),
    )
    .await;
}

async fn run_push_channel<A, S>(
    context: &MonitorContext<A, S>,
    remediation_tasks: &mut JoinSet<()>,
) where
    A: MonitorApi,
    S: MonitorSink,
{
    let mut reconnect_attempt = 0_u32;

    while !context.cancel_token.is_cancelled() {
        let reason = if reconnect_attempt == 0 {
            "opening push channel".to_string()
        } else {
            format!("reconnect attempt {reconnect_attempt}")
        };
        set_channel_state(context, ChannelState::Connecting);
        publish_status(
            context,
            MonitorConnectionState::Connecting,
            reconnect_attempt,
            Some(reason),
        )
        .await;

        let connected = tokio::select! {
            _ = context.cancel_token.cancelled() => break,
            connected = context.api.connect_push() => connected,
        };

        match connected {
            Ok(mut push_stream) => {
                reconnect_attempt = 0;
                set_channel_state(context, ChannelState::Connected);
                publish_status(
                    context,
                    MonitorConnectionState::Connected,
                    0,
                    Some("push channel connected".to_string()),
                )
                .await;

                let mut reason = "push channel closed".to_string();
                let mut immediate_reconnect = false;
                loop {
                    let frame = tokio::select! {
                        _ = context.cancel_token.cancelled() => break,
                        next_message = push_stream.next() => next_message,
                    };

                    let Some(frame_result) = frame else {
                        break;
                    };

                    match frame_result {
                        Ok(message) => match handle_frame(message, context, remediation_tasks) {
                            ChannelDirective::Continue => {}
                            ChannelDirective::Reconnect => {
                                immediate_reconnect = true;
                                break;
                            }
                        },
                        Err(error) => {
                            tracing::warn!(%error, "push channel frame error");
                            reason = format!("push channel frame error: {error}");
                            break;
                        }
                    }
                }

                if context.cancel_token.is_cancelled() {
                    break;
                }

                set_channel_state(context, ChannelState::Disconnected);
                publish_status(
                    context,
                    MonitorConnectionState::Disconnected,
                    reconnect_attempt,
                    Some(reason),
                )
                .await;

                if immediate_reconnect {
                    continue;
                }
            }
            Err(error) => {
                tracing::warn!(%error, attempt = reconnect_attempt, "push channel connect failed");
                set_channel_state(context, ChannelState::Disconnected);
                publish_status(
                    context,
                    MonitorConnectionState::Disconnected,
                    reconnect_attempt,
                    Some(format!("push channel connect error: {error}")),
                )
                .await;
            }
        }

        reconnect_attempt = reconnect_attempt.saturating_add(1);
        let delay = reconnect_delay(reconnect_attempt);
        tokio::select! {
            _ = context.cancel_token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

fn handle_frame<A, S>(
    message: Message,
    context: &MonitorContext<A, S>,
    remediation_tasks: &mut JoinSet<()>,
) -> ChannelDirective
where
    A: MonitorApi,
    S: MonitorSink,
{
    let mut payload = match message {
        Message::Text(text) => text.into_bytes(),
        Message::Binary(bytes) => bytes,
        Message::Close(_) => return ChannelDirective::Reconnect,
        _ => return ChannelDirective::Continue,
    };

    let message = match parse_push_payload(payload.as_mut_slice()) {
        Ok(message) => message,
        Err(error) => {
            tracing::warn!(%error, "dropping push payload");
            return ChannelDirective::Continue;
        }
    };

    let now_ms = now_unix_ms();
    let (effects, view) = {
        let mut engine = context.engine.lock();
        let effects = engine.handle_push(message, now_ms);
        let view = effects
            .changed
            .map(|collection| (collection, engine.snapshot(collection, now_ms)));
        (effects, view)
    };

    if let Some((collection, view)) = view {
        emit_or_log(&context.sink, snapshot_event(collection), &view);
    }
    if let Some(progress) = &effects.progress {
        emit_or_log(&context.sink, DISCOVERY_PROGRESS_EVENT, progress);
    }
    if let Some(symbol) = &effects.flash {
        context.flash.touch(symbol);
    }
    if let Some(collection) = effects.refresh {
        context.refresh.get(collection).notify_one();
    }
    if let Some(collection) = effects.remediate {
        while remediation_tasks.try_join_next().is_some() {}
        remediation_tasks.spawn(remediate(context.clone(), collection));
    }

    ChannelDirective::Continue
}

async fn run_poller<A, S, R, F, Fut>(
    context: MonitorContext<A, S>,
    collection: CollectionKind,
    interval_ms: u64,
    select: ReconcilerSelector<R>,
    fetch: F,
) where
    A: MonitorApi,
    S: MonitorSink,
    R: MonitoredRecord,
    F: Fn(Arc<A>) -> Fut,
    Fut: Future<Output = Result<Vec<R>, AppError>>,
{
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let refresh = context.refresh.get(collection);

    loop {
        tokio::select! {
            _ = context.cancel_token.cancelled() => break,
            _ = ticker.tick() => {}
            _ = refresh.notified() => {}
        }

        let result = tokio::select! {
            _ = context.cancel_token.cancelled() => break,
            result = fetch(Arc::clone(&context.api)) => result,
        };

        let now_ms = now_unix_ms();
        let (outcome, view) = {
            let mut engine = context.engine.lock();
            let outcome = select(&mut engine).apply_poll(result, now_ms);
            engine.prune_progress();
            (outcome, engine.snapshot(collection, now_ms))
        };
        emit_or_log(&context.sink, snapshot_event(collection), &view);

        if outcome.should_remediate() {
            remediate(context.clone(), collection).await;
        }
    }
}

async fn remediate<A, S>(context: MonitorContext<A, S>, collection: CollectionKind)
where
    A: MonitorApi,
    S: MonitorSink,
{
    let result = tokio::select! {
        _ = context.cancel_token.cancelled() => {
            tracing::debug!(collection = collection.as_str(), "cleanup abandoned on shutdown");
            return;
        }
        result = context.api.cleanup_stale(collection) => result,
    };
    let now_ms = now_unix_ms();
    let (failure, view) = {
        let mut engine = context.engine.lock();
        let failure = engine.record_remediation(collection, result);
        (failure, engine.snapshot(collection, now_ms))
    };

    if let Some(failure) = failure {
        emit_or_log(&context.sink, REMEDIATION_FAILED_EVENT, &failure);
    }
    emit_or_log(&context.sink, snapshot_event(collection), &view);
}

fn set_channel_state<A, S>(context: &MonitorContext<A, S>, state: ChannelState)
where
    S: MonitorSink,
{
    let now_ms = now_unix_ms();
    let views = {
        let mut engine = context.engine.lock();
        if !engine.set_channel_state(state) {
            return;
        }
        ALL_COLLECTIONS.map(|collection| (collection, engine.snapshot(collection, now_ms)))
    };
    for (collection, view) in views {
        emit_or_log(&context.sink, snapshot_event(collection), &view);
    }
}

fn status_telemetry(engine: &Mutex<MonitorEngine>) -> (usize, usize, Option<i64>) {
    let engine = engine.lock();
    let (stale_jobs, stale_sessions) = engine.stale_counts(now_unix_ms());
    (stale_jobs, stale_sessions, engine.last_message_at())
}

async fn publish_status<A, S>(
    context: &MonitorContext<A, S>,
    state: MonitorConnectionState,
    reconnect_attempt: u32,
    reason: Option<String>,
) where
    S: MonitorSink,
{
    let (stale_jobs, stale_sessions, last_message_at) = status_telemetry(&context.engine);
    let snapshot = MonitorStatusSnapshot {
        state,
        push_url: context.push_url.clone(),
        reconnect_attempt,
        last_message_at,
        stale_jobs,
        stale_sessions,
        reason,
    };

    let mut writable = context.status_store.write().await;
    *writable = snapshot;
    emit_or_log(&context.sink, MONITOR_STATUS_EVENT, &*writable);
}

/// Heartbeat: refreshes the telemetry fields in place and republishes.
/// Connection state and reason belong to the channel task.
async fn refresh_status_telemetry<A, S>(context: &MonitorContext<A, S>)
where
    S: MonitorSink,
{
    let (stale_jobs, stale_sessions, last_message_at) = status_telemetry(&context.engine);

    let mut writable = context.status_store.write().await;
    writable.stale_jobs = stale_jobs;
    writable.stale_sessions = stale_sessions;
    writable.last_message_at = last_message_at;
    emit_or_log(&context.sink, MONITOR_STATUS_EVENT, &*writable);
}

fn reconnect_delay(attempt: u32) -> Duration {
    let exponent = attempt.min(6);
    let base_ms = 200_u64.saturating_mul(1_u64 << exponent);
    let jitter_ms = now_unix_ms().unsigned_abs() % 250;
    Duration::from_millis((base_ms + jitter_ms).min(5_000))
}

pub fn now_unix_ms() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis().min(i64::MAX as u128) as i64,
        Err(_) => 0,
    }
}
