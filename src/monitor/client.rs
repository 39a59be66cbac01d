use crate::error::AppError;
use crate::monitor::types::{
    JobRecordWire, KillJobResult, PositionWire, RunCandle, RunCandleWire, SessionWire,
};
use crate::reconcile::records::{JobRecord, PositionRecord, SessionRecord};
use crate::reconcile::CollectionKind;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tokio_tungstenite::connect_async_with_config;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

const REQUEST_TIMEOUT_MS: u64 = 10_000;

pub type PushStream = BoxStream<'static, Result<Message, WsError>>;

/// Everything the monitor runtime needs from the job server.
pub trait MonitorApi: Send + Sync + 'static {
    fn fetch_jobs(&self) -> impl Future<Output = Result<Vec<JobRecord>, AppError>> + Send;

    fn fetch_discovery_runs(
        &self,
    ) -> impl Future<Output = Result<Vec<JobRecord>, AppError>> + Send;

    fn fetch_positions(
        &self,
    ) -> impl Future<Output = Result<Vec<PositionRecord>, AppError>> + Send;

    fn fetch_sessions(&self)
        -> impl Future<Output = Result<Vec<SessionRecord>, AppError>> + Send;

    /// Idempotent server-side sweep of stale records in `collection`.
    fn cleanup_stale(
        &self,
        collection: CollectionKind,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn connect_push(&self) -> impl Future<Output = Result<PushStream, AppError>> + Send;
}

fn jobs_endpoint(base_url: &str) -> String {
    format!("{base_url}/api/jobs")
}

fn discovery_runs_endpoint(base_url: &str) -> String {
    format!("{base_url}/api/discovery/runs")
}

fn positions_endpoint(base_url: &str) -> String {
    format!("{base_url}/api/positions")
}

fn sessions_endpoint(base_url: &str) -> String {
    format!("{base_url}/api/sessions")
}

fn cleanup_endpoint(base_url: &str, collection: CollectionKind) -> Option<String> {
    match collection {
        CollectionKind::Jobs => Some(format!("{}/cleanup-stale", jobs_endpoint(base_url))),
        CollectionKind::DiscoveryRuns => Some(format!(
            "{}/cleanup-stale",
            discovery_runs_endpoint(base_url)
        )),
        CollectionKind::Sessions => {
            Some(format!("{}/cleanup-stale", sessions_endpoint(base_url)))
        }
        CollectionKind::Positions => None,
    }
}

fn run_candles_endpoint(base_url: &str, run_id: &str) -> String {
    format!("{base_url}/api/runs/{run_id}/candles")
}

fn kill_job_endpoint(base_url: &str, run_id: &str) -> String {
    format!("{}/{run_id}/kill", jobs_endpoint(base_url))
}

fn validate_run_id(run_id: &str) -> Result<&str, AppError> {
    let run_id = run_id.trim();
    let valid = !run_id.is_empty()
        && run_id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));
    if !valid {
        return Err(AppError::InvalidArgument(format!(
            "invalid run id '{run_id}'"
        )));
    }
    Ok(run_id)
}

#[derive(Debug, Clone)]
pub struct MonitorApiClient {
    http: Client,
    base_url: String,
    push_url: String,
}

impl MonitorApiClient {
    pub fn new(base_url: impl Into<String>, push_url: impl Into<String>) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(REQUEST_TIMEOUT_MS))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            push_url: push_url.into(),
        })
    }

    async fn get_list<W, R>(&self, endpoint: String) -> Result<Vec<R>, AppError>
    where
        W: serde::de::DeserializeOwned,
        R: TryFrom<W, Error = AppError>,
    {
        let response = self.http.get(endpoint).send().await?.error_for_status()?;
        let payload = response.json::<Vec<W>>().await?;

        let mut records = Vec::with_capacity(payload.len());
        for wire in payload {
            records.push(R::try_from(wire)?);
        }
        Ok(records)
    }

    pub async fn fetch_run_candles(&self, run_id: &str) -> Result<Vec<RunCandle>, AppError> {
        let run_id = validate_run_id(run_id)?;
        let mut candles: Vec<RunCandle> = self
            .get_list::<RunCandleWire, RunCandle>(run_candles_endpoint(&self.base_url, run_id))
            .await?;
        candles.sort_unstable_by_key(|candle| candle.open_time);
        candles.dedup_by_key(|candle| candle.open_time);
        Ok(candles)
    }

    pub async fn kill_job(&self, run_id: &str) -> Result<KillJobResult, AppError> {
        let run_id = validate_run_id(run_id)?;
        self.http
            .post(kill_job_endpoint(&self.base_url, run_id))
            .send()
            .await?
            .error_for_status()?;
        tracing::info!(run_id, "kill requested");
        Ok(KillJobResult {
            run_id: run_id.to_string(),
            accepted: true,
        })
    }
}

impl MonitorApi for MonitorApiClient {
    async fn fetch_jobs(&self) -> Result<Vec<JobRecord>, AppError> {
        self.get_list::<JobRecordWire, JobRecord>(jobs_endpoint(&self.base_url))
            .await
    }

    async fn fetch_discovery_runs(&self) -> Result<Vec<JobRecord>, AppError> {
        self.get_list::<JobRecordWire, JobRecord>(discovery_runs_endpoint(&self.base_url))
            .await
    }

    async fn fetch_positions(&self) -> Result<Vec<PositionRecord>, AppError> {
        self.get_list::<PositionWire, PositionRecord>(positions_endpoint(&self.base_url))
            .await
    }

    async fn fetch_sessions(&self) -> Result<Vec<SessionRecord>, AppError> {
        self.get_list::<SessionWire, SessionRecord>(sessions_endpoint(&self.base_url))
            .await
    }

    async fn cleanup_stale(&self, collection: CollectionKind) -> Result<(), AppError> {
        let remediation_error = |reason: String| AppError::Remediation {
            collection: collection.as_str().to_string(),
            reason,
        };
        let endpoint = cleanup_endpoint(&self.base_url, collection)
            .ok_or_else(|| remediation_error("collection has no cleanup endpoint".to_string()))?;

        self.http
            .post(endpoint)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|error| remediation_error(error.to_string()))?;
        Ok(())
    }

    async fn connect_push(&self) -> Result<PushStream, AppError> {
        let ws_config = WebSocketConfig {
            max_message_size: Some(16 << 20),
            max_frame_size: Some(4 << 20),
            ..Default::default()
        };

        let (stream, _) =
            connect_async_with_config(self.push_url.as_str(), Some(ws_config), true).await?;
        Ok(stream.boxed())
    }
}
