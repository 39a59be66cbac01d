use crate::analytics::markers::TradeEvent;
use crate::error::AppError;
use crate::reconcile::progress::GenerationSample;
use crate::reconcile::records::{
    JobProgress, JobRecord, JobStatus, PositionDirection, PositionRecord, SessionRecord,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_PUSH_URL: &str = "ws://127.0.0.1:8000/ws";
pub const API_BASE_URL_ENV: &str = "MONITOR_API_BASE_URL";
pub const PUSH_URL_ENV: &str = "MONITOR_PUSH_URL";
pub const DEFAULT_POSITIONS_POLL_MS: u64 = 5_000;
pub const DEFAULT_DISCOVERY_POLL_MS: u64 = 10_000;
pub const DEFAULT_JOBS_POLL_MS: u64 = 15_000;
pub const DEFAULT_SESSIONS_POLL_MS: u64 = 15_000;
pub const DEFAULT_STALE_AFTER_MS: u64 = 60_000;
pub const DEFAULT_FLASH_MS: u64 = crate::flash::DEFAULT_FLASH_MS;
pub const MIN_POLL_MS: u64 = 1_000;
pub const MAX_POLL_MS: u64 = 300_000;
pub const MIN_STALE_AFTER_MS: u64 = 5_000;
pub const MAX_STALE_AFTER_MS: u64 = 3_600_000;
pub const MIN_FLASH_MS: u64 = 50;
pub const MAX_FLASH_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MonitorConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatusSnapshot {
    pub state: MonitorConnectionState,
    pub push_url: String,
    pub reconnect_attempt: u32,
    pub last_message_at: Option<i64>,
    pub stale_jobs: usize,
    pub stale_sessions: usize,
    pub reason: Option<String>,
}

impl MonitorStatusSnapshot {
    pub fn stopped(push_url: String, reason: Option<String>) -> Self {
        Self {
            state: MonitorConnectionState::Stopped,
            push_url,
            reconnect_attempt: 0,
            last_message_at: None,
            stale_jobs: 0,
            stale_sessions: 0,
            reason,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartMonitorArgs {
    pub api_base_url: Option<String>,
    pub push_url: Option<String>,
    pub positions_poll_ms: Option<u64>,
    pub discovery_poll_ms: Option<u64>,
    pub jobs_poll_ms: Option<u64>,
    pub sessions_poll_ms: Option<u64>,
    pub stale_after_ms: Option<u64>,
    pub flash_ms: Option<u64>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub api_base_url: String,
    pub push_url: String,
    pub positions_poll_ms: u64,
    pub discovery_poll_ms: u64,
    pub jobs_poll_ms: u64,
    pub sessions_poll_ms: u64,
    pub stale_after_ms: u64,
    pub flash_ms: u64,
    pub session_id: Option<String>,
}

pub(crate) fn resolve_env_url(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn normalize_url(
    value: Option<String>,
    env_name: &str,
    default: &str,
    schemes: &[&str],
    field: &str,
) -> Result<String, AppError> {
    let url = value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| resolve_env_url(env_name, default));
    let url = url.trim_end_matches('/').to_string();

    if !schemes.iter().any(|scheme| url.starts_with(scheme)) {
        return Err(AppError::InvalidArgument(format!(
            "{field} must start with one of {}",
            schemes.join(", ")
        )));
    }
    Ok(url)
}

fn bounded_ms(
    value: Option<u64>,
    default: u64,
    min: u64,
    max: u64,
    field: &str,
) -> Result<u64, AppError> {
    let value = value.unwrap_or(default);
    if !(min..=max).contains(&value) {
        return Err(AppError::InvalidArgument(format!(
            "{field} must be between {min} and {max}"
        )));
    }
    Ok(value)
}

impl StartMonitorArgs {
    pub fn normalize(self) -> Result<MonitorConfig, AppError> {
        let api_base_url = normalize_url(
            self.api_base_url,
            API_BASE_URL_ENV,
            DEFAULT_API_BASE_URL,
            &["http://", "https://"],
            "apiBaseUrl",
        )?;
        let push_url = normalize_url(
            self.push_url,
            PUSH_URL_ENV,
            DEFAULT_PUSH_URL,
            &["ws://", "wss://"],
            "pushUrl",
        )?;
        let positions_poll_ms = bounded_ms(
            self.positions_poll_ms,
            DEFAULT_POSITIONS_POLL_MS,
            MIN_POLL_MS,
            MAX_POLL_MS,
            "positionsPollMs",
        )?;
        let discovery_poll_ms = bounded_ms(
            self.discovery_poll_ms,
            DEFAULT_DISCOVERY_POLL_MS,
            MIN_POLL_MS,
            MAX_POLL_MS,
            "discoveryPollMs",
        )?;
        let jobs_poll_ms = bounded_ms(
            self.jobs_poll_ms,
            DEFAULT_JOBS_POLL_MS,
            MIN_POLL_MS,
            MAX_POLL_MS,
            "jobsPollMs",
        )?;
        let sessions_poll_ms = bounded_ms(
            self.sessions_poll_ms,
            DEFAULT_SESSIONS_POLL_MS,
            MIN_POLL_MS,
            MAX_POLL_MS,
            "sessionsPollMs",
        )?;
        let stale_after_ms = bounded_ms(
            self.stale_after_ms,
            DEFAULT_STALE_AFTER_MS,
            MIN_STALE_AFTER_MS,
            MAX_STALE_AFTER_MS,
            "staleAfterMs",
        )?;
        let flash_ms = bounded_ms(
            self.flash_ms,
            DEFAULT_FLASH_MS,
            MIN_FLASH_MS,
            MAX_FLASH_MS,
            "flashMs",
        )?;
        let session_id = self
            .session_id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Ok(MonitorConfig {
            api_base_url,
            push_url,
            positions_poll_ms,
            discovery_poll_ms,
            jobs_poll_ms,
            sessions_poll_ms,
            stale_after_ms,
            flash_ms,
            session_id,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSession {
    pub running: bool,
    pub api_base_url: String,
    pub push_url: String,
    pub positions_poll_ms: u64,
    pub discovery_poll_ms: u64,
    pub jobs_poll_ms: u64,
    pub sessions_poll_ms: u64,
    pub stale_after_ms: u64,
    pub flash_ms: u64,
    pub session_id: Option<String>,
}

impl MonitorSession {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            running: true,
            api_base_url: config.api_base_url.clone(),
            push_url: config.push_url.clone(),
            positions_poll_ms: config.positions_poll_ms,
            discovery_poll_ms: config.discovery_poll_ms,
            jobs_poll_ms: config.jobs_poll_ms,
            sessions_poll_ms: config.sessions_poll_ms,
            stale_after_ms: config.stale_after_ms,
            flash_ms: config.flash_ms,
            session_id: config.session_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStopResult {
    pub stopped: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KillJobResult {
    pub run_id: String,
    pub accepted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillJobArgs {
    pub run_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunChartMarkersArgs {
    pub run_id: String,
    pub trades: Vec<TradeEvent>,
}

// Push channel

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProgressPush {
    pub run_id: String,
    pub generation: u32,
    pub best_fitness: f64,
    pub avg_fitness: f64,
    pub worst_fitness: f64,
    #[serde(default)]
    pub best_metrics: Option<serde_json::Value>,
}

impl ProgressPush {
    fn validate(&self) -> Result<(), AppError> {
        if self.run_id.trim().is_empty() {
            return Err(AppError::MalformedPayload(
                "progress message without run_id".to_string(),
            ));
        }
        if !self.best_fitness.is_finite()
            || !self.avg_fitness.is_finite()
            || !self.worst_fitness.is_finite()
        {
            return Err(AppError::MalformedPayload(
                "fitness values must be finite".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sample(&self) -> GenerationSample {
        GenerationSample {
            generation: self.generation,
            best: self.best_fitness,
            avg: self.avg_fitness,
            worst: self.worst_fitness,
        }
    }

    pub fn progress(&self) -> JobProgress {
        JobProgress {
            generation: self.generation,
            best_fitness: self.best_fitness,
            avg_fitness: self.avg_fitness,
            worst_fitness: self.worst_fitness,
            best_metrics: self.best_metrics.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PnlPush {
    #[serde(default, alias = "pnl")]
    pub total_pnl: Option<f64>,
    #[serde(default, alias = "account_equity")]
    pub equity: Option<f64>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PositionPush {
    pub symbol: String,
}

/// Push-channel message, tagged by its `type` field.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    JobProgress(ProgressPush),
    DiscoveryProgress(ProgressPush),
    PnlUpdate(PnlPush),
    PositionUpdate(PositionPush),
    #[serde(other)]
    Unknown,
}

impl PushMessage {
    fn validate(self) -> Result<Self, AppError> {
        match &self {
            Self::JobProgress(progress) | Self::DiscoveryProgress(progress) => {
                progress.validate()?
            }
            Self::PnlUpdate(pnl) => {
                let finite = pnl.total_pnl.map(f64::is_finite).unwrap_or(true)
                    && pnl.equity.map(f64::is_finite).unwrap_or(true);
                if !finite {
                    return Err(AppError::MalformedPayload(
                        "pnl values must be finite".to_string(),
                    ));
                }
            }
            Self::PositionUpdate(position) => {
                if position.symbol.trim().is_empty() {
                    return Err(AppError::MalformedPayload(
                        "position update without symbol".to_string(),
                    ));
                }
            }
            Self::Unknown => {}
        }
        Ok(self)
    }
}

pub fn parse_push_payload(payload: &mut [u8]) -> Result<PushMessage, AppError> {
    let message: PushMessage = simd_json::serde::from_slice(payload)
        .map_err(|error| AppError::MalformedPayload(error.to_string()))?;
    message.validate()
}

// Snapshot polls

#[derive(Debug, Deserialize)]
pub struct JobRecordWire {
    pub run_id: String,
    pub job_type: String,
    pub status: JobStatus,
    #[serde(default)]
    pub started_at: Option<i64>,
    #[serde(default)]
    pub heartbeat_at: Option<i64>,
    #[serde(default)]
    pub is_stale: bool,
}

impl TryFrom<JobRecordWire> for JobRecord {
    type Error = AppError;

    fn try_from(value: JobRecordWire) -> Result<Self, Self::Error> {
        if value.run_id.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "job record without run_id".to_string(),
            ));
        }
        Ok(Self {
            id: value.run_id,
            job_type: value.job_type,
            status: value.status,
            started_at: value.started_at,
            heartbeat_at: value.heartbeat_at,
            is_stale_flag: value.is_stale,
            progress: None,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PositionWire {
    pub symbol: String,
    pub direction: String,
    pub entry_price: f64,
    pub quantity: f64,
    pub leverage: f64,
    pub unrealized_pnl: f64,
}

impl TryFrom<PositionWire> for PositionRecord {
    type Error = AppError;

    fn try_from(value: PositionWire) -> Result<Self, Self::Error> {
        let direction = match value.direction.trim().to_ascii_lowercase().as_str() {
            "long" | "buy" => PositionDirection::Long,
            "short" | "sell" => PositionDirection::Short,
            other => {
                return Err(AppError::InvalidArgument(format!(
                    "unknown position direction '{other}'"
                )))
            }
        };
        if !value.entry_price.is_finite()
            || !value.quantity.is_finite()
            || !value.leverage.is_finite()
            || !value.unrealized_pnl.is_finite()
        {
            return Err(AppError::InvalidArgument(
                "position values must be finite".to_string(),
            ));
        }

        Ok(Self {
            symbol: value.symbol.trim().to_ascii_uppercase(),
            direction,
            entry_price: value.entry_price,
            quantity: value.quantity,
            leverage: value.leverage,
            unrealized_pnl: value.unrealized_pnl,
            pushed_at: None,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionWire {
    pub session_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub started_at: Option<i64>,
    #[serde(default)]
    pub heartbeat_at: Option<i64>,
    #[serde(default)]
    pub is_stale: bool,
    #[serde(default)]
    pub total_pnl: Option<f64>,
    #[serde(default)]
    pub equity: Option<f64>,
}

impl TryFrom<SessionWire> for SessionRecord {
    type Error = AppError;

    fn try_from(value: SessionWire) -> Result<Self, Self::Error> {
        if value.session_id.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "session record without session_id".to_string(),
            ));
        }
        Ok(Self {
            id: value.session_id,
            status: value.status,
            started_at: value.started_at,
            heartbeat_at: value.heartbeat_at,
            is_stale_flag: value.is_stale,
            total_pnl: value.total_pnl,
            equity: value.equity,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunCandle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Deserialize)]
pub struct RunCandleWire {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl TryFrom<RunCandleWire> for RunCandle {
    type Error = AppError;

    fn try_from(value: RunCandleWire) -> Result<Self, Self::Error> {
        if !value.open.is_finite()
            || !value.high.is_finite()
            || !value.low.is_finite()
            || !value.close.is_finite()
            || !value.volume.is_finite()
        {
            return Err(AppError::InvalidArgument(
                "candle values must be finite".to_string(),
            ));
        }

        Ok(Self {
            open_time: value.open_time,
            open: value.open,
            high: value.high,
            low: value.low,
            close: value.close,
            volume: value.volume.max(0.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_progress_message() {
        let mut payload = br#"{"type":"discovery_progress","run_id":"d-7","generation":12,"best_fitness":1.25,"avg_fitness":0.9,"worst_fitness":0.1,"best_metrics":{"sharpe":1.8}}"#.to_vec();
        let message = parse_push_payload(&mut payload).expect("progress payload should parse");

        let PushMessage::DiscoveryProgress(progress) = message else {
            panic!("expected discovery progress, got {message:?}");
        };
        assert_eq!(progress.run_id, "d-7");
        assert_eq!(progress.generation, 12);
        assert_eq!(progress.sample().best, 1.25);
        assert!(progress.best_metrics.is_some());
    }

    #[test]
    fn pnl_update_accepts_both_field_spellings() {
        let mut short = br#"{"type":"pnl_update","pnl":12.5,"account_equity":1012.5}"#.to_vec();
        let mut long = br#"{"type":"pnl_update","total_pnl":12.5,"equity":1012.5}"#.to_vec();

        let expected = PushMessage::PnlUpdate(PnlPush {
            total_pnl: Some(12.5),
            equity: Some(1_012.5),
            session_id: None,
        });
        assert_eq!(parse_push_payload(&mut short).expect("short form"), expected);
        assert_eq!(parse_push_payload(&mut long).expect("long form"), expected);
    }

    #[test]
    fn unknown_message_types_are_ignored() {
        let mut payload = br#"{"type":"heartbeat","ts":1}"#.to_vec();
        assert_eq!(
            parse_push_payload(&mut payload).expect("unknown type should decode"),
            PushMessage::Unknown
        );
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        let mut broken = br#"{"type":"job_progress","run_id":"r1","generation":"x"}"#.to_vec();
        assert!(matches!(
            parse_push_payload(&mut broken),
            Err(AppError::MalformedPayload(_))
        ));

        let mut not_json = b"not json".to_vec();
        assert!(parse_push_payload(&mut not_json).is_err());

        let mut empty_symbol = br#"{"type":"position_update","symbol":"  "}"#.to_vec();
        assert!(parse_push_payload(&mut empty_symbol).is_err());
    }

    #[test]
    fn maps_job_wire_to_record() {
        let wire: JobRecordWire = serde_json::from_str(
            r#"{"run_id":"r1","job_type":"backtest","status":"running","started_at":1000,"heartbeat_at":2000,"is_stale":false}"#,
        )
        .expect("job wire should decode");
        let record = JobRecord::try_from(wire).expect("job wire should map");

        assert_eq!(record.id, "r1");
        assert_eq!(record.status, JobStatus::Running);
        assert_eq!(record.heartbeat_at, Some(2_000));
        assert!(record.progress.is_none());
    }

    #[test]
    fn maps_position_direction_case_insensitively() {
        let wire: PositionWire = serde_json::from_str(
            r#"{"symbol":"btcusdt","direction":"SHORT","entry_price":100.0,"quantity":0.5,"leverage":3.0,"unrealized_pnl":-1.5}"#,
        )
        .expect("position wire should decode");
        let record = PositionRecord::try_from(wire).expect("position wire should map");

        assert_eq!(record.symbol, "BTCUSDT");
        assert_eq!(record.direction, PositionDirection::Short);
    }

    #[test]
    fn normalizes_start_args_defaults() {
        let config = StartMonitorArgs {
            api_base_url: Some("http://localhost:9000/".to_string()),
            push_url: Some("ws://localhost:9000/ws".to_string()),
            ..Default::default()
        }
        .normalize()
        .expect("defaults should be valid");

        assert_eq!(config.api_base_url, "http://localhost:9000");
        assert_eq!(config.positions_poll_ms, DEFAULT_POSITIONS_POLL_MS);
        assert_eq!(config.discovery_poll_ms, DEFAULT_DISCOVERY_POLL_MS);
        assert_eq!(config.jobs_poll_ms, DEFAULT_JOBS_POLL_MS);
        assert_eq!(config.stale_after_ms, DEFAULT_STALE_AFTER_MS);
        assert_eq!(config.flash_ms, DEFAULT_FLASH_MS);
        assert!(config.session_id.is_none());
    }

    #[test]
    fn validates_poll_interval_range() {
        let result = StartMonitorArgs {
            api_base_url: Some("http://localhost:9000".to_string()),
            push_url: Some("ws://localhost:9000/ws".to_string()),
            positions_poll_ms: Some(10),
            ..Default::default()
        }
        .normalize();

        assert!(result.is_err());
    }

    #[test]
    fn validates_url_schemes() {
        let result = StartMonitorArgs {
            api_base_url: Some("ftp://localhost".to_string()),
            push_url: Some("ws://localhost:9000/ws".to_string()),
            ..Default::default()
        }
        .normalize();
        assert!(result.is_err());

        let result = StartMonitorArgs {
            api_base_url: Some("http://localhost:9000".to_string()),
            push_url: Some("http://localhost:9000/ws".to_string()),
            ..Default::default()
        }
        .normalize();
        assert!(result.is_err());
    }

    #[test]
    fn env_url_falls_back_to_default_when_unset() {
        assert_eq!(
            resolve_env_url("JOB_MONITOR_UNSET_URL_FOR_TEST", DEFAULT_API_BASE_URL),
            DEFAULT_API_BASE_URL
        );
    }

    #[test]
    fn connection_states_serialize_lowercase() {
        assert_eq!(
            serde_json::to_value(MonitorConnectionState::Disconnected).expect("state serializes"),
            serde_json::json!("disconnected")
        );
        assert!(serde_json::from_value::<MonitorConnectionState>(serde_json::json!("error"))
            .is_err());
    }
}
