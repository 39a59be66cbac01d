pub mod client;
pub mod engine;
pub mod pipeline;
pub mod sink;
pub mod types;

use crate::reconcile::CollectionKind;

pub const MONITOR_STATUS_EVENT: &str = "monitor_status";
pub const JOBS_SNAPSHOT_EVENT: &str = "jobs_snapshot";
pub const DISCOVERY_SNAPSHOT_EVENT: &str = "discovery_snapshot";
pub const POSITIONS_SNAPSHOT_EVENT: &str = "positions_snapshot";
pub const SESSIONS_SNAPSHOT_EVENT: &str = "sessions_snapshot";
pub const DISCOVERY_PROGRESS_EVENT: &str = "discovery_progress";
pub const FLASH_UPDATE_EVENT: &str = "flash_update";
pub const REMEDIATION_FAILED_EVENT: &str = "remediation_failed";

pub fn snapshot_event(collection: CollectionKind) -> &'static str {
    match collection {
        CollectionKind::Jobs => JOBS_SNAPSHOT_EVENT,
        CollectionKind::DiscoveryRuns => DISCOVERY_SNAPSHOT_EVENT,
        CollectionKind::Positions => POSITIONS_SNAPSHOT_EVENT,
        CollectionKind::Sessions => SESSIONS_SNAPSHOT_EVENT,
    }
}
