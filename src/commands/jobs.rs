use crate::error::AppError;
use crate::monitor::types::{KillJobArgs, KillJobResult};
use crate::state::AppState;

pub async fn kill_job_with(state: &AppState, args: KillJobArgs) -> Result<KillJobResult, AppError> {
    let api = state.api_client().await?;
    api.kill_job(&args.run_id).await
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn kill_job(
    state: tauri::State<'_, AppState>,
    args: KillJobArgs,
) -> Result<KillJobResult, AppError> {
    kill_job_with(&state, args).await
}
