pub mod analytics;
pub mod commands;
pub mod error;
pub mod flash;
pub mod logging;
pub mod monitor;
pub mod reconcile;
pub mod state;

#[cfg(feature = "desktop")]
pub fn run() {
    logging::init_tracing();

    tauri::Builder::default()
        .plugin(tauri_plugin_websocket::init())
        .manage(state::AppState::new())
        .invoke_handler(tauri::generate_handler![
            commands::health::health,
            commands::app_info::app_info,
            commands::monitor::start_monitor,
            commands::monitor::stop_monitor,
            commands::monitor::monitor_status,
            commands::jobs::kill_job,
            commands::analytics::run_chart_markers,
            commands::analytics::rolling_ratio,
            commands::analytics::value_histogram
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
