use crate::monitor::types::{
    resolve_env_url, API_BASE_URL_ENV, DEFAULT_API_BASE_URL, DEFAULT_PUSH_URL, PUSH_URL_ENV,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfoResponse {
    pub product_name: String,
    pub version: String,
    pub identifier: String,
    pub platform: String,
    pub arch: String,
    pub api_base_url: String,
    pub push_url: String,
}

/// Runtime metadata plus the endpoints a default `start_monitor` would use.
pub fn build_app_info_response(
    product_name: String,
    version: String,
    identifier: String,
) -> AppInfoResponse {
    AppInfoResponse {
        product_name,
        version,
        identifier,
        platform: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        api_base_url: resolve_env_url(API_BASE_URL_ENV, DEFAULT_API_BASE_URL),
        push_url: resolve_env_url(PUSH_URL_ENV, DEFAULT_PUSH_URL),
    }
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub fn app_info(app: tauri::AppHandle) -> AppInfoResponse {
    let package = app.package_info();
    let config = app.config();
    let product_name = config
        .product_name
        .clone()
        .unwrap_or_else(|| package.name.clone());

    build_app_info_response(
        product_name,
        package.version.to_string(),
        config.identifier.clone(),
    )
}
