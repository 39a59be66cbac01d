pub mod analytics;
pub mod app_info;
pub mod health;
pub mod jobs;
pub mod monitor;
