#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

fn main() {
    job_monitor_lib::run()
}
