use crate::error::AppError;
use serde::Serialize;

/// Destination for monitor events consumed by the rendering layer.
pub trait MonitorSink: Clone + Send + Sync + 'static {
    fn emit_event<T>(&self, event: &str, payload: &T) -> Result<(), AppError>
    where
        T: Serialize + Clone;
}

#[cfg(feature = "desktop")]
impl MonitorSink for tauri::WebviewWindow {
    fn emit_event<T>(&self, event: &str, payload: &T) -> Result<(), AppError>
    where
        T: Serialize + Clone,
    {
        use tauri::Emitter;

        self.emit(event, payload)?;
        Ok(())
    }
}

/// Emits and logs instead of failing; a dropped frame is not fatal to the
/// monitor.
pub fn emit_or_log<S, T>(sink: &S, event: &str, payload: &T)
where
    S: MonitorSink,
    T: Serialize + Clone,
{
    if let Err(error) = sink.emit_event(event, payload) {
        tracing::warn!(event, %error, "failed to emit monitor event");
    }
}

#[cfg(test)]
pub use recording::RecordingSink;
