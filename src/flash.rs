use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_FLASH_MS: u64 = 600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", content = "key", rename_all = "lowercase")]
pub enum FlashChange {
    Activated(String),
    Expired(String),
}

#[derive(Debug)]
struct FlashEntry {
    generation: u64,
    expiry: CancellationToken,
}

#[derive(Debug, Default)]
struct FlashRegistry {
    entries: HashMap<String, FlashEntry>,
    next_generation: u64,
}

/// Keys that changed recently, each expiring `hold` after its last touch.
///
/// Every entry owns one cancellable expiry task. A repeat touch cancels the
/// pending task before scheduling the next, and an expiry only removes the
/// entry generation it was scheduled for. Timers are spawned on the current
/// Tokio runtime.
#[derive(Debug, Clone)]
pub struct TransientFlashState {
    registry: Arc<Mutex<FlashRegistry>>,
    hold: Duration,
    notifier: Option<UnboundedSender<FlashChange>>,
}

impl Default for TransientFlashState {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_FLASH_MS))
    }
}

impl TransientFlashState {
    pub fn new(hold: Duration) -> Self {
        Self {
            registry: Arc::new(Mutex::new(FlashRegistry::default())),
            hold,
            notifier: None,
        }
    }

    pub fn with_notifier(hold: Duration, notifier: UnboundedSender<FlashChange>) -> Self {
        Self {
            notifier: Some(notifier),
            ..Self::new(hold)
        }
    }

    pub fn touch(&self, key: &str) {
        let deadline = Instant::now() + self.hold;
        let (generation, expiry) = {
            let mut registry = self.registry.lock();
            registry.next_generation = registry.next_generation.wrapping_add(1);
            let generation = registry.next_generation;
            let expiry = CancellationToken::new();
            let previous = registry.entries.insert(
                key.to_string(),
                FlashEntry {
                    generation,
                    expiry: expiry.clone(),
                },
            );
            if let Some(previous) = previous {
                previous.expiry.cancel();
            }
            (generation, expiry)
        };
        self.notify(FlashChange::Activated(key.to_string()));

        let registry = Arc::clone(&self.registry);
        let notifier = self.notifier.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = expiry.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    let expired = {
                        let mut registry = registry.lock();
                        let current = registry
                            .entries
                            .get(&key)
                            .is_some_and(|entry| entry.generation == generation);
                        if current {
                            registry.entries.remove(&key);
                        }
                        current
                    };
                    if expired {
                        if let Some(notifier) = notifier {
                            let _ = notifier.send(FlashChange::Expired(key));
                        }
                    }
                }
            }
        });
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.registry.lock().entries.contains_key(key)
    }

    pub fn active_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.registry.lock().entries.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// Cancels every pending expiry and clears the set.
    pub fn teardown(&self) {
        let drained: Vec<FlashEntry> = {
            let mut registry = self.registry.lock();
            registry.entries.drain().map(|(_, entry)| entry).collect()
        };
        for entry in drained {
            entry.expiry.cancel();
        }
    }

    fn notify(&self, change: FlashChange) {
        if let Some(notifier) = &self.notifier {
            let _ = notifier.send(change);
        }
    }
}
