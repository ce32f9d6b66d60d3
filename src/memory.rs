//! Memory-pressure tracking for constrained hosts.
//!
//! A WebView on a low-end phone can be killed when it allocates too much,
//! and the embedded database driver is one of the heavier things it does.
//! [`MemoryMonitor`] keeps the latest classified sample so the stability
//! host signals can steer favorites traffic to the key-value fallback:
//!
//! ```text
//! ratio = used / limit
//!   > 0.9  critical   (cleanup requested, heavy work refused)
//!   > 0.8  high       (fallback store preferred)
//!   > 0.6  medium
//!   else   low
//! ```

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const CRITICAL_MEMORY_THRESHOLD: f64 = 0.9;
pub const HIGH_MEMORY_THRESHOLD: f64 = 0.8;
pub const MEDIUM_MEMORY_THRESHOLD: f64 = 0.6;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryPressure {
    Low,
    Medium,
    High,
    Critical,
}

impl MemoryPressure {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio > CRITICAL_MEMORY_THRESHOLD {
            MemoryPressure::Critical
        } else if ratio > HIGH_MEMORY_THRESHOLD {
            MemoryPressure::High
        } else if ratio > MEDIUM_MEMORY_THRESHOLD {
            MemoryPressure::Medium
        } else {
            MemoryPressure::Low
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub used_bytes: u64,
    pub limit_bytes: u64,
}

impl MemorySnapshot {
    pub fn ratio(&self) -> Option<f64> {
        if self.limit_bytes == 0 {
            return None;
        }
        Some(self.used_bytes as f64 / self.limit_bytes as f64)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MemoryState {
    pub pressure: MemoryPressure,
    pub is_low_memory: bool,
    pub ratio: Option<f64>,
    pub last_checked: DateTime<Utc>,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            pressure: MemoryPressure::Low,
            is_low_memory: false,
            ratio: None,
            last_checked: Utc::now(),
        }
    }
}

/// Source of memory usage samples.
pub trait MemorySampler: Send + Sync {
    fn sample(&self) -> Option<MemorySnapshot>;
}

/// Resident set size of this process against total system memory.
///
/// Only Linux (and Android) expose `/proc`; elsewhere no sample is taken.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcMemorySampler;

impl ProcMemorySampler {
    fn read_kib(path: &str, field: &str) -> Option<u64> {
        let content = std::fs::read_to_string(path).ok()?;
        parse_kib_field(&content, field)
    }
}

impl MemorySampler for ProcMemorySampler {
    fn sample(&self) -> Option<MemorySnapshot> {
        let used = Self::read_kib("/proc/self/status", "VmRSS")?;
        let limit = Self::read_kib("/proc/meminfo", "MemTotal")?;
        Some(MemorySnapshot {
            used_bytes: used * 1024,
            limit_bytes: limit * 1024,
        })
    }
}

/// Parses lines like `VmRSS:     123456 kB`.
fn parse_kib_field(content: &str, field: &str) -> Option<u64> {
    content
        .lines()
        .find_map(|line| line.strip_prefix(field)?.strip_prefix(':'))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|value| value.parse().ok())
}

pub struct MemoryMonitor {
    state: RwLock<MemoryState>,
    sampler: Arc<dyn MemorySampler>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryMonitor {
    pub fn new(sampler: Arc<dyn MemorySampler>) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            sampler,
            task: Mutex::new(None),
        }
    }

    pub fn current(&self) -> MemoryState {
        self.state.read().clone()
    }

    pub fn is_under_pressure(&self) -> bool {
        self.state.read().pressure >= MemoryPressure::High
    }

    /// Takes one sample now. Returns the new state, or `None` if the sampler had nothing.
    pub fn check(&self) -> Option<MemoryState> {
        let snapshot = self.sampler.sample()?;
        Some(self.record(snapshot))
    }

    pub fn record(&self, snapshot: MemorySnapshot) -> MemoryState {
        let ratio = snapshot.ratio();
        let pressure = ratio.map(MemoryPressure::from_ratio).unwrap_or(MemoryPressure::Low);

        match pressure {
            MemoryPressure::Critical => {
                log::warn!(
                    "Critical memory usage: {:.1}%, requesting cleanup",
                    ratio.unwrap_or_default() * 100.0
                );
            }
            MemoryPressure::High => {
                log::warn!("High memory usage: {:.1}%", ratio.unwrap_or_default() * 100.0);
            }
            _ => {}
        }

        let state = MemoryState {
            pressure,
            is_low_memory: ratio.map(|r| r > HIGH_MEMORY_THRESHOLD).unwrap_or(false),
            ratio,
            last_checked: Utc::now(),
        };
        *self.state.write() = state.clone();
        state
    }

    /// Samples every `interval` until [`stop`](Self::stop) is called or the
    /// monitor is dropped. Restarting replaces the old task.
    pub fn start(self: &Arc<Self>, interval: Duration) {
        let monitor = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(monitor) = monitor.upgrade() else {
                    break;
                };
                monitor.check();
            }
            log::debug!("Memory monitor dropped, sampling task exiting");
        });

        if let Some(previous) = self.task.lock().replace(handle) {
            previous.abort();
        }
        log::info!("Memory monitoring started (every {:?})", interval);
    }

    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
            log::info!("Memory monitoring stopped");
        }
    }
}

impl Drop for MemoryMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}
