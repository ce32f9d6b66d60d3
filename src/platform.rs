use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::memory::{MemoryMonitor, MemoryPressure, MemoryState};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    Web,
    Desktop,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "android") {
            Platform::Android
        } else if cfg!(target_os = "ios") {
            Platform::Ios
        } else if cfg!(target_arch = "wasm32") {
            Platform::Web
        } else {
            Platform::Desktop
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Web => "web",
            Platform::Desktop => "desktop",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            "web" => Ok(Platform::Web),
            "desktop" | "electron" => Ok(Platform::Desktop),
            other => Err(format!("Unknown platform: {}", other)),
        }
    }
}

/// Snapshot logged around relational operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugInfo {
    pub platform: Platform,
    pub user_agent: String,
    pub is_emulator: bool,
    pub prevent_heavy_operations: bool,
    pub memory: Option<MemoryState>,
    pub timestamp: DateTime<Utc>,
}

/// What the favorites store needs to know about the host it runs on.
pub trait HostSignals: Send + Sync {
    fn platform(&self) -> Platform;

    /// Web only: whether the in-page persistence element has been mounted.
    fn persistence_element_ready(&self) -> bool {
        true
    }

    /// Polled before every relational attempt.
    fn should_use_fallback(&self) -> bool;

    /// Bulk work (imports, migrations) should be deferred while this holds.
    fn should_prevent_heavy_operations(&self) -> bool {
        false
    }

    fn debug_info(&self) -> DebugInfo {
        DebugInfo {
            platform: self.platform(),
            user_agent: String::new(),
            is_emulator: false,
            prevent_heavy_operations: self.should_prevent_heavy_operations(),
            memory: None,
            timestamp: Utc::now(),
        }
    }
}

pub fn is_emulator(platform: Platform, user_agent: &str, host_name: &str) -> bool {
    platform == Platform::Android
        && (user_agent.contains("Emulator")
            || user_agent.contains("Android SDK")
            || user_agent.contains("unknown")
            || host_name == "localhost")
}

pub fn default_user_agent() -> String {
    format!(
        "mealmates/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Host signals backed by the platform setting, a memory monitor and emulator heuristics.
pub struct DeviceSignals {
    platform: Platform,
    user_agent: String,
    host_name: String,
    fallback_on_emulator: bool,
    memory: Arc<MemoryMonitor>,
    persistence_ready: AtomicBool,
}

impl DeviceSignals {
    pub fn new(platform: Platform, memory: Arc<MemoryMonitor>) -> Self {
        Self {
            platform,
            user_agent: default_user_agent(),
            host_name: String::new(),
            fallback_on_emulator: false,
            memory,
            persistence_ready: AtomicBool::new(platform != Platform::Web),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_host_name(mut self, host_name: impl Into<String>) -> Self {
        self.host_name = host_name.into();
        self
    }

    pub fn with_fallback_on_emulator(mut self, enabled: bool) -> Self {
        self.fallback_on_emulator = enabled;
        self
    }

    /// Called by the web shell once the persistence element is in the page.
    pub fn mark_persistence_ready(&self) {
        self.persistence_ready.store(true, Ordering::SeqCst);
    }

    pub fn is_emulator(&self) -> bool {
        is_emulator(self.platform, &self.user_agent, &self.host_name)
    }

}

impl HostSignals for DeviceSignals {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn persistence_element_ready(&self) -> bool {
        self.persistence_ready.load(Ordering::SeqCst)
    }

    fn should_use_fallback(&self) -> bool {
        if self.is_emulator() {
            log::warn!("Android emulator detected (fallback on emulator: {})", self.fallback_on_emulator);
            if self.fallback_on_emulator {
                return true;
            }
        }

        if self.memory.is_under_pressure() {
            let ratio = self.memory.current().ratio.unwrap_or_default();
            log::warn!("Using fallback store due to high memory usage ({:.1}%)", ratio * 100.0);
            return true;
        }

        false
    }

    fn should_prevent_heavy_operations(&self) -> bool {
        self.memory.current().pressure == MemoryPressure::Critical
            || (self.platform == Platform::Android && self.should_use_fallback())
    }

    fn debug_info(&self) -> DebugInfo {
        DebugInfo {
            platform: self.platform,
            user_agent: self.user_agent.clone(),
            is_emulator: self.is_emulator(),
            prevent_heavy_operations: self.should_prevent_heavy_operations(),
            memory: Some(self.memory.current()),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemorySnapshot, ProcMemorySampler};

    fn monitor() -> Arc<MemoryMonitor> {
        Arc::new(MemoryMonitor::new(Arc::new(ProcMemorySampler)))
    }

    #[test]
    fn test_platform_parse() {
        assert_eq!("Android".parse::<Platform>().unwrap(), Platform::Android);
        assert_eq!(" web ".parse::<Platform>().unwrap(), Platform::Web);
        assert_eq!("electron".parse::<Platform>().unwrap(), Platform::Desktop);
        assert!("symbian".parse::<Platform>().is_err());
        assert_eq!(Platform::Ios.to_string(), "ios");
    }

    #[test]
    fn test_emulator_detection() {
        assert!(is_emulator(Platform::Android, "Mozilla/5.0 (Linux; Android SDK built for x86)", ""));
        assert!(is_emulator(Platform::Android, "Mozilla/5.0", "localhost"));
        assert!(!is_emulator(Platform::Android, "Mozilla/5.0 (Linux; Pixel 7)", "app"));
        assert!(!is_emulator(Platform::Ios, "Emulator", "localhost"));
    }

    #[test]
    fn test_emulator_stays_on_relational_by_default() {
        let host = DeviceSignals::new(Platform::Android, monitor()).with_host_name("localhost");
        assert!(host.is_emulator());
        assert!(!host.should_use_fallback());

        let host = host.with_fallback_on_emulator(true);
        assert!(host.should_use_fallback());
    }

    #[test]
    fn test_high_memory_forces_fallback() {
        let memory = monitor();
        let host = DeviceSignals::new(Platform::Android, memory.clone());
        assert!(!host.should_use_fallback());

        memory.record(MemorySnapshot {
            used_bytes: 81,
            limit_bytes: 100,
        });
        assert!(host.should_use_fallback());
        assert!(host.should_prevent_heavy_operations());
    }

    #[test]
    fn test_critical_memory_prevents_heavy_operations_anywhere() {
        let memory = monitor();
        let host = DeviceSignals::new(Platform::Desktop, memory.clone());
        memory.record(MemorySnapshot {
            used_bytes: 99,
            limit_bytes: 100,
        });
        assert!(host.should_prevent_heavy_operations());
    }

    #[test]
    fn test_debug_info_serializes_host_details() {
        let memory = monitor();
        memory.record(MemorySnapshot {
            used_bytes: 95,
            limit_bytes: 100,
        });
        let host = DeviceSignals::new(Platform::Android, memory)
            .with_user_agent("Mozilla/5.0 (Linux; Android 14; Emulator)");

        let json = serde_json::to_value(host.debug_info()).unwrap();

        assert_eq!(json["platform"], "android");
        assert_eq!(json["is_emulator"], true);
        assert_eq!(json["prevent_heavy_operations"], true);
        assert_eq!(json["memory"]["pressure"], "critical");
        let checked = json["memory"]["last_checked"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(checked).is_ok());
    }

    #[test]
    fn test_web_waits_for_persistence_element() {
        let host = DeviceSignals::new(Platform::Web, monitor());
        assert!(!host.persistence_element_ready());

        host.mark_persistence_ready();
        assert!(host.persistence_element_ready());

        let native = DeviceSignals::new(Platform::Ios, monitor());
        assert!(native.persistence_element_ready());
    }
}
