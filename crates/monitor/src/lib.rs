//! Resource monitor
//!
//! Samples process-host memory pressure and recommends a concurrency width
//! for the next batch of work. Re-evaluated before every batch so the
//! scheduler adapts as memory is released between batches.

use std::sync::Mutex;
use sysinfo::System;
use tracing::debug;

/// Pressure thresholds, in percent of total memory in use
#[derive(Debug, Clone, Copy)]
pub struct PressureThresholds {
    /// Above this, the base batch size is halved (minimum 1)
    pub high: f64,
    /// Above this (and at or below `high`), the base size is used unchanged;
    /// below it the base size is doubled
    pub medium: f64,
}

impl Default for PressureThresholds {
    fn default() -> Self {
        Self {
            high: 80.0,
            medium: 60.0,
        }
    }
}

/// Source of a concurrency recommendation for the next unit of work
pub trait ResourceMonitor: Send + Sync {
    /// Current memory pressure as a percentage of total memory
    fn current_pressure(&self) -> f64;

    /// Batch size to use for the next batch, derived from current pressure
    fn recommended_batch_size(&self, base: usize) -> usize {
        let pressure = self.current_pressure();
        let thresholds = self.thresholds();
        let size = if pressure > thresholds.high {
            (base / 2).max(1)
        } else if pressure > thresholds.medium {
            base
        } else {
            base * 2
        };
        debug!(pressure, base, size, "Recommended batch size");
        size
    }

    fn thresholds(&self) -> PressureThresholds {
        PressureThresholds::default()
    }
}

/// Monitor backed by live system memory statistics
pub struct MemoryMonitor {
    system: Mutex<System>,
    thresholds: PressureThresholds,
}

impl MemoryMonitor {
    #[must_use]
    pub fn new(thresholds: PressureThresholds) -> Self {
        Self {
            system: Mutex::new(System::new()),
            thresholds,
        }
    }
}

impl Default for MemoryMonitor {
    fn default() -> Self {
        Self::new(PressureThresholds::default())
    }
}

impl ResourceMonitor for MemoryMonitor {
    fn current_pressure(&self) -> f64 {
        let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return 0.0;
        }
        (system.used_memory() as f64 / total as f64) * 100.0
    }

    fn thresholds(&self) -> PressureThresholds {
        self.thresholds
    }
}

/// Monitor reporting a fixed pressure, for tests and manual tuning
pub struct FixedMonitor {
    pub pressure: f64,
}

impl FixedMonitor {
    #[must_use]
    pub fn new(pressure: f64) -> Self {
        Self { pressure }
    }
}

impl ResourceMonitor for FixedMonitor {
    fn current_pressure(&self) -> f64 {
        self.pressure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_pressure_halves_base() {
        let monitor = FixedMonitor::new(85.0);
        assert_eq!(monitor.recommended_batch_size(8), 4);
        assert_eq!(monitor.recommended_batch_size(1), 1);
    }

    #[test]
    fn test_medium_pressure_keeps_base() {
        let monitor = FixedMonitor::new(70.0);
        assert_eq!(monitor.recommended_batch_size(8), 8);
    }

    #[test]
    fn test_low_pressure_doubles_base() {
        let monitor = FixedMonitor::new(30.0);
        assert_eq!(monitor.recommended_batch_size(8), 16);
    }

    #[test]
    fn test_threshold_boundaries_are_exclusive() {
        // Exactly at a threshold belongs to the band below it
        assert_eq!(FixedMonitor::new(80.0).recommended_batch_size(8), 8);
        assert_eq!(FixedMonitor::new(60.0).recommended_batch_size(8), 16);
    }

    #[test]
    fn test_memory_monitor_reports_sane_pressure() {
        let monitor = MemoryMonitor::default();
        let pressure = monitor.current_pressure();
        assert!((0.0..=100.0).contains(&pressure));
    }
}
