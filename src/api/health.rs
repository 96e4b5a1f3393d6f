//! Shared health state for the /health endpoint.
//! Updated by the scheduler, read by the API listener.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::store::persistence::now_ns;
use crate::types::CycleReport;

/// Health metrics. Written by the scheduler, read by operational tooling
/// through the HTTP surface — never consulted by the core's own logic.
#[derive(Default)]
pub struct HealthState {
    /// True while the scheduler loop is running.
    polling_up: AtomicBool,
    /// Failure count (fetch + dispatch) of the most recent completed cycle.
    last_cycle_failures: AtomicU64,
    cycles_completed: AtomicU64,
    total_found: AtomicU64,
    total_notified: AtomicU64,
    /// Nanosecond timestamp of the last completed cycle (0 = none yet).
    last_cycle_at_ns: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_polling(&self, up: bool) {
        self.polling_up.store(up, Ordering::Relaxed);
    }

    pub fn record_cycle(&self, report: &CycleReport) {
        self.last_cycle_failures.store(report.failures(), Ordering::Relaxed);
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.total_found.fetch_add(report.found, Ordering::Relaxed);
        self.total_notified.fetch_add(report.notified, Ordering::Relaxed);
        self.last_cycle_at_ns.store(now_ns(), Ordering::Relaxed);
    }

    pub fn polling_up(&self) -> bool {
        self.polling_up.load(Ordering::Relaxed)
    }

    pub fn last_cycle_failures(&self) -> u64 {
        self.last_cycle_failures.load(Ordering::Relaxed)
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::Relaxed)
    }

    pub fn total_found(&self) -> u64 {
        self.total_found.load(Ordering::Relaxed)
    }

    pub fn total_notified(&self) -> u64 {
        self.total_notified.load(Ordering::Relaxed)
    }

    pub fn last_cycle_at_ns(&self) -> u64 {
        self.last_cycle_at_ns.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_cycle_accumulates_and_overwrites() {
        let h = HealthState::new();
        assert!(!h.polling_up());

        h.set_polling(true);
        h.record_cycle(&CycleReport {
            found: 3,
            notified: 2,
            fetch_failures: 1,
            dispatch_failures: 1,
        });
        h.record_cycle(&CycleReport {
            found: 1,
            notified: 1,
            fetch_failures: 0,
            dispatch_failures: 0,
        });

        assert_eq!(h.cycles_completed(), 2);
        assert_eq!(h.total_found(), 4);
        assert_eq!(h.total_notified(), 3);
        // last_cycle_failures reflects the latest cycle only.
        assert_eq!(h.last_cycle_failures(), 0);
        assert!(h.last_cycle_at_ns() > 0);
    }
}
