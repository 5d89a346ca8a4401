use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct Stats {
    start_ms: AtomicU64,
    last_log_ms: AtomicU64,

    cycles: AtomicU64,
    fetch_failures: AtomicU64,
    quotes_last_cycle: AtomicU64,

    movements: AtomicU64,
    significant_movements: AtomicU64,

    snapshot_write_failures: AtomicU64,
    movement_write_failures: AtomicU64,
}

impl Stats {
    pub fn new(now_ms: u64) -> Arc<Self> {
        let s = Arc::new(Self::default());
        s.start_ms.store(now_ms, Ordering::Relaxed);
        s.last_log_ms.store(now_ms, Ordering::Relaxed);
        s
    }

    pub fn inc_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_quotes_last_cycle(&self, n: u64) {
        self.quotes_last_cycle.store(n, Ordering::Relaxed);
    }

    pub fn add_movements(&self, total: u64, significant: u64) {
        self.movements.fetch_add(total, Ordering::Relaxed);
        self.significant_movements.fetch_add(significant, Ordering::Relaxed);
    }

    pub fn inc_snapshot_write_failure(&self) {
        self.snapshot_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_movement_write_failures(&self, n: u64) {
        self.movement_write_failures.fetch_add(n, Ordering::Relaxed);
    }

    pub fn should_log(&self, now_ms: u64, every_sec: u64) -> bool {
        if every_sec == 0 { return false; }
        let last = self.last_log_ms.load(Ordering::Relaxed);
        now_ms.saturating_sub(last) >= every_sec.saturating_mul(1000)
    }

    pub fn mark_logged(&self, now_ms: u64) {
        self.last_log_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self, now_ms: u64) -> StatsSnapshot {
        let start = self.start_ms.load(Ordering::Relaxed);
        StatsSnapshot {
            now_ms,
            up_sec: now_ms.saturating_sub(start) / 1000,
            cycles: self.cycles.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            quotes_last_cycle: self.quotes_last_cycle.load(Ordering::Relaxed),
            movements: self.movements.load(Ordering::Relaxed),
            significant_movements: self.significant_movements.load(Ordering::Relaxed),
            snapshot_write_failures: self.snapshot_write_failures.load(Ordering::Relaxed),
            movement_write_failures: self.movement_write_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub now_ms: u64,
    pub up_sec: u64,
    pub cycles: u64,
    pub fetch_failures: u64,
    pub quotes_last_cycle: u64,
    pub movements: u64,
    pub significant_movements: u64,
    pub snapshot_write_failures: u64,
    pub movement_write_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_period() {
        let s = Stats::new(1_000);
        assert!(!s.should_log(30_000, 60));
        assert!(s.should_log(61_000, 60));
        s.mark_logged(61_000);
        assert!(!s.should_log(62_000, 60));
        assert!(!s.should_log(1_000_000, 0));
    }

    #[test]
    fn counters_accumulate() {
        let s = Stats::new(0);
        s.inc_cycle();
        s.inc_cycle();
        s.inc_fetch_failure();
        s.add_movements(3, 1);
        s.add_movements(2, 2);
        s.set_quotes_last_cycle(12);
        let snap = s.snapshot(5_500);
        assert_eq!(snap.up_sec, 5);
        assert_eq!(snap.cycles, 2);
        assert_eq!(snap.fetch_failures, 1);
        assert_eq!(snap.movements, 5);
        assert_eq!(snap.significant_movements, 3);
        assert_eq!(snap.quotes_last_cycle, 12);
    }
}
