use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::movement::{MovementDetector, PriceBaseline};
use crate::source::{FetchError, QuoteSource};
use crate::stats::Stats;
use crate::writer::SnapshotWriter;

const MAX_SAMPLES: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub quotes: usize,
    pub movements: usize,
    pub significant: usize,
    pub snapshot_written: bool,
    pub movement_write_failures: usize,
    pub samples: Vec<String>,
}

#[derive(Debug)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Nothing was detected or written; the baseline is as it was.
    FetchFailed(FetchError),
}

impl CycleOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CycleOutcome::Completed(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct PollerOptions {
    pub poll_interval: Duration,
    pub stats_log_sec: u64,
    pub stats_jsonl_path: Option<String>,
}

/// Owns the baseline and drives fetch → detect → persist, one cycle at a time.
pub struct Poller {
    source: Arc<dyn QuoteSource>,
    detector: MovementDetector,
    writer: SnapshotWriter,
    baseline: PriceBaseline,
    stats: Arc<Stats>,
    opts: PollerOptions,
}

impl Poller {
    pub fn new(
        source: Arc<dyn QuoteSource>,
        detector: MovementDetector,
        writer: SnapshotWriter,
        stats: Arc<Stats>,
        opts: PollerOptions,
    ) -> Self {
        Self {
            source,
            detector,
            writer,
            baseline: PriceBaseline::new(),
            stats,
            opts,
        }
    }

    pub fn baseline(&self) -> &PriceBaseline {
        &self.baseline
    }

    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.stats.inc_cycle();

        let quotes = match self.source.fetch_quotes().await {
            Ok(q) => q,
            Err(e) => {
                self.stats.inc_fetch_failure();
                tracing::error!(error = %e, "fetch failed; skipping cycle");
                return CycleOutcome::FetchFailed(e);
            }
        };

        let now = Utc::now();
        let movements = self.detector.detect(&quotes, &mut self.baseline, now);
        let significant = movements.iter().filter(|m| m.significant).count();

        for m in movements.iter().filter(|m| m.significant) {
            tracing::warn!(
                ticker = %m.ticker,
                name = %m.display_name,
                prev = %m.previous_price,
                curr = %m.current_price,
                diff = %m.difference,
                "significant move"
            );
        }

        let written = self.writer.persist(&quotes, &movements, now).await;

        self.stats.set_quotes_last_cycle(quotes.len() as u64);
        self.stats.add_movements(movements.len() as u64, significant as u64);
        if !written.snapshot_written {
            self.stats.inc_snapshot_write_failure();
        }
        self.stats.add_movement_write_failures(written.movement_write_failures as u64);

        let report = CycleReport {
            quotes: quotes.len(),
            movements: movements.len(),
            significant,
            snapshot_written: written.snapshot_written,
            movement_write_failures: written.movement_write_failures,
            samples: movements.iter().take(MAX_SAMPLES).map(|m| m.sample_line()).collect(),
        };

        tracing::info!(
            markets = report.quotes,
            movers = report.movements,
            significant = report.significant,
            tracked = self.baseline.len(),
            snapshot_written = report.snapshot_written,
            samples = ?report.samples,
            "cycle complete"
        );

        CycleOutcome::Completed(report)
    }

    /// Runs until the process is killed. The interval is measured from the end
    /// of one cycle to the start of the next.
    pub async fn run(mut self) {
        loop {
            self.run_cycle().await;
            self.maybe_log_stats().await;
            tokio::time::sleep(self.opts.poll_interval).await;
        }
    }

    async fn maybe_log_stats(&self) {
        let t = now_ms();
        if !self.stats.should_log(t, self.opts.stats_log_sec) {
            return;
        }
        let ss = self.stats.snapshot(t);
        self.stats.mark_logged(t);

        tracing::info!(
            up_sec = ss.up_sec,
            cycles = ss.cycles,
            fetch_failures = ss.fetch_failures,
            quotes_last_cycle = ss.quotes_last_cycle,
            movements = ss.movements,
            significant_movements = ss.significant_movements,
            snapshot_write_failures = ss.snapshot_write_failures,
            movement_write_failures = ss.movement_write_failures,
            "stats"
        );

        let line = serde_json::to_string(&ss).unwrap_or_default();
        maybe_write_jsonl(&self.opts.stats_jsonl_path, &line).await;
    }
}

fn now_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

async fn maybe_write_jsonl(path: &Option<String>, line: &str) {
    use tokio::io::AsyncWriteExt;

    let Some(p) = path.as_deref().map(str::trim).filter(|x| !x.is_empty()) else {
        return;
    };
    let mut f = match tokio::fs::OpenOptions::new().create(true).append(true).open(p).await {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!(path = %p, error = %e, "stats jsonl open failed");
            return;
        }
    };
    if let Err(e) = f.write_all(format!("{}\n", line).as_bytes()).await {
        tracing::debug!(path = %p, error = %e, "stats jsonl write failed");
    }
}
