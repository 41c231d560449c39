use std::{collections::BTreeMap, fmt::Write as _, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Task execution counters shared by every user of a run.
#[derive(Clone)]
pub struct RequestStats {
    inner: Arc<Mutex<StatsInner>>,
}

struct StatsInner {
    start_time: DateTime<Utc>,
    entries: BTreeMap<String, StatsEntry>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsEntry {
    pub num_executions: u64,
    pub num_failures: u64,
    pub last_execution: Option<DateTime<Utc>>,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StatsInner {
                start_time: Utc::now(),
                entries: BTreeMap::new(),
            })),
        }
    }

    pub fn log_execution(&self, task: &str) {
        let mut inner = self.inner.lock();
        let entry = inner.entries.entry(task.to_string()).or_default();
        entry.num_executions += 1;
        entry.last_execution = Some(Utc::now());
    }

    pub fn log_failure(&self, task: &str) {
        let mut inner = self.inner.lock();
        let entry = inner.entries.entry(task.to_string()).or_default();
        entry.num_failures += 1;
        entry.last_execution = Some(Utc::now());
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.start_time = Utc::now();
        inner.entries.clear();
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.lock();
        let elapsed = (Utc::now() - inner.start_time).num_milliseconds().max(0) as f64 / 1000.0;
        let entries = inner
            .entries
            .iter()
            .map(|(name, entry)| StatsRow {
                name: name.clone(),
                num_executions: entry.num_executions,
                num_failures: entry.num_failures,
                executions_per_sec: per_second(entry.num_executions, elapsed),
            })
            .collect();
        StatsSnapshot {
            start_time: inner.start_time,
            elapsed_secs: elapsed,
            entries,
        }
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

fn per_second(count: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs > 0.0 {
        count as f64 / elapsed_secs
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsRow {
    pub name: String,
    pub num_executions: u64,
    pub num_failures: u64,
    pub executions_per_sec: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub start_time: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub entries: Vec<StatsRow>,
}

impl StatsSnapshot {
    pub fn total_executions(&self) -> u64 {
        self.entries.iter().map(|e| e.num_executions).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.entries.iter().map(|e| e.num_failures).sum()
    }

    /// Console table, busiest task first.
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            " {:<40} {:>10} {:>10} {:>10}",
            "Name", "# execs", "# fails", "exec/s"
        );
        let _ = writeln!(out, "{}", "-".repeat(75));
        for row in self
            .entries
            .iter()
            .sorted_by(|a, b| b.num_executions.cmp(&a.num_executions).then(a.name.cmp(&b.name)))
        {
            let _ = writeln!(
                out,
                " {:<40} {:>10} {:>10} {:>10.2}",
                row.name, row.num_executions, row.num_failures, row.executions_per_sec
            );
        }
        let _ = writeln!(out, "{}", "-".repeat(75));
        let _ = write!(
            out,
            " {:<40} {:>10} {:>10} {:>10.2}",
            "Total",
            self.total_executions(),
            self.total_failures(),
            per_second(self.total_executions(), self.elapsed_secs)
        );
        out
    }
}

/// Print the stats table every `interval` until cancelled.
pub async fn print_stats(stats: RequestStats, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                println!("{}\n", stats.snapshot().render_table());
            }
        }
    }
    tracing::debug!("stats printer stopped");
}
