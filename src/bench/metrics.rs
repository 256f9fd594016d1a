//! Per-job latency metrics for one benchmark run.
//!
//! Workers record each job's wall-clock duration as it finishes; the run
//! takes a snapshot once the pool has drained. Percentiles are computed
//! over every recorded job (a run has at most a few thousand jobs, so no
//! rolling window is needed).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

/// Jobs taking at least this long are logged at debug level.
pub const SLOW_JOB_THRESHOLD: Duration = Duration::from_millis(250);

/// Thread-safe job metrics collector.
///
/// Shared (in an `Arc`) by all workers of a run.
#[derive(Debug, Default)]
pub struct JobMetrics {
    committed: AtomicU64,
    failed: AtomicU64,
    slow: AtomicU64,
    /// Latencies of committed jobs in microseconds.
    latencies_us: Mutex<Vec<u64>>,
}

/// Point-in-time view of `JobMetrics`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobMetricsSnapshot {
    pub jobs_committed: u64,
    pub jobs_failed: u64,
    pub slow_jobs: u64,
    pub job_p50_us: u64,
    pub job_p95_us: u64,
    pub job_p99_us: u64,
    pub job_max_us: u64,
    pub job_avg_us: u64,
}

impl JobMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a committed job and how long it took.
    pub fn record_committed(&self, job_id: usize, elapsed: Duration) {
        self.committed.fetch_add(1, Ordering::Relaxed);
        let micros = elapsed.as_micros().min(u64::MAX as u128) as u64;
        self.latencies_us.lock().unwrap().push(micros);

        if elapsed >= SLOW_JOB_THRESHOLD {
            self.slow.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("slow job {}: {}ms", job_id, elapsed.as_millis());
        }
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> JobMetricsSnapshot {
        let (p50, p95, p99, max, avg) = {
            let latencies = self.latencies_us.lock().unwrap();
            if latencies.is_empty() {
                (0, 0, 0, 0, 0)
            } else {
                let mut sorted = latencies.clone();
                sorted.sort_unstable();

                let len = sorted.len();
                let sum: u128 = sorted.iter().map(|&v| v as u128).sum();
                (
                    sorted[len * 50 / 100],
                    sorted[len * 95 / 100],
                    sorted.get(len * 99 / 100).copied().unwrap_or(sorted[len - 1]),
                    sorted[len - 1],
                    (sum / len as u128) as u64,
                )
            }
        };

        JobMetricsSnapshot {
            jobs_committed: self.committed.load(Ordering::Relaxed),
            jobs_failed: self.failed.load(Ordering::Relaxed),
            slow_jobs: self.slow.load(Ordering::Relaxed),
            job_p50_us: p50,
            job_p95_us: p95,
            job_p99_us: p99,
            job_max_us: max,
            job_avg_us: avg,
        }
    }
}
