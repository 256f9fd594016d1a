//! Host probe logged before a sweep so results can be compared across
//! machines.

use serde::Serialize;
use sysinfo::{MemoryRefreshKind, RefreshKind, System};

const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Snapshot of the machine running the benchmark.
#[derive(Debug, Clone, Serialize)]
pub struct HostResources {
    pub total_memory_bytes: u64,
    pub available_memory_bytes: u64,
    /// Logical CPU count.
    pub cpu_count: usize,
    pub os_version: Option<String>,
}

impl HostResources {
    pub fn detect() -> Self {
        let mut sys = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::everything()),
        );
        sys.refresh_memory();

        let cpu_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            total_memory_bytes: sys.total_memory(),
            available_memory_bytes: sys.available_memory(),
            cpu_count,
            os_version: System::long_os_version(),
        }
    }

    /// Worker threads per logical CPU.
    pub fn oversubscription(&self, threads: usize) -> f64 {
        threads as f64 / self.cpu_count.max(1) as f64
    }

    /// One-line description for the sweep banner.
    pub fn summary(&self) -> String {
        format!(
            "{} cpus, {:.1}/{:.1} GB memory available, {}",
            self.cpu_count,
            self.available_memory_bytes as f64 / GB,
            self.total_memory_bytes as f64 / GB,
            self.os_version.as_deref().unwrap_or("unknown os"),
        )
    }
}
