//! Metric values produced by readers.
//!
//! Ratios are fractions in `0.0..=1.0`, sizes are bytes and rates are bytes
//! per second.

/// Aggregated processor load for one sample.
///
/// Sources that cannot split kernel from user time leave `system` and `user`
/// at zero.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CpuLoad {
    /// Share of time spent in kernel code.
    pub system: f64,
    /// Share of time spent in user code.
    pub user: f64,
    /// Share of idle time.
    pub idle: f64,
    /// Overall usage across all cores.
    pub total_usage: f64,
    /// Usage of each logical core, in core order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub per_core: Vec<f64>,
}

impl CpuLoad {
    /// Number of logical cores in the sample.
    pub fn cores(&self) -> usize {
        self.per_core.len()
    }

    /// The busiest core, if any core was sampled.
    pub fn hottest_core(&self) -> Option<(usize, f64)> {
        self.per_core
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Swap space accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SwapUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

/// Physical memory accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemoryUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    /// Memory held by applications.
    pub app: u64,
    /// Memory that cannot be paged out.
    pub wired: u64,
    /// Memory held in compressed form.
    pub compressed: u64,
    pub swap: SwapUsage,
}

impl MemoryUsage {
    /// Used share of physical memory, `(total - free) / total`.
    pub fn usage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.total.saturating_sub(self.free) as f64 / self.total as f64
    }

    /// Free share of physical memory.
    pub fn free_ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.free as f64 / self.total as f64
    }
}

/// Capacity and throughput of one mounted volume.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiskUsage {
    pub name: String,
    pub mount_point: String,
    pub total: u64,
    pub free: u64,
    /// Bytes read per second since the previous sample, zero when unknown.
    #[cfg_attr(feature = "serde", serde(default))]
    pub read_rate: u64,
    /// Bytes written per second since the previous sample, zero when unknown.
    #[cfg_attr(feature = "serde", serde(default))]
    pub write_rate: u64,
}

impl DiskUsage {
    /// Used share of the volume.
    pub fn usage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.total.saturating_sub(self.free) as f64 / self.total as f64
    }
}

/// Throughput of the active network interface.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NetworkUsage {
    pub interface: String,
    /// Bytes sent per second.
    pub upload: u64,
    /// Bytes received per second.
    pub download: u64,
    /// Bytes sent since the reader started.
    pub total_upload: u64,
    /// Bytes received since the reader started.
    pub total_download: u64,
}

/// One row of a top-processes list.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
    /// CPU usage in percent of one core.
    pub cpu: f64,
    /// Resident memory in bytes.
    pub memory: u64,
}
