//! Processor load and the busiest processes.

use std::ffi::OsStr;
use std::sync::Arc;

use statwatch_kit::{
    MetricPayload, MetricSource, Module, ModuleConfig, Notifications, Reader, WidgetKind,
};
use statwatch_types::{CpuLoad, ProcessEntry};
use sysinfo::{ProcessesToUpdate, System};
use tracing::debug;

use crate::error::Result;
use crate::percent;
use crate::wiring::Wiring;

/// Rows kept by [`TopProcessesSource`] unless told otherwise.
pub const DEFAULT_TOP_PROCESSES: usize = 8;

const TOTAL_USAGE_ID: &str = "totalUsage";

/// Samples overall and per-core CPU usage.
///
/// The first sample after construction has no baseline, so `setup` takes one
/// and discards it.
pub struct CpuSource {
    system: System,
}

impl CpuSource {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for CpuSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for CpuSource {
    type Value = CpuLoad;

    fn setup(&mut self) {
        self.system.refresh_cpu_usage();
    }

    fn read(&mut self) -> Option<CpuLoad> {
        self.system.refresh_cpu_usage();
        let usages: Vec<f32> = self.system.cpus().iter().map(|cpu| cpu.cpu_usage()).collect();
        load_from_percentages(&usages)
    }
}

/// Convert per-core percentages into a [`CpuLoad`] of fractions.
fn load_from_percentages(usages: &[f32]) -> Option<CpuLoad> {
    if usages.is_empty() {
        return None;
    }
    let per_core: Vec<f64> = usages
        .iter()
        .map(|usage| (f64::from(*usage) / 100.0).clamp(0.0, 1.0))
        .collect();
    let total_usage = per_core.iter().sum::<f64>() / per_core.len() as f64;

    Some(CpuLoad {
        system: 0.0,
        user: 0.0,
        idle: 1.0 - total_usage,
        total_usage,
        per_core,
    })
}

/// Lists the processes using the most CPU.
pub struct TopProcessesSource {
    system: System,
    limit: usize,
}

impl TopProcessesSource {
    pub fn new(limit: usize) -> Self {
        Self {
            system: System::new(),
            limit,
        }
    }
}

impl MetricSource for TopProcessesSource {
    type Value = Vec<ProcessEntry>;

    fn setup(&mut self) {
        self.system.refresh_processes(ProcessesToUpdate::All);
    }

    fn read(&mut self) -> Option<Vec<ProcessEntry>> {
        if self.limit == 0 {
            return None;
        }
        self.system.refresh_processes(ProcessesToUpdate::All);
        let entries = self
            .system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessEntry {
                pid: pid.as_u32(),
                name: OsStr::new(process.name()).to_string_lossy().into_owned(),
                cpu: f64::from(process.cpu_usage()),
                memory: process.memory(),
            })
            .collect();
        let top = busiest(entries, self.limit);
        (!top.is_empty()).then_some(top)
    }
}

/// The `limit` entries with the highest CPU usage, busiest first.
///
/// Ties are broken by memory so the order is stable between samples.
pub(crate) fn busiest(mut entries: Vec<ProcessEntry>, limit: usize) -> Vec<ProcessEntry> {
    entries.sort_by(|a, b| {
        b.cpu
            .total_cmp(&a.cpu)
            .then_with(|| b.memory.cmp(&a.memory))
    });
    entries.truncate(limit);
    entries
}

/// The CPU module: a load reader feeding widgets and a popup-only process list.
pub struct CpuModule {
    module: Arc<Module>,
    load: Reader<CpuLoad>,
    processes: Reader<Vec<ProcessEntry>>,
    notifications: Arc<Notifications>,
}

impl CpuModule {
    pub const NAME: &'static str = "CPU";

    pub fn default_config() -> ModuleConfig {
        ModuleConfig::new(Self::NAME)
            .default_state(true)
            .widget(WidgetKind::Mini, true)
            .widget(WidgetKind::LineChart, false)
            .widget(WidgetKind::BarChart, false)
            .widget(WidgetKind::PieChart, false)
            .widget(WidgetKind::Tachometer, false)
    }

    /// Wire the module to the host's processors.
    pub fn new(config: ModuleConfig, wiring: &Wiring) -> Result<Self> {
        Self::with_sources(
            config,
            wiring,
            CpuSource::new(),
            TopProcessesSource::new(DEFAULT_TOP_PROCESSES),
        )
    }

    /// Wire the module to arbitrary sources.
    pub fn with_sources<L, P>(config: ModuleConfig, wiring: &Wiring, load: L, processes: P) -> Result<Self>
    where
        L: MetricSource<Value = CpuLoad>,
        P: MetricSource<Value = Vec<ProcessEntry>>,
    {
        let module = Module::new(config, wiring.ctx.clone());
        let name = module.name().to_string();
        let notifications =
            module.attach_notifications(wiring.notifications(&name), &[TOTAL_USAGE_ID]);

        let weak = Arc::downgrade(&module);
        let notes = notifications.clone();
        let load = wiring
            .reader(&name, "load", load)
            .on_ready(module.ready_hook("load"))
            .handler(move |value: &CpuLoad| {
                let Some(module) = weak.upgrade() else {
                    return;
                };
                for payload in load_payloads(value) {
                    module.deliver(&payload);
                }
                if let Some(level) = notes.level(TOTAL_USAGE_ID) {
                    let subtitle = format!("Total usage is {}%", percent(value.total_usage));
                    notes.check_double(
                        TOTAL_USAGE_ID,
                        value.total_usage,
                        level,
                        "CPU usage threshold",
                        Some(&subtitle),
                        false,
                    );
                }
            })
            .build()?;

        let weak = Arc::downgrade(&module);
        let processes = wiring
            .reader(&name, "processes", processes)
            .popup(true)
            .handler(move |list: &Vec<ProcessEntry>| {
                if let Some(module) = weak.upgrade() {
                    module.deliver_popup(&MetricPayload::Processes(list.clone()));
                }
            })
            .build()?;

        module.add_reader(load.clone());
        module.add_reader(processes.clone());
        debug!(module = %name, "CPU module wired");

        Ok(Self {
            module,
            load,
            processes,
            notifications,
        })
    }

    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub fn load(&self) -> &Reader<CpuLoad> {
        &self.load
    }

    pub fn processes(&self) -> &Reader<Vec<ProcessEntry>> {
        &self.processes
    }

    pub fn notifications(&self) -> &Arc<Notifications> {
        &self.notifications
    }
}

/// Widget payloads for one load sample.
pub(crate) fn load_payloads(load: &CpuLoad) -> [MetricPayload; 2] {
    [
        MetricPayload::Percentage(load.total_usage),
        MetricPayload::Series(load.per_core.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pid: u32, cpu: f64, memory: u64) -> ProcessEntry {
        ProcessEntry {
            pid,
            name: format!("p{pid}"),
            cpu,
            memory,
        }
    }

    #[test]
    fn percentages_become_fractions() {
        let load = load_from_percentages(&[50.0, 100.0, 0.0, 50.0]).unwrap();
        assert_eq!(load.per_core, vec![0.5, 1.0, 0.0, 0.5]);
        assert_eq!(load.total_usage, 0.5);
        assert_eq!(load.idle, 0.5);
        assert_eq!(load.system, 0.0);
    }

    #[test]
    fn out_of_range_core_usage_is_clamped() {
        let load = load_from_percentages(&[140.0]).unwrap();
        assert_eq!(load.per_core, vec![1.0]);
        assert_eq!(load.idle, 0.0);
    }

    #[test]
    fn no_cores_means_no_sample() {
        assert_eq!(load_from_percentages(&[]), None);
    }

    #[test]
    fn busiest_sorts_and_truncates() {
        let top = busiest(
            vec![entry(1, 3.0, 10), entry(2, 40.0, 5), entry(3, 3.0, 99), entry(4, 0.0, 1)],
            3,
        );
        let pids: Vec<u32> = top.iter().map(|e| e.pid).collect();
        assert_eq!(pids, vec![2, 3, 1]);
    }

    #[test]
    fn load_payload_shapes() {
        let load = CpuLoad {
            total_usage: 0.25,
            per_core: vec![0.5, 0.0],
            ..Default::default()
        };
        let [headline, cores] = load_payloads(&load);
        assert_eq!(headline, MetricPayload::Percentage(0.25));
        assert_eq!(cores, MetricPayload::Series(vec![0.5, 0.0]));
        assert!(WidgetKind::BarChart.accepts(&cores));
    }

    #[test]
    fn live_sample_is_plausible() {
        let mut source = CpuSource::new();
        source.setup();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        if let Some(load) = source.read() {
            assert!((0.0..=1.0).contains(&load.total_usage));
            assert!(load.cores() > 0);
        }
    }
}
