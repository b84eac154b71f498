//! Physical memory and swap.

use std::sync::Arc;

use statwatch_kit::{
    MetricPayload, MetricSource, Module, ModuleConfig, Notifications, Reader, Segment, WidgetKind,
};
use statwatch_types::{MemoryUsage, SwapUsage};
use sysinfo::System;

use crate::error::Result;
use crate::percent;
use crate::wiring::Wiring;

const TOTAL_USAGE_ID: &str = "totalUsage";
const FREE_ID: &str = "free";

/// Samples physical memory and swap.
///
/// Free memory is what the kernel reports as available, so reclaimable
/// caches do not count as used.
pub struct MemorySource {
    system: System,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for MemorySource {
    type Value = MemoryUsage;

    fn read(&mut self) -> Option<MemoryUsage> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return None;
        }
        let free = self.system.available_memory().min(total);
        let used = total - free;

        Some(MemoryUsage {
            total,
            used,
            free,
            app: used,
            wired: 0,
            compressed: 0,
            swap: SwapUsage {
                total: self.system.total_swap(),
                used: self.system.used_swap(),
                free: self.system.free_swap(),
            },
        })
    }
}

/// The RAM module.
pub struct RamModule {
    module: Arc<Module>,
    usage: Reader<MemoryUsage>,
    notifications: Arc<Notifications>,
}

impl RamModule {
    pub const NAME: &'static str = "RAM";

    pub fn default_config() -> ModuleConfig {
        ModuleConfig::new(Self::NAME)
            .default_state(true)
            .widget(WidgetKind::Mini, true)
            .widget(WidgetKind::LineChart, false)
            .widget(WidgetKind::BarChart, false)
            .widget(WidgetKind::PieChart, false)
            .widget(WidgetKind::Memory, false)
            .widget(WidgetKind::Tachometer, false)
    }

    pub fn new(config: ModuleConfig, wiring: &Wiring) -> Result<Self> {
        Self::with_source(config, wiring, MemorySource::new())
    }

    pub fn with_source<S>(config: ModuleConfig, wiring: &Wiring, source: S) -> Result<Self>
    where
        S: MetricSource<Value = MemoryUsage>,
    {
        let module = Module::new(config, wiring.ctx.clone());
        let name = module.name().to_string();
        let notifications = module.attach_notifications(
            wiring.notifications(&name),
            &[TOTAL_USAGE_ID, FREE_ID],
        );

        let weak = Arc::downgrade(&module);
        let notes = notifications.clone();
        let usage = wiring
            .reader(&name, "usage", source)
            .on_ready(module.ready_hook("usage"))
            .handler(move |value: &MemoryUsage| {
                let Some(module) = weak.upgrade() else {
                    return;
                };
                for payload in memory_payloads(value) {
                    module.deliver(&payload);
                }
                check_thresholds(&notes, value);
            })
            .build()?;

        module.add_reader(usage.clone());

        Ok(Self {
            module,
            usage,
            notifications,
        })
    }

    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub fn usage(&self) -> &Reader<MemoryUsage> {
        &self.usage
    }

    pub fn notifications(&self) -> &Arc<Notifications> {
        &self.notifications
    }
}

fn check_thresholds(notes: &Notifications, value: &MemoryUsage) {
    if let Some(level) = notes.level(TOTAL_USAGE_ID) {
        let subtitle = format!("RAM utilization is {}%", percent(value.usage()));
        notes.check_double(
            TOTAL_USAGE_ID,
            value.usage(),
            level,
            "RAM utilization threshold",
            Some(&subtitle),
            false,
        );
    }
    if let Some(level) = notes.level(FREE_ID) {
        let subtitle = format!("Free RAM is {}%", percent(value.free_ratio()));
        notes.check_double(
            FREE_ID,
            value.free_ratio(),
            level,
            "Free RAM threshold",
            Some(&subtitle),
            true,
        );
    }
}

/// Widget payloads for one memory sample.
fn memory_payloads(value: &MemoryUsage) -> [MetricPayload; 3] {
    let share = |part: u64| {
        if value.total == 0 {
            0.0
        } else {
            part as f64 / value.total as f64
        }
    };
    [
        MetricPayload::Percentage(value.usage()),
        MetricPayload::UsedFree {
            used: value.used,
            free: value.free,
        },
        MetricPayload::Segments(vec![
            Segment::colored(share(value.app), "app"),
            Segment::colored(share(value.wired), "wired"),
            Segment::colored(share(value.compressed), "compressed"),
        ]),
    ]
}
