//! Capacity of one mounted volume.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use statwatch_kit::{
    MetricPayload, MetricSource, Module, ModuleConfig, ModuleHooks, Notifications, Reader,
    WidgetKind,
};
use statwatch_types::DiskUsage;
use sysinfo::{Disk, Disks};
use tracing::{debug, warn};

use crate::error::{Result, SourceError};
use crate::percent;
use crate::wiring::Wiring;

const USAGE_ID: &str = "usage";

/// Mount point watched when none is configured.
pub const DEFAULT_MOUNT_POINT: &str = "/";

fn describe(disk: &Disk) -> DiskUsage {
    DiskUsage {
        name: disk.name().to_string_lossy().into_owned(),
        mount_point: disk.mount_point().display().to_string(),
        total: disk.total_space(),
        free: disk.available_space().min(disk.total_space()),
        read_rate: 0,
        write_rate: 0,
    }
}

fn is_mounted(disks: &Disks, mount_point: &Path) -> bool {
    disks.list().iter().any(|disk| disk.mount_point() == mount_point)
}

/// Samples the volume mounted at one path.
///
/// A volume that disappears reads as empty; the reader's retry budget decides
/// when to give up on it.
pub struct DiskSource {
    disks: Disks,
    mount_point: PathBuf,
}

impl DiskSource {
    /// Watch the volume mounted at `mount_point`.
    pub fn new(mount_point: impl Into<PathBuf>) -> Result<Self> {
        let mount_point = mount_point.into();
        let disks = Disks::new_with_refreshed_list();
        if !is_mounted(&disks, &mount_point) {
            return Err(SourceError::DiskNotFound(mount_point.display().to_string()));
        }
        Ok(Self { disks, mount_point })
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }
}

impl MetricSource for DiskSource {
    type Value = DiskUsage;

    fn read(&mut self) -> Option<DiskUsage> {
        self.disks.refresh();
        let usage = self
            .disks
            .list()
            .iter()
            .find(|disk| disk.mount_point() == self.mount_point)
            .map(describe);
        if usage.is_none() {
            debug!(mount_point = %self.mount_point.display(), "Volume is gone");
        }
        usage
    }
}

/// Reports the disk module unavailable when the volume is not mounted.
struct VolumeHooks {
    mount_point: PathBuf,
}

impl ModuleHooks for VolumeHooks {
    fn is_available(&self) -> bool {
        is_mounted(&Disks::new_with_refreshed_list(), &self.mount_point)
    }

    fn reader_ready(&self, reader: &str) {
        debug!(mount_point = %self.mount_point.display(), reader, "Volume reader is ready");
    }
}

/// The Disk module.
///
/// When the volume is not mounted the module is built unavailable and has no
/// reader.
pub struct DiskModule {
    module: Arc<Module>,
    usage: Option<Reader<DiskUsage>>,
    notifications: Arc<Notifications>,
}

impl DiskModule {
    pub const NAME: &'static str = "Disk";

    pub fn default_config() -> ModuleConfig {
        ModuleConfig::new(Self::NAME)
            .default_state(true)
            .widget(WidgetKind::Mini, true)
            .widget(WidgetKind::BarChart, false)
            .widget(WidgetKind::PieChart, false)
            .widget(WidgetKind::Memory, false)
    }

    /// Watch the volume mounted at `mount_point`.
    pub fn new(config: ModuleConfig, wiring: &Wiring, mount_point: impl Into<PathBuf>) -> Result<Self> {
        let mount_point = mount_point.into();
        let module = Module::with_hooks(
            config,
            wiring.ctx.clone(),
            VolumeHooks {
                mount_point: mount_point.clone(),
            },
        );
        if !module.is_available() {
            warn!(mount_point = %mount_point.display(), "No volume to watch");
            let notifications =
                module.attach_notifications(wiring.notifications(module.name()), &[USAGE_ID]);
            return Ok(Self {
                module,
                usage: None,
                notifications,
            });
        }
        let source = DiskSource::new(mount_point)?;
        Self::assemble(module, wiring, source)
    }

    /// Wire an always-available module to an arbitrary source.
    pub fn with_source<S>(config: ModuleConfig, wiring: &Wiring, source: S) -> Result<Self>
    where
        S: MetricSource<Value = DiskUsage>,
    {
        let module = Module::new(config, wiring.ctx.clone());
        Self::assemble(module, wiring, source)
    }

    fn assemble<S>(module: Arc<Module>, wiring: &Wiring, source: S) -> Result<Self>
    where
        S: MetricSource<Value = DiskUsage>,
    {
        let name = module.name().to_string();
        let notifications = module.attach_notifications(wiring.notifications(&name), &[USAGE_ID]);

        let weak = Arc::downgrade(&module);
        let notes = notifications.clone();
        let usage = wiring
            .reader(&name, "usage", source)
            .on_ready(module.ready_hook("usage"))
            .handler(move |value: &DiskUsage| {
                let Some(module) = weak.upgrade() else {
                    return;
                };
                for payload in disk_payloads(value) {
                    module.deliver(&payload);
                }
                if let Some(level) = notes.level(USAGE_ID) {
                    let subtitle = format!("Disk utilization is {}%", percent(value.usage()));
                    notes.check_double(
                        USAGE_ID,
                        value.usage(),
                        level,
                        "Disk utilization threshold",
                        Some(&subtitle),
                        false,
                    );
                }
            })
            .build()?;
        module.add_reader(usage.clone());

        Ok(Self {
            module,
            usage: Some(usage),
            notifications,
        })
    }

    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub fn usage(&self) -> Option<&Reader<DiskUsage>> {
        self.usage.as_ref()
    }

    pub fn notifications(&self) -> &Arc<Notifications> {
        &self.notifications
    }
}

fn disk_payloads(value: &DiskUsage) -> [MetricPayload; 2] {
    [
        MetricPayload::Percentage(value.usage()),
        MetricPayload::UsedFree {
            used: value.total.saturating_sub(value.free),
            free: value.free,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payloads_report_used_space() {
        let usage = DiskUsage {
            name: "disk1".to_string(),
            mount_point: "/".to_string(),
            total: 400,
            free: 100,
            ..Default::default()
        };
        let [ratio, split] = disk_payloads(&usage);
        assert_eq!(ratio, MetricPayload::Percentage(0.75));
        assert_eq!(split, MetricPayload::UsedFree { used: 300, free: 100 });
    }

    #[test]
    fn unknown_mount_point_is_rejected() {
        let err = DiskSource::new("/definitely/not/a/mount/point").err();
        assert!(matches!(err, Some(SourceError::DiskNotFound(path)) if path.contains("not/a/mount")));
    }

    #[test]
    fn root_volume_is_plausible_when_listed() {
        let Ok(mut source) = DiskSource::new(DEFAULT_MOUNT_POINT) else {
            return;
        };
        if let Some(usage) = source.read() {
            assert_eq!(usage.mount_point, DEFAULT_MOUNT_POINT);
            assert!(usage.free <= usage.total);
        }
    }
}
