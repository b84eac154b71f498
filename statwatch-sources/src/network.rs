//! Throughput of the active network interface.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use statwatch_kit::{
    MetricPayload, MetricSource, Module, ModuleConfig, Notifications, Reader, WidgetKind,
};
use statwatch_types::NetworkUsage;
use sysinfo::{NetworkData, Networks};
use tracing::{debug, info};

use crate::error::{Result, SourceError};
use crate::wiring::Wiring;

const INTERFACE_ID: &str = "interface";

/// Samples upload and download rates.
///
/// Without a pinned interface the busiest one (by lifetime traffic) is
/// reported, so a switch from Wi-Fi to Ethernet is followed automatically.
pub struct NetworkSource {
    networks: Networks,
    interface: Option<String>,
    last_refresh: Instant,
    total_upload: u64,
    total_download: u64,
}

impl NetworkSource {
    /// Follow the busiest interface.
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
            interface: None,
            last_refresh: Instant::now(),
            total_upload: 0,
            total_download: 0,
        }
    }

    /// Watch one interface by name.
    pub fn for_interface(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let source = Self::new();
        if !source.networks.list().contains_key(&name) {
            return Err(SourceError::UnknownInterface(name));
        }
        Ok(Self {
            interface: Some(name),
            ..source
        })
    }

    fn pick(&self) -> Option<(&String, &NetworkData)> {
        match &self.interface {
            Some(name) => self.networks.list().get_key_value(name),
            None => busiest(self.networks.list().iter().map(|(name, data)| {
                (name, data, data.total_received() + data.total_transmitted())
            })),
        }
    }
}

impl Default for NetworkSource {
    fn default() -> Self {
        Self::new()
    }
}

/// The entry with the most traffic. Ties go to the first name alphabetically.
fn busiest<'a, T>(entries: impl Iterator<Item = (&'a String, T, u64)>) -> Option<(&'a String, T)> {
    entries
        .max_by(|a, b| a.2.cmp(&b.2).then_with(|| b.0.cmp(a.0)))
        .map(|(name, data, _)| (name, data))
}

/// Bytes per second for `bytes` transferred over `secs`.
fn rate(bytes: u64, secs: f64) -> u64 {
    if secs <= 0.0 {
        return 0;
    }
    (bytes as f64 / secs).round() as u64
}

impl MetricSource for NetworkSource {
    type Value = NetworkUsage;

    fn setup(&mut self) {
        self.networks.refresh();
        self.last_refresh = Instant::now();
    }

    fn read(&mut self) -> Option<NetworkUsage> {
        self.networks.refresh();
        let now = Instant::now();
        let secs = now.duration_since(self.last_refresh).as_secs_f64();
        self.last_refresh = now;

        let (interface, upload, download) = {
            let (name, data) = self.pick()?;
            (name.clone(), data.transmitted(), data.received())
        };
        self.total_upload += upload;
        self.total_download += download;

        Some(NetworkUsage {
            interface,
            upload: rate(upload, secs),
            download: rate(download, secs),
            total_upload: self.total_upload,
            total_download: self.total_download,
        })
    }
}

/// The Net module.
pub struct NetworkModule {
    module: Arc<Module>,
    usage: Reader<NetworkUsage>,
    notifications: Arc<Notifications>,
}

impl NetworkModule {
    pub const NAME: &'static str = "Net";

    pub fn default_config() -> ModuleConfig {
        ModuleConfig::new(Self::NAME)
            .default_state(true)
            .widget(WidgetKind::Speed, true)
            .widget(WidgetKind::NetworkChart, false)
            .widget(WidgetKind::Label, false)
    }

    /// Watch `interface`, or the busiest interface when `None`.
    pub fn new(config: ModuleConfig, wiring: &Wiring, interface: Option<&str>) -> Result<Self> {
        let source = match interface {
            Some(name) => NetworkSource::for_interface(name)?,
            None => NetworkSource::new(),
        };
        Self::with_source(config, wiring, source)
    }

    pub fn with_source<S>(config: ModuleConfig, wiring: &Wiring, source: S) -> Result<Self>
    where
        S: MetricSource<Value = NetworkUsage>,
    {
        let module = Module::new(config, wiring.ctx.clone());
        let name = module.name().to_string();
        let notifications =
            module.attach_notifications(wiring.notifications(&name), &[INTERFACE_ID]);

        let store = wiring.ctx.store.clone();
        let watch_key = format!("{name}_notifications_{INTERFACE_ID}");
        let last_interface: Mutex<Option<String>> = Mutex::new(None);
        let weak = Arc::downgrade(&module);
        let notes = notifications.clone();
        let usage = wiring
            .reader(&name, "usage", source)
            .on_ready(module.ready_hook("usage"))
            .handler(move |value: &NetworkUsage| {
                let Some(module) = weak.upgrade() else {
                    return;
                };
                for payload in network_payloads(value) {
                    module.deliver(&payload);
                }

                let previous = last_interface.lock().replace(value.interface.clone());
                if let Some(previous) = previous.filter(|p| *p != value.interface) {
                    info!(module = %module.name(), from = %previous, to = %value.interface, "Interface changed");
                    if store.bool(&watch_key, false) {
                        notes.new_notification(
                            INTERFACE_ID,
                            "Network interface changed",
                            Some(&value.interface),
                        );
                    }
                }
            })
            .build()?;
        module.add_reader(usage.clone());
        debug!(module = %name, "Network module wired");

        Ok(Self {
            module,
            usage,
            notifications,
        })
    }

    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub fn usage(&self) -> &Reader<NetworkUsage> {
        &self.usage
    }

    pub fn notifications(&self) -> &Arc<Notifications> {
        &self.notifications
    }
}

fn network_payloads(value: &NetworkUsage) -> [MetricPayload; 2] {
    [
        MetricPayload::UpDown {
            upload: value.upload,
            download: value.download,
        },
        MetricPayload::Text(format!(
            "{} {}/s up, {}/s down",
            value.interface,
            human_bytes(value.upload),
            human_bytes(value.download)
        )),
    ]
}

/// Format a byte count with a binary unit, one decimal above bytes.
pub(crate) fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["KB", "MB", "GB", "TB", "PB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busiest_interface_wins() {
        let (lo, en0, en1) = ("lo".to_string(), "en0".to_string(), "en1".to_string());
        let picked = busiest(vec![(&lo, 1, 10_u64), (&en0, 2, 500), (&en1, 3, 20)].into_iter());
        assert_eq!(picked, Some((&en0, 2)));
    }

    #[test]
    fn busiest_breaks_ties_by_name() {
        let (a, b) = ("a".to_string(), "b".to_string());
        let picked = busiest(vec![(&b, (), 7_u64), (&a, (), 7)].into_iter());
        assert_eq!(picked.map(|(name, _)| name.as_str()), Some("a"));
    }

    #[test]
    fn rate_over_elapsed_seconds() {
        assert_eq!(rate(3000, 2.0), 1500);
        assert_eq!(rate(3000, 0.0), 0);
    }

    #[test]
    fn human_readable_sizes() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(1536), "1.5 KB");
        assert_eq!(human_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn unknown_interface_is_rejected() {
        let err = NetworkSource::for_interface("no-such-if0").err();
        assert!(matches!(err, Some(SourceError::UnknownInterface(name)) if name == "no-such-if0"));
    }

    #[test]
    fn payload_text_names_interface() {
        let usage = NetworkUsage {
            interface: "en0".to_string(),
            upload: 2048,
            download: 100,
            ..Default::default()
        };
        let [updown, text] = network_payloads(&usage);
        assert_eq!(updown, MetricPayload::UpDown { upload: 2048, download: 100 });
        assert_eq!(text, MetricPayload::Text("en0 2.0 KB/s up, 100 B/s down".to_string()));
    }
}
