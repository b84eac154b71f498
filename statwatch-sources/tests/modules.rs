//! Pre-wired modules driven by scripted sources.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use statwatch_kit::{
    source_fn, ConfigStore, MemoryStore, MetricPayload, ModuleContext, ModuleStatus,
    NotificationCenter, NotifyError, Popup, Widget, WidgetKind,
};
use statwatch_sources::{CpuModule, DiskModule, NetworkModule, RamModule, Wiring};
use statwatch_types::{CpuLoad, DiskUsage, MemoryUsage, NetworkUsage, ProcessEntry};

async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

#[derive(Default)]
struct Center {
    shown: Mutex<Vec<String>>,
}

impl NotificationCenter for Center {
    fn show(&self, id: &str, _title: &str, _subtitle: Option<&str>) -> Result<(), NotifyError> {
        self.shown.lock().push(id.to_string());
        Ok(())
    }

    fn remove(&self, _id: &str) {}
}

struct Recording {
    kind: WidgetKind,
    values: Mutex<Vec<MetricPayload>>,
}

impl Recording {
    fn new(kind: WidgetKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            values: Mutex::new(Vec::new()),
        })
    }
}

impl Widget for Recording {
    fn kind(&self) -> WidgetKind {
        self.kind
    }

    fn set_value(&self, payload: &MetricPayload) {
        self.values.lock().push(payload.clone());
    }

    fn set_visible(&self, _visible: bool) {}
}

#[derive(Default)]
struct ProcessPopup {
    rows: Mutex<Vec<MetricPayload>>,
}

impl Popup for ProcessPopup {
    fn set_visible(&self, _visible: bool) {}

    fn set_value(&self, payload: &MetricPayload) {
        self.rows.lock().push(payload.clone());
    }
}

fn wiring() -> (Wiring, Arc<MemoryStore>, Arc<Center>) {
    let store = Arc::new(MemoryStore::new());
    let center = Arc::new(Center::default());
    let ctx = ModuleContext::current(store.clone()).unwrap();
    let wiring = Wiring::new(ctx)
        .with_center(center.clone())
        .with_update_interval(Duration::from_secs(60));
    (wiring, store, center)
}

fn scripted<T: Clone + Send + Sync + 'static>(values: Vec<T>) -> impl FnMut() -> Option<T> + Send {
    let mut queue: VecDeque<T> = values.into();
    move || queue.pop_front()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ram_usage_reaches_widget_and_raises_alert() {
    let (wiring, store, center) = wiring();
    store.set_string("RAM_notifications_totalUsage", "0.7");

    let sample = MemoryUsage {
        total: 1000,
        used: 800,
        free: 200,
        app: 800,
        ..Default::default()
    };
    let ram = RamModule::with_source(
        RamModule::default_config(),
        &wiring,
        source_fn(move || Some(sample)),
    )
    .unwrap();
    let mini = Recording::new(WidgetKind::Mini);
    ram.module().add_widget(mini.clone());

    ram.module().mount();
    settle().await;

    assert_eq!(*mini.values.lock(), vec![MetricPayload::Percentage(0.8)]);
    assert_eq!(*center.shown.lock(), vec!["Stats_RAM_totalUsage".to_string()]);
    assert!(ram.usage().is_ready());
    ram.module().terminate();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn process_list_only_reaches_an_open_popup() {
    let (wiring, _store, _center) = wiring();
    let load = CpuLoad {
        total_usage: 0.4,
        idle: 0.6,
        per_core: vec![0.4],
        ..Default::default()
    };
    let rows = vec![ProcessEntry {
        pid: 42,
        name: "cargo".to_string(),
        cpu: 97.0,
        memory: 1 << 20,
    }];
    let expected = MetricPayload::Processes(rows.clone());

    let cpu = CpuModule::with_sources(
        CpuModule::default_config(),
        &wiring,
        source_fn(move || Some(load.clone())),
        source_fn(move || Some(rows.clone())),
    )
    .unwrap();
    let popup = Arc::new(ProcessPopup::default());
    cpu.module().replace_popup(popup.clone());

    cpu.module().mount();
    settle().await;
    assert!(cpu.processes().is_locked());
    assert!(popup.rows.lock().is_empty());

    cpu.module().set_popup_visible(true);
    settle().await;
    assert!(popup.rows.lock().contains(&expected));

    cpu.module().terminate();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disk_alert_fires_once_and_clears() {
    let (wiring, store, center) = wiring();
    store.set_string("Disk_notifications_usage", "0.9");

    let sample = |free| DiskUsage {
        name: "disk1".to_string(),
        mount_point: "/".to_string(),
        total: 100,
        free,
        ..Default::default()
    };
    let disk = DiskModule::with_source(
        DiskModule::default_config(),
        &wiring,
        source_fn(scripted(vec![sample(5), sample(4), sample(50)])),
    )
    .unwrap();

    disk.module().mount();
    settle().await;
    let reader = disk.usage().unwrap();
    reader.read();
    assert_eq!(center.shown.lock().len(), 1);
    assert!(disk.notifications().is_firing("usage"));

    reader.read();
    assert!(!disk.notifications().is_firing("usage"));
    assert_eq!(center.shown.lock().len(), 1);
    disk.module().terminate();
}

#[tokio::test]
async fn missing_volume_leaves_disk_module_unavailable() {
    let (wiring, _store, _center) = wiring();
    let disk = DiskModule::new(
        DiskModule::default_config(),
        &wiring,
        "/no/such/volume/anywhere",
    )
    .unwrap();

    assert_eq!(disk.module().status(), ModuleStatus::Unavailable);
    assert!(disk.usage().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn interface_switch_is_announced_when_watched() {
    let (wiring, store, center) = wiring();
    store.set_bool("Net_notifications_interface", true);

    let sample = |interface: &str| NetworkUsage {
        interface: interface.to_string(),
        upload: 10,
        download: 20,
        ..Default::default()
    };
    let net = NetworkModule::with_source(
        NetworkModule::default_config(),
        &wiring,
        source_fn(scripted(vec![sample("en0"), sample("en0"), sample("en1")])),
    )
    .unwrap();
    let speed = Recording::new(WidgetKind::Speed);
    net.module().add_widget(speed.clone());

    net.module().mount();
    settle().await;
    net.usage().read();
    assert!(center.shown.lock().is_empty());

    net.usage().read();
    assert_eq!(*center.shown.lock(), vec!["Stats_Net_interface".to_string()]);
    assert_eq!(
        speed.values.lock().first(),
        Some(&MetricPayload::UpDown {
            upload: 10,
            download: 20
        })
    );
    net.module().terminate();
}
