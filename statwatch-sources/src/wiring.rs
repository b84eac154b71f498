//! Collaborators shared by every pre-wired module.

use std::sync::Arc;
use std::time::Duration;

use statwatch_kit::{
    LogCenter, MetricSource, ModuleConfig, ModuleContext, NotificationCenter, Notifications,
    ReaderBuilder, Settings, DEFAULT_INTERVAL, DEFAULT_NAMESPACE,
};

/// Everything a module constructor needs besides its own config.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use statwatch_kit::{MemoryStore, ModuleContext, Settings};
/// use statwatch_sources::{RamModule, Wiring};
///
/// #[tokio::main]
/// async fn main() {
///     let settings = Settings::default();
///     let ctx = ModuleContext::current(Arc::new(MemoryStore::new())).unwrap();
///     let wiring = Wiring::from_settings(ctx, &settings);
///
///     let ram = RamModule::new(wiring.config_for(&settings, RamModule::default_config()), &wiring).unwrap();
///     ram.module().mount();
/// }
/// ```
#[derive(Clone)]
pub struct Wiring {
    pub ctx: ModuleContext,
    pub center: Arc<dyn NotificationCenter>,
    pub namespace: String,
    /// Interval used by readers when the store has none.
    pub update_interval: Duration,
}

impl Wiring {
    /// Wiring that logs notifications and polls every second.
    pub fn new(ctx: ModuleContext) -> Self {
        Self {
            ctx,
            center: Arc::new(LogCenter),
            namespace: DEFAULT_NAMESPACE.to_string(),
            update_interval: DEFAULT_INTERVAL,
        }
    }

    pub fn from_settings(ctx: ModuleContext, settings: &Settings) -> Self {
        Self {
            namespace: settings.notification_namespace.clone(),
            update_interval: settings.update_interval(),
            ..Self::new(ctx)
        }
    }

    pub fn with_center(mut self, center: Arc<dyn NotificationCenter>) -> Self {
        self.center = center;
        self
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// The configured module named like `fallback`, or `fallback` itself.
    pub fn config_for(&self, settings: &Settings, fallback: ModuleConfig) -> ModuleConfig {
        settings
            .module(&fallback.name)
            .cloned()
            .unwrap_or(fallback)
    }

    pub(crate) fn notifications(&self, module: &str) -> Notifications {
        Notifications::new(module, self.center.clone())
            .with_namespace(self.namespace.clone())
            .with_store(self.ctx.store.clone())
    }

    /// A reader builder already bound to `module`, the runtime and the default interval.
    pub(crate) fn reader<S>(&self, module: &str, name: &str, source: S) -> ReaderBuilder<S::Value>
    where
        S: MetricSource,
    {
        statwatch_kit::Reader::builder(name, source)
            .module(module)
            .runtime(self.ctx.runtime.clone())
            .default_interval(self.update_interval)
    }
}

impl std::fmt::Debug for Wiring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wiring")
            .field("ctx", &self.ctx)
            .field("namespace", &self.namespace)
            .field("update_interval", &self.update_interval)
            .finish_non_exhaustive()
    }
}
