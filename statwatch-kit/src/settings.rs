//! Static application settings.
//!
//! Settings come from an optional TOML file layered under `STATWATCH_*`
//! environment variables (`STATWATCH_UPDATE_INTERVAL=2`). They describe the
//! modules and their defaults; user choices made at runtime live in the
//! [`ConfigStore`] instead.
//!
//! ```toml
//! update_interval = 2.0
//! store_path = "/tmp/statwatch.json"
//!
//! [[modules]]
//! name = "RAM"
//! default_state = true
//! widgets = [
//!     { kind = "mini", default = true },
//!     { kind = "memory", order = 1 },
//! ]
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use statwatch_types::WidgetKind;

use crate::error::{Result, StoreError};
use crate::notifications::DEFAULT_NAMESPACE;
use crate::reader::DEFAULT_INTERVAL;
use crate::store::{ConfigStore, FileStore, MemoryStore};

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "STATWATCH";

/// One widget a module can show.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WidgetConfig {
    pub kind: WidgetKind,
    /// Switched on when the user has not chosen yet.
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub order: i32,
}

/// Static description of a module.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    /// Enabled on first launch.
    #[serde(default)]
    pub default_state: bool,
    #[serde(default)]
    pub widgets: Vec<WidgetConfig>,
}

impl ModuleConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_state: false,
            widgets: Vec::new(),
        }
    }

    pub fn default_state(mut self, enabled: bool) -> Self {
        self.default_state = enabled;
        self
    }

    pub fn widget(mut self, kind: WidgetKind, default: bool) -> Self {
        let order = self.widgets.len() as i32;
        self.widgets.push(WidgetConfig {
            kind,
            default,
            order,
        });
        self
    }

    /// The widget switched on by default, if any.
    pub fn default_widget(&self) -> Option<WidgetKind> {
        self.widgets.iter().find(|w| w.default).map(|w| w.kind)
    }

    /// Widget kinds sorted by `order`.
    pub fn ordered_widgets(&self) -> Vec<WidgetKind> {
        let mut widgets = self.widgets.clone();
        widgets.sort_by_key(|w| w.order);
        widgets.into_iter().map(|w| w.kind).collect()
    }
}

fn default_update_interval() -> f64 {
    DEFAULT_INTERVAL.as_secs_f64()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

/// Top-level settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    /// Default reader interval in seconds.
    #[serde(default = "default_update_interval")]
    pub update_interval: f64,

    /// Prefix of notification identifiers.
    #[serde(default = "default_namespace")]
    pub notification_namespace: String,

    /// JSON file for runtime choices. In-memory when unset.
    #[serde(default)]
    pub store_path: Option<PathBuf>,

    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            update_interval: default_update_interval(),
            notification_namespace: default_namespace(),
            store_path: None,
            modules: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from `path` (if it exists) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Default reader interval. Non-positive values fall back to one second.
    pub fn update_interval(&self) -> Duration {
        if self.update_interval.is_finite() && self.update_interval > 0.0 {
            Duration::from_secs_f64(self.update_interval)
        } else {
            DEFAULT_INTERVAL
        }
    }

    pub fn module(&self, name: &str) -> Option<&ModuleConfig> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Open the runtime store described by these settings.
    pub fn open_store(&self) -> std::result::Result<Arc<dyn ConfigStore>, StoreError> {
        let store: Arc<dyn ConfigStore> = match &self.store_path {
            Some(path) => Arc::new(FileStore::open(path)?),
            None => Arc::new(MemoryStore::new()),
        };
        Ok(store)
    }
}
