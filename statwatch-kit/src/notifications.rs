//! Threshold notifications with hysteresis.
//!
//! Each module owns one [`Notifications`] helper. A notification id is local
//! to the module (`"usage"`, `"free"`); the identifier handed to the
//! [`NotificationCenter`] is namespaced as `<namespace>_<Module>_<id>`.
//!
//! A notification fires once when a value crosses its threshold and is
//! removed once the value moves back across the clear boundary. In between
//! repeated samples do nothing.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::NotifyError;
use crate::store::ConfigStore;

/// Default prefix of notification identifiers.
pub const DEFAULT_NAMESPACE: &str = "Stats";

/// Delivers user-facing notifications.
pub trait NotificationCenter: Send + Sync {
    fn show(&self, id: &str, title: &str, subtitle: Option<&str>) -> Result<(), NotifyError>;

    fn remove(&self, id: &str);
}

/// A center that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCenter;

impl NotificationCenter for LogCenter {
    fn show(&self, id: &str, title: &str, subtitle: Option<&str>) -> Result<(), NotifyError> {
        info!(id, title, subtitle = subtitle.unwrap_or_default(), "Notification");
        Ok(())
    }

    fn remove(&self, id: &str) {
        debug!(id, "Notification removed");
    }
}

/// Which side of the threshold triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Fire when the value rises to the threshold.
    Above,
    /// Fire when the value falls to the threshold.
    Below,
}

/// Fire and clear boundaries for one notification.
///
/// With a single threshold the clear boundary equals the fire boundary.
/// A separate clear boundary widens the dead band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub fire: f64,
    pub clear: f64,
    pub direction: Direction,
}

impl Threshold {
    pub fn above(level: f64) -> Self {
        Self {
            fire: level,
            clear: level,
            direction: Direction::Above,
        }
    }

    pub fn below(level: f64) -> Self {
        Self {
            fire: level,
            clear: level,
            direction: Direction::Below,
        }
    }

    pub fn with_clear(mut self, clear: f64) -> Self {
        self.clear = clear;
        self
    }

    pub fn should_fire(&self, value: f64) -> bool {
        match self.direction {
            Direction::Above => value >= self.fire,
            Direction::Below => value <= self.fire,
        }
    }

    pub fn should_clear(&self, value: f64) -> bool {
        match self.direction {
            Direction::Above => value < self.clear,
            Direction::Below => value > self.clear,
        }
    }
}

/// What a threshold check did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Fired,
    Cleared,
}

/// Per-module notification state.
pub struct Notifications {
    module: String,
    namespace: String,
    center: Arc<dyn NotificationCenter>,
    store: Option<Arc<dyn ConfigStore>>,
    firing: Mutex<HashSet<String>>,
}

impl Notifications {
    pub fn new(module: impl Into<String>, center: Arc<dyn NotificationCenter>) -> Self {
        Self {
            module: module.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            center,
            store: None,
            firing: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Store that holds the user's notification levels.
    pub fn with_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Fully qualified identifier of a local id.
    pub fn id_for(&self, rid: &str) -> String {
        format!("{}_{}_{}", self.namespace, self.module, rid)
    }

    /// Clear notifications left over from a previous run.
    pub fn init_ids(&self, rids: &[&str]) {
        let mut firing = self.firing.lock();
        for rid in rids {
            let id = self.id_for(rid);
            self.center.remove(&id);
            firing.remove(&id);
        }
    }

    pub fn is_firing(&self, rid: &str) -> bool {
        self.firing.lock().contains(&self.id_for(rid))
    }

    /// Evaluate a single-threshold notification.
    ///
    /// With `less` the notification fires when `value <= threshold`,
    /// otherwise when `value >= threshold`.
    pub fn check_double(
        &self,
        rid: &str,
        value: f64,
        threshold: f64,
        title: &str,
        subtitle: Option<&str>,
        less: bool,
    ) -> Transition {
        let threshold = if less {
            Threshold::below(threshold)
        } else {
            Threshold::above(threshold)
        };
        self.check(rid, value, &threshold, title, subtitle)
    }

    /// Evaluate a notification against explicit boundaries.
    pub fn check(
        &self,
        rid: &str,
        value: f64,
        threshold: &Threshold,
        title: &str,
        subtitle: Option<&str>,
    ) -> Transition {
        let id = self.id_for(rid);
        let firing = self.firing.lock().contains(&id);

        if firing && threshold.should_clear(value) {
            self.hide_notification(rid);
            return Transition::Cleared;
        }
        if !firing && threshold.should_fire(value) {
            self.new_notification(rid, title, subtitle);
            return Transition::Fired;
        }
        Transition::Unchanged
    }

    /// Show a notification, replacing any existing one with the same id.
    pub fn new_notification(&self, rid: &str, title: &str, subtitle: Option<&str>) {
        let id = self.id_for(rid);
        let mut firing = self.firing.lock();
        if firing.contains(&id) {
            self.center.remove(&id);
        }
        if let Err(err) = self.center.show(&id, title, subtitle) {
            warn!(id = %id, error = %err, "Failed to show notification");
        }
        firing.insert(id);
    }

    /// Remove a notification if it is showing.
    pub fn hide_notification(&self, rid: &str) {
        let id = self.id_for(rid);
        if self.firing.lock().remove(&id) {
            self.center.remove(&id);
        }
    }

    /// Remove everything this module shows.
    pub fn will_terminate(&self) {
        let mut firing = self.firing.lock();
        for id in firing.drain() {
            self.center.remove(&id);
        }
    }

    fn level_key(&self, rid: &str) -> String {
        format!("{}_notifications_{}", self.module, rid)
    }

    /// The user's level for `rid`, if one is set.
    ///
    /// Levels are stored as strings; an empty or unparsable value means off.
    pub fn level(&self, rid: &str) -> Option<f64> {
        let store = self.store.as_ref()?;
        store
            .string(&self.level_key(rid), "")
            .trim()
            .parse::<f64>()
            .ok()
    }

    /// Set or clear the user's level for `rid`.
    pub fn set_level(&self, rid: &str, level: Option<f64>) {
        let Some(store) = &self.store else {
            return;
        };
        match level {
            Some(level) => store.set_string(&self.level_key(rid), &level.to_string()),
            None => store.remove(&self.level_key(rid)),
        }
    }
}

impl fmt::Debug for Notifications {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifications")
            .field("module", &self.module)
            .field("namespace", &self.namespace)
            .field("firing", &self.firing.lock().len())
            .finish()
    }
}
