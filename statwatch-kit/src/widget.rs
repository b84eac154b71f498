//! Status-bar widgets owned by a module.
//!
//! Widgets live in an arena owned by the module and are addressed by
//! [`WidgetId`]. Which kinds are switched on is persisted under
//! `<Module>_widget` as a comma-separated list.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use statwatch_types::{MetricPayload, WidgetKind};
use tracing::{debug, warn};

use crate::dispatch::UiDispatcher;
use crate::store::ConfigStore;

/// A status-bar item that renders metric payloads.
///
/// All methods are invoked through the module's [`UiDispatcher`].
pub trait Widget: Send + Sync {
    fn kind(&self) -> WidgetKind;

    /// Draw a new value. Payloads the kind does not accept are never passed.
    fn set_value(&self, payload: &MetricPayload);

    /// Show or hide the item in the status bar.
    fn set_visible(&self, visible: bool);
}

/// Index of a widget inside its module's [`WidgetSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WidgetId(usize);

impl WidgetId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Arena of the widgets of one module.
pub struct WidgetSet {
    module: String,
    store: Arc<dyn ConfigStore>,
    default_kind: Option<WidgetKind>,
    slots: RwLock<Vec<Arc<dyn Widget>>>,
}

impl WidgetSet {
    pub fn new(
        module: impl Into<String>,
        store: Arc<dyn ConfigStore>,
        default_kind: Option<WidgetKind>,
    ) -> Self {
        Self {
            module: module.into(),
            store,
            default_kind,
            slots: RwLock::new(Vec::new()),
        }
    }

    /// Add a widget. A kind already present is not added twice.
    pub fn push(&self, widget: Arc<dyn Widget>) -> WidgetId {
        let mut slots = self.slots.write();
        if let Some(index) = slots.iter().position(|w| w.kind() == widget.kind()) {
            warn!(module = %self.module, kind = %widget.kind(), "Widget kind registered twice");
            return WidgetId(index);
        }
        slots.push(widget);
        WidgetId(slots.len() - 1)
    }

    pub fn get(&self, id: WidgetId) -> Option<Arc<dyn Widget>> {
        self.slots.read().get(id.0).cloned()
    }

    pub fn id_of(&self, kind: WidgetKind) -> Option<WidgetId> {
        self.slots
            .read()
            .iter()
            .position(|w| w.kind() == kind)
            .map(WidgetId)
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    pub fn kinds(&self) -> Vec<WidgetKind> {
        self.slots.read().iter().map(|w| w.kind()).collect()
    }

    fn key(&self) -> String {
        format!("{}_widget", self.module)
    }

    /// Kinds switched on, read from the store. Unknown names are skipped.
    pub fn active_kinds(&self) -> Vec<WidgetKind> {
        let default = self.default_kind.map(|k| k.as_str()).unwrap_or_default();
        let raw = self.store.string(&self.key(), default);
        raw.split(',')
            .filter(|name| !name.trim().is_empty())
            .filter_map(|name| match name.parse::<WidgetKind>() {
                Ok(kind) => Some(kind),
                Err(err) => {
                    debug!(module = %self.module, error = %err, "Skipping stored widget");
                    None
                }
            })
            .collect()
    }

    pub fn is_active(&self, id: WidgetId) -> bool {
        match self.get(id) {
            Some(widget) => self.active_kinds().contains(&widget.kind()),
            None => false,
        }
    }

    /// Whether any registered widget is switched on.
    pub fn any_active(&self) -> bool {
        let active = self.active_kinds();
        self.slots.read().iter().any(|w| active.contains(&w.kind()))
    }

    /// Switch a widget on or off and persist the list. Returns whether it changed.
    pub fn set_active(&self, id: WidgetId, active: bool) -> bool {
        let Some(widget) = self.get(id) else {
            return false;
        };
        let kind = widget.kind();
        let mut kinds = self.active_kinds();
        let present = kinds.contains(&kind);
        if present == active {
            return false;
        }

        if active {
            kinds.push(kind);
        } else {
            kinds.retain(|k| *k != kind);
        }
        let list = kinds
            .iter()
            .map(WidgetKind::as_str)
            .collect::<Vec<_>>()
            .join(",");
        self.store.set_string(&self.key(), &list);
        true
    }

    /// Show the active widgets.
    pub fn enable(&self, dispatcher: &dyn UiDispatcher) {
        let active = self.active_kinds();
        for widget in self.slots.read().iter() {
            if active.contains(&widget.kind()) {
                let widget = widget.clone();
                dispatcher.dispatch(Box::new(move || widget.set_visible(true)));
            }
        }
    }

    /// Hide every widget.
    pub fn disable(&self, dispatcher: &dyn UiDispatcher) {
        for widget in self.slots.read().iter() {
            let widget = widget.clone();
            dispatcher.dispatch(Box::new(move || widget.set_visible(false)));
        }
    }

    /// Push a payload to every active widget that accepts it. Returns how many got it.
    pub fn deliver(&self, payload: &MetricPayload, dispatcher: &dyn UiDispatcher) -> usize {
        let active = self.active_kinds();
        let mut delivered = 0;
        for widget in self.slots.read().iter() {
            let kind = widget.kind();
            if !active.contains(&kind) || !kind.accepts(payload) {
                continue;
            }
            let widget = widget.clone();
            let payload = payload.clone();
            dispatcher.dispatch(Box::new(move || widget.set_value(&payload)));
            delivered += 1;
        }
        delivered
    }
}

impl fmt::Debug for WidgetSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetSet")
            .field("module", &self.module)
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::dispatch::InlineDispatcher;
    use crate::store::MemoryStore;

    /// Widget that records what it was asked to do.
    pub(crate) struct Recording {
        pub(crate) kind: WidgetKind,
        pub(crate) values: Mutex<Vec<MetricPayload>>,
        pub(crate) visible: Mutex<Option<bool>>,
    }

    impl Recording {
        pub(crate) fn new(kind: WidgetKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                values: Mutex::new(Vec::new()),
                visible: Mutex::new(None),
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

        fn set_visible(&self, visible: bool) {
            *self.visible.lock() = Some(visible);
        }
    }

    fn set(default: Option<WidgetKind>) -> (WidgetSet, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (WidgetSet::new("CPU", store.clone(), default), store)
    }

    #[test]
    fn default_kind_is_active_until_stored() {
        let (widgets, store) = set(Some(WidgetKind::Mini));
        let mini = widgets.push(Recording::new(WidgetKind::Mini));
        let chart = widgets.push(Recording::new(WidgetKind::LineChart));

        assert!(widgets.is_active(mini));
        assert!(!widgets.is_active(chart));

        store.set_string("CPU_widget", "line_chart");
        assert!(!widgets.is_active(mini));
        assert!(widgets.is_active(chart));
    }

    #[test]
    fn set_active_persists_list() {
        let (widgets, store) = set(Some(WidgetKind::Mini));
        let mini = widgets.push(Recording::new(WidgetKind::Mini));
        let chart = widgets.push(Recording::new(WidgetKind::BarChart));

        assert!(widgets.set_active(chart, true));
        assert!(!widgets.set_active(chart, true));
        assert_eq!(store.string("CPU_widget", ""), "mini,bar_chart");

        assert!(widgets.set_active(mini, false));
        assert_eq!(store.string("CPU_widget", ""), "bar_chart");

        assert!(widgets.set_active(chart, false));
        assert!(!widgets.any_active());
    }

    #[test]
    fn unknown_stored_names_are_skipped() {
        let (widgets, store) = set(None);
        store.set_string("CPU_widget", "mini,sparkline,,label");
        assert_eq!(
            widgets.active_kinds(),
            vec![WidgetKind::Mini, WidgetKind::Label]
        );
    }

    #[test]
    fn duplicate_kind_returns_existing_slot() {
        let (widgets, _) = set(None);
        let first = widgets.push(Recording::new(WidgetKind::Mini));
        let second = widgets.push(Recording::new(WidgetKind::Mini));
        assert_eq!(first, second);
        assert_eq!(widgets.len(), 1);
    }

    #[test]
    fn deliver_reaches_active_accepting_widgets() {
        let (widgets, _) = set(Some(WidgetKind::Mini));
        let mini = Recording::new(WidgetKind::Mini);
        let speed = Recording::new(WidgetKind::Speed);
        widgets.push(mini.clone());
        let speed_id = widgets.push(speed.clone());
        widgets.set_active(speed_id, true);

        let delivered = widgets.deliver(&MetricPayload::Percentage(0.3), &InlineDispatcher);

        assert_eq!(delivered, 1);
        assert_eq!(*mini.values.lock(), vec![MetricPayload::Percentage(0.3)]);
        assert!(speed.values.lock().is_empty());
    }

    #[test]
    fn enable_shows_only_active_and_disable_hides_all() {
        let (widgets, _) = set(Some(WidgetKind::Mini));
        let mini = Recording::new(WidgetKind::Mini);
        let label = Recording::new(WidgetKind::Label);
        widgets.push(mini.clone());
        widgets.push(label.clone());

        widgets.enable(&InlineDispatcher);
        assert_eq!(*mini.visible.lock(), Some(true));
        assert_eq!(*label.visible.lock(), None);

        widgets.disable(&InlineDispatcher);
        assert_eq!(*mini.visible.lock(), Some(false));
        assert_eq!(*label.visible.lock(), Some(false));
    }
}
