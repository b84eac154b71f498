//! Module supervisor.
//!
//! A [`Module`] groups the readers, widgets, popup and notifications of one
//! metric family (CPU, RAM, ...). It is the only place that changes whether
//! the family is enabled, and it turns lifecycle and UI events into reader
//! transitions:
//!
//! - `mount()` / `enable()` start every reader
//! - `disable()` / `terminate()` stop every reader
//! - popup open unlocks and starts popup readers, popup close pauses and locks them
//!
//! ```text
//! new() ──┬── unavailable ──────────────────────────► Unavailable
//!         └── available ─► Disabled ⇄ Enabled ─────► Terminated
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use statwatch_types::MetricPayload;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::{BusEvent, EventBus};
use crate::dispatch::{InlineDispatcher, UiDispatcher};
use crate::error::{KitError, Result};
use crate::notifications::Notifications;
use crate::reader::ReaderControl;
use crate::settings::ModuleConfig;
use crate::store::{ConfigStore, PAUSE_KEY};
use crate::widget::{Widget, WidgetId, WidgetSet};

/// Module-specific behaviour.
pub trait ModuleHooks: Send + Sync {
    /// Whether the hardware or OS feature behind the module exists.
    /// Evaluated once, at construction.
    fn is_available(&self) -> bool {
        true
    }

    /// Called once before the readers are torn down.
    fn will_terminate(&self) {}

    /// Called the first time a reader of the module produces a value.
    fn reader_ready(&self, _reader: &str) {}
}

/// Hooks with every default.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl ModuleHooks for DefaultHooks {}

/// A popup window attached to a module.
pub trait Popup: Send + Sync {
    fn set_visible(&self, visible: bool);

    /// Draw popup-only data such as the process list.
    fn set_value(&self, _payload: &MetricPayload) {}
}

/// Collaborators shared by all modules.
#[derive(Clone)]
pub struct ModuleContext {
    pub store: Arc<dyn ConfigStore>,
    pub bus: EventBus,
    pub dispatcher: Arc<dyn UiDispatcher>,
    pub runtime: Handle,
}

impl ModuleContext {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        bus: EventBus,
        dispatcher: Arc<dyn UiDispatcher>,
        runtime: Handle,
    ) -> Self {
        Self {
            store,
            bus,
            dispatcher,
            runtime,
        }
    }

    /// Context on the current runtime with a fresh bus and inline dispatch.
    pub fn current(store: Arc<dyn ConfigStore>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|err| KitError::NoRuntime(err.to_string()))?;
        Ok(Self::new(
            store,
            EventBus::default(),
            Arc::new(InlineDispatcher),
            runtime,
        ))
    }
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext")
            .field("store", &self.store)
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

/// Lifecycle state of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    Unavailable,
    Disabled,
    Enabled,
    Terminated,
}

#[derive(Debug)]
struct Lifecycle {
    status: ModuleStatus,
    mounted: bool,
    popup_visible: bool,
    popup_pinned: bool,
}

/// Supervisor of one metric family.
///
/// Lifecycle transitions run one at a time. A `disable` or `terminate` issued
/// while `enable` is starting readers waits for it and then stops them.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use statwatch_kit::{
///     source_fn, MemoryStore, MetricPayload, Module, ModuleConfig, ModuleContext, Reader,
/// };
///
/// #[tokio::main]
/// async fn main() {
///     let ctx = ModuleContext::current(Arc::new(MemoryStore::new())).unwrap();
///     let module = Module::new(ModuleConfig::new("CPU").default_state(true), ctx);
///
///     let weak = Arc::downgrade(&module);
///     let reader = Reader::builder("load", source_fn(|| Some(0.3_f64)))
///         .module("CPU")
///         .handler(move |load| {
///             if let Some(module) = weak.upgrade() {
///                 module.deliver(&MetricPayload::Percentage(*load));
///             }
///         })
///         .build()
///         .unwrap();
///     module.add_reader(reader);
///
///     module.listen();
///     module.mount();
/// }
/// ```
pub struct Module {
    name: String,
    config: ModuleConfig,
    ctx: ModuleContext,
    hooks: Box<dyn ModuleHooks>,
    available: bool,
    lifecycle: Mutex<Lifecycle>,
    /// Held for the whole of a lifecycle transition, reader fan-out included.
    transition: Mutex<()>,
    readers: RwLock<Vec<Arc<dyn ReaderControl>>>,
    widgets: WidgetSet,
    popup: RwLock<Option<Arc<dyn Popup>>>,
    notifications: RwLock<Option<Arc<Notifications>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Module {
    /// Build a module with default hooks.
    pub fn new(config: ModuleConfig, ctx: ModuleContext) -> Arc<Self> {
        Self::with_hooks(config, ctx, DefaultHooks)
    }

    /// Build a module, resolving availability and the persisted enabled flag.
    pub fn with_hooks<H>(config: ModuleConfig, ctx: ModuleContext, hooks: H) -> Arc<Self>
    where
        H: ModuleHooks + 'static,
    {
        let name = config.name.clone();
        let store = ctx.store.clone();
        let state_key = format!("{name}_state");
        let available = hooks.is_available();
        let mut enabled = store.bool(&state_key, config.default_state);

        let status = if !available {
            if enabled {
                store.set_bool(&state_key, false);
            }
            info!(module = %name, "Module is not available");
            ModuleStatus::Unavailable
        } else {
            if enabled && store.bool(PAUSE_KEY, false) {
                debug!(module = %name, "Application is paused, module starts disabled");
                enabled = false;
            }
            if enabled {
                ModuleStatus::Enabled
            } else {
                ModuleStatus::Disabled
            }
        };

        let widgets = WidgetSet::new(name.clone(), store, config.default_widget());

        Arc::new(Self {
            name,
            config,
            ctx,
            hooks: Box::new(hooks),
            available,
            lifecycle: Mutex::new(Lifecycle {
                status,
                mounted: false,
                popup_visible: false,
                popup_pinned: false,
            }),
            transition: Mutex::new(()),
            readers: RwLock::new(Vec::new()),
            widgets,
            popup: RwLock::new(None),
            notifications: RwLock::new(None),
            listener: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    pub fn context(&self) -> &ModuleContext {
        &self.ctx
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn status(&self) -> ModuleStatus {
        self.lifecycle.lock().status
    }

    pub fn is_enabled(&self) -> bool {
        self.status() == ModuleStatus::Enabled
    }

    pub fn is_popup_visible(&self) -> bool {
        self.lifecycle.lock().popup_visible
    }

    pub fn widgets(&self) -> &WidgetSet {
        &self.widgets
    }

    pub fn reader_count(&self) -> usize {
        self.readers.read().len()
    }

    fn state_key(&self) -> String {
        format!("{}_state", self.name)
    }

    fn paused(&self) -> bool {
        self.ctx.store.bool(PAUSE_KEY, false)
    }

    /// Hand a reader to the module. Ignored when the module is unavailable.
    ///
    /// A reader added after an enabled module was mounted starts right away.
    pub fn add_reader<R>(&self, reader: R)
    where
        R: ReaderControl + 'static,
    {
        if !self.available {
            debug!(module = %self.name, reader = reader.name(), "Module unavailable, reader ignored");
            return;
        }

        let reader: Arc<dyn ReaderControl> = Arc::new(reader);
        let _transition = self.transition.lock();
        let start_now = {
            let lifecycle = self.lifecycle.lock();
            lifecycle.mounted && lifecycle.status == ModuleStatus::Enabled
        };
        self.readers.write().push(reader.clone());

        if start_now {
            reader.init_store_values(&self.name, &*self.ctx.store);
            reader.start();
        }
    }

    /// Attach a widget. Returns `None` when the module is unavailable.
    pub fn add_widget(&self, widget: Arc<dyn Widget>) -> Option<WidgetId> {
        if !self.available {
            return None;
        }
        Some(self.widgets.push(widget))
    }

    /// Attach the module's notification helper, clearing stale ids.
    pub fn attach_notifications(&self, notifications: Notifications, ids: &[&str]) -> Arc<Notifications> {
        notifications.init_ids(ids);
        let notifications = Arc::new(notifications);
        *self.notifications.write() = Some(notifications.clone());
        notifications
    }

    pub fn notifications(&self) -> Option<Arc<Notifications>> {
        self.notifications.read().clone()
    }

    /// Hook for a reader builder's `on_ready`.
    pub fn ready_hook(self: &Arc<Self>, reader: &str) -> impl Fn() + Send + Sync + 'static {
        let weak: Weak<Self> = Arc::downgrade(self);
        let reader = reader.to_string();
        move || {
            if let Some(module) = weak.upgrade() {
                debug!(module = %module.name, reader = %reader, "Reader delivered first value");
                module.hooks.reader_ready(&reader);
            }
        }
    }

    /// Start the readers of an enabled module. Only the first call does anything.
    pub fn mount(&self) {
        let _transition = self.transition.lock();
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.mounted {
                debug!(module = %self.name, "Module already mounted");
                return;
            }
            lifecycle.mounted = true;
            if lifecycle.status != ModuleStatus::Enabled {
                return;
            }
        }

        self.start_readers();
        self.widgets.enable(&*self.ctx.dispatcher);
        debug!(module = %self.name, "Module mounted");
    }

    /// Enable the module and persist the choice. No-op when unavailable or terminated.
    pub fn enable(&self) {
        let _transition = self.transition.lock();
        {
            let mut lifecycle = self.lifecycle.lock();
            match lifecycle.status {
                ModuleStatus::Unavailable | ModuleStatus::Terminated => {
                    debug!(module = %self.name, status = ?lifecycle.status, "Ignoring enable");
                    return;
                }
                ModuleStatus::Disabled | ModuleStatus::Enabled => {}
            }
            lifecycle.status = ModuleStatus::Enabled;
        }

        self.ctx.store.set_bool(&self.state_key(), true);
        self.start_readers();
        self.widgets.enable(&*self.ctx.dispatcher);
        info!(module = %self.name, "Module enabled");
    }

    /// Disable the module, stop its readers and hide its widgets and popup.
    ///
    /// While the application is paused the disabled state is not persisted.
    pub fn disable(&self) {
        let _transition = self.transition.lock();
        let popup_was_visible = {
            let mut lifecycle = self.lifecycle.lock();
            match lifecycle.status {
                ModuleStatus::Unavailable | ModuleStatus::Terminated => {
                    debug!(module = %self.name, status = ?lifecycle.status, "Ignoring disable");
                    return;
                }
                ModuleStatus::Disabled | ModuleStatus::Enabled => {}
            }
            lifecycle.status = ModuleStatus::Disabled;
            std::mem::replace(&mut lifecycle.popup_visible, false)
        };

        if !self.paused() {
            self.ctx.store.set_bool(&self.state_key(), false);
        }
        for reader in self.readers.read().iter() {
            reader.stop();
        }
        self.widgets.disable(&*self.ctx.dispatcher);
        if popup_was_visible {
            self.close_popup();
        }
        info!(module = %self.name, "Module disabled");
    }

    /// Tear the module down. Irreversible.
    pub fn terminate(&self) {
        let _transition = self.transition.lock();
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.status == ModuleStatus::Terminated {
                return;
            }
            lifecycle.status = ModuleStatus::Terminated;
            lifecycle.popup_visible = false;
        }

        self.hooks.will_terminate();
        if let Some(notifications) = self.notifications() {
            notifications.will_terminate();
        }
        for reader in self.readers.read().iter() {
            reader.stop();
            reader.terminate();
        }
        self.widgets.disable(&*self.ctx.dispatcher);
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
        info!(module = %self.name, "Module terminated");
    }

    /// Popup visibility changed.
    ///
    /// Opening is ignored unless the module is enabled. Repeating the current
    /// visibility does nothing.
    pub fn set_popup_visible(&self, visible: bool) {
        let _transition = self.transition.lock();
        {
            let mut lifecycle = self.lifecycle.lock();
            if visible && lifecycle.status != ModuleStatus::Enabled {
                debug!(module = %self.name, "Popup not opened, module is not enabled");
                return;
            }
            if lifecycle.popup_visible == visible {
                return;
            }
            lifecycle.popup_visible = visible;
        }

        if visible {
            for reader in self.readers.read().iter().filter(|r| r.is_popup()) {
                reader.unlock();
                reader.start();
            }
            self.show_popup(true);
        } else {
            self.close_popup();
        }
    }

    pub fn toggle_popup(&self) {
        let visible = self.is_popup_visible();
        self.set_popup_visible(!visible);
    }

    /// A pinned popup survives clicks in the settings window.
    pub fn set_popup_pinned(&self, pinned: bool) {
        self.lifecycle.lock().popup_pinned = pinned;
    }

    /// Swap the popup view. The current one is hidden first.
    pub fn replace_popup(&self, popup: Arc<dyn Popup>) {
        let _transition = self.transition.lock();
        let was_visible = std::mem::replace(&mut self.lifecycle.lock().popup_visible, false);
        if was_visible {
            self.close_popup();
        }
        *self.popup.write() = Some(popup);
    }

    fn close_popup(&self) {
        for reader in self.readers.read().iter().filter(|r| r.is_popup()) {
            reader.pause();
            reader.lock();
        }
        self.show_popup(false);
    }

    fn show_popup(&self, visible: bool) {
        let popup = self.popup.read().clone();
        if let Some(popup) = popup {
            self.ctx
                .dispatcher
                .dispatch(Box::new(move || popup.set_visible(visible)));
        }
    }

    /// Switch a widget on or off (`None` flips it). Returns whether it changed.
    ///
    /// Turning the last widget off disables the module; turning one on in a
    /// disabled module enables it.
    pub fn toggle_widget(&self, id: WidgetId, active: Option<bool>) -> bool {
        let target = active.unwrap_or_else(|| !self.widgets.is_active(id));
        if !self.widgets.set_active(id, target) {
            return false;
        }

        self.sync_with_widgets();
        if let Some(widget) = self.widgets.get(id) {
            let visible = target && self.is_enabled();
            self.ctx
                .dispatcher
                .dispatch(Box::new(move || widget.set_visible(visible)));
        }
        self.ctx.bus.publish(BusEvent::ToggleWidget {
            module: self.name.clone(),
        });
        true
    }

    fn sync_with_widgets(&self) {
        let any_active = self.widgets.any_active();
        let enabled = self.is_enabled();
        if !any_active && enabled {
            self.disable();
        } else if any_active && !enabled {
            self.enable();
        }
    }

    /// Push a payload to the active widgets. Dropped unless the module is enabled.
    pub fn deliver(&self, payload: &MetricPayload) -> usize {
        if !self.is_enabled() {
            return 0;
        }
        self.widgets.deliver(payload, &*self.ctx.dispatcher)
    }

    /// Push a payload to the popup. Dropped while the popup is hidden.
    pub fn deliver_popup(&self, payload: &MetricPayload) -> bool {
        if !self.is_popup_visible() {
            return false;
        }
        let Some(popup) = self.popup.read().clone() else {
            return false;
        };
        let payload = payload.clone();
        self.ctx
            .dispatcher
            .dispatch(Box::new(move || popup.set_value(&payload)));
        true
    }

    /// React to one bus event.
    pub fn handle_event(&self, event: &BusEvent) {
        match event {
            BusEvent::ToggleModule { module, state } => {
                if self.paused() {
                    self.ctx.store.set_bool(PAUSE_KEY, false);
                    self.ctx.bus.publish(BusEvent::Pause { state: false });
                }
                if module != &self.name {
                    return;
                }
                let enabled = self.is_enabled();
                match state.unwrap_or(!enabled) {
                    true if !enabled => self.enable(),
                    false if enabled => self.disable(),
                    _ => {}
                }
            }
            BusEvent::TogglePopup { module, visible } if module == &self.name => {
                let target = visible.unwrap_or_else(|| !self.is_popup_visible());
                self.set_popup_visible(target);
            }
            BusEvent::ToggleWidget { module } if module == &self.name => {
                self.sync_with_widgets();
            }
            BusEvent::ClickInSettings => {
                let hide = {
                    let lifecycle = self.lifecycle.lock();
                    lifecycle.popup_visible && !lifecycle.popup_pinned
                };
                if hide {
                    self.set_popup_visible(false);
                }
            }
            BusEvent::Pause { state: true } => {
                if !self.paused() {
                    self.ctx.store.set_bool(PAUSE_KEY, true);
                }
                if self.is_enabled() {
                    self.disable();
                }
            }
            BusEvent::Pause { state: false } => {
                let wanted = self.ctx.store.bool(&self.state_key(), self.config.default_state);
                if wanted && self.status() == ModuleStatus::Disabled {
                    self.enable();
                }
            }
            _ => {}
        }
    }

    /// Subscribe to the bus. Events are handled in order on blocking threads.
    ///
    /// The subscription ends when the module is terminated or dropped.
    pub fn listen(self: &Arc<Self>) {
        let mut rx = self.ctx.bus.subscribe();
        let weak = Arc::downgrade(self);
        let name = self.name.clone();

        let task = self.ctx.runtime.spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(module = %name, skipped, "Bus subscriber lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(module) = weak.upgrade() else {
                    break;
                };
                let handled = tokio::task::spawn_blocking(move || module.handle_event(&event)).await;
                if let Err(err) = handled {
                    error!(module = %name, error = %err, "Bus event handler failed");
                }
            }
            debug!(module = %name, "Bus listener stopped");
        });

        if let Some(previous) = self.listener.lock().replace(task) {
            previous.abort();
        }
    }

    fn start_readers(&self) {
        for reader in self.readers.read().iter() {
            reader.init_store_values(&self.name, &*self.ctx.store);
            reader.start();
        }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("available", &self.available)
            .field("lifecycle", &*self.lifecycle.lock())
            .field("readers", &self.reader_count())
            .field("widgets", &self.widgets)
            .finish()
    }
}
