//! # statwatch-kit
//!
//! Scheduling and lifecycle core of the statwatch system monitor.
//!
//! The kit polls metric sources at independent intervals, suspends them when
//! nobody is looking, and fans results out to widgets and threshold
//! notifications without those consumers reaching back into the polling.
//!
//! - [`Repeater`]: pausable repeating timer
//! - [`Reader`]: one polled [`MetricSource`] with readiness and retry handling
//! - [`Module`]: supervisor that owns readers, widgets and a popup
//! - [`Notifications`]: fire-once/clear-once threshold alerts
//!
//! Collaborators are injected: a [`ConfigStore`] for persisted choices, an
//! [`EventBus`] for toggle events and a [`UiDispatcher`] for widget updates.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use statwatch_kit::{source_fn, MemoryStore, Module, ModuleConfig, ModuleContext, Reader};
//!
//! #[tokio::main]
//! async fn main() {
//!     let ctx = ModuleContext::current(Arc::new(MemoryStore::new())).unwrap();
//!     let module = Module::new(ModuleConfig::new("Uptime").default_state(true), ctx);
//!
//!     let started = std::time::Instant::now();
//!     let reader = Reader::builder("seconds", source_fn(move || Some(started.elapsed().as_secs())))
//!         .module("Uptime")
//!         .interval(Duration::from_secs(1))
//!         .handler(|secs| println!("up {secs}s"))
//!         .build()
//!         .unwrap();
//!
//!     module.add_reader(reader);
//!     module.mount();
//!
//!     tokio::time::sleep(Duration::from_secs(5)).await;
//!     module.terminate();
//! }
//! ```
//!
//! ## Logging
//!
//! Everything logs through `tracing` with `module` and `reader` fields. The
//! crate never installs a subscriber.

mod bus;
mod dispatch;
mod error;
mod module;
mod notifications;
mod reader;
mod repeater;
mod settings;
mod store;
mod widget;

pub use bus::{BusEvent, EventBus, DEFAULT_BUS_CAPACITY};
pub use dispatch::{InlineDispatcher, QueueDispatcher, UiDispatcher, UiJob, UiQueue};
pub use error::{KitError, NotifyError, Result, StoreError};
pub use module::{DefaultHooks, Module, ModuleContext, ModuleHooks, ModuleStatus, Popup};
pub use notifications::{
    Direction, LogCenter, NotificationCenter, Notifications, Threshold, Transition,
    DEFAULT_NAMESPACE,
};
pub use reader::{
    source_fn, FnSource, MetricSource, Reader, ReaderBuilder, ReaderControl, DEFAULT_INTERVAL,
    MAX_NIL_RETRIES,
};
pub use repeater::{Repeater, RepeaterState, MIN_PERIOD};
pub use settings::{ModuleConfig, Settings, WidgetConfig, ENV_PREFIX};
pub use store::{ConfigStore, FileStore, MemoryStore, StoreValue, PAUSE_KEY};
pub use widget::{Widget, WidgetId, WidgetSet};

// Re-export types for convenience
pub use statwatch_types::{MetricPayload, Segment, WidgetKind};
