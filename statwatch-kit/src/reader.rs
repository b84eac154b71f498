//! Periodic metric readers.
//!
//! A [`Reader`] owns a [`MetricSource`], polls it on a [`Repeater`] and hands
//! every fresh value to its handler. The reader tracks readiness (first
//! successful value), retries a cold source a bounded number of times, and
//! supports popup-only readers that stay dormant until their popup opens.
//!
//! # States
//!
//! | State | Timer | `active` | Reached by |
//! |-------|-------|----------|------------|
//! | Created | none | false | build |
//! | Active | running | true | `start()` |
//! | Paused | paused | false | `pause()` |
//! | Stopped | none | false | `stop()`, retries exhausted |
//!
//! Popup readers additionally carry a lock. While locked, `start()` only
//! performs a single warm-up read until the reader is ready.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, error, trace, warn};

use crate::error::{KitError, Result};
use crate::repeater::{Repeater, RepeaterState};
use crate::store::{ConfigStore, StoreValue};

/// How many consecutive empty reads a non-optional reader tolerates before it
/// has produced its first value.
pub const MAX_NIL_RETRIES: u32 = 5;

/// Interval used when neither the builder nor the store provide one.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Persisted values are rewritten at most once per this many intervals.
const PERSIST_EVERY_INTERVALS: u32 = 10;

/// Produces metric values on demand.
///
/// `read` returns `None` when no value is available right now. Sources are
/// polled from blocking worker threads and never concurrently.
pub trait MetricSource: Send + 'static {
    type Value: Clone + Send + Sync + 'static;

    /// Called once when the reader is built.
    fn setup(&mut self) {}

    fn read(&mut self) -> Option<Self::Value>;

    /// Called when the owning module terminates.
    fn terminate(&mut self) {}
}

/// A [`MetricSource`] backed by a closure.
pub struct FnSource<F>(F);

/// Wrap a closure as a [`MetricSource`].
///
/// ```rust
/// use statwatch_kit::{source_fn, MetricSource};
///
/// let mut ticks = 0;
/// let mut source = source_fn(move || {
///     ticks += 1;
///     Some(ticks)
/// });
/// assert_eq!(source.read(), Some(1));
/// ```
pub fn source_fn<T, F>(f: F) -> FnSource<F>
where
    F: FnMut() -> Option<T> + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    FnSource(f)
}

impl<T, F> MetricSource for FnSource<F>
where
    F: FnMut() -> Option<T> + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    type Value = T;

    fn read(&mut self) -> Option<T> {
        (self.0)()
    }
}

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;
type ReadyHook = Arc<dyn Fn() + Send + Sync>;

struct ReaderState<T> {
    value: Option<T>,
    interval: Option<Duration>,
    ready: bool,
    locked: bool,
    initialized: bool,
    nil_retry_count: u32,
    last_persist: Option<Instant>,
}

struct Persistence<T> {
    store: Arc<dyn ConfigStore>,
    key: String,
    encode: fn(&T) -> Option<String>,
}

fn encode_json<T: Serialize>(value: &T) -> Option<String> {
    serde_json::to_string(value).ok()
}

fn decode_json<T: DeserializeOwned>(raw: &str) -> Option<T> {
    serde_json::from_str(raw).ok()
}

enum Flow {
    Done,
    Retry,
    Exhausted,
}

struct Inner<T> {
    name: String,
    module: String,
    popup: bool,
    optional: bool,
    default_interval: Duration,
    runtime: Handle,
    source: Mutex<Box<dyn MetricSource<Value = T>>>,
    state: Mutex<ReaderState<T>>,
    active: Mutex<bool>,
    timer: Mutex<Option<Repeater>>,
    handler: RwLock<Option<Handler<T>>>,
    ready_hook: Option<ReadyHook>,
    persistence: Option<Persistence<T>>,
    reads: AtomicU64,
    /// Bumped by every stop. Reads scheduled before a stop are dropped.
    generation: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> Inner<T> {
    fn label(&self) -> String {
        if self.module.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.module, self.name)
        }
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// One read cycle: poll the source, retrying while a cold non-optional
    /// source returns nothing. The source lock is held for the whole cycle so
    /// handler invocations never interleave.
    ///
    /// A cycle scheduled for `generation` does nothing once the reader has
    /// been stopped since.
    fn read_cycle(&self, generation: u64) {
        let mut source = self.source.lock();
        loop {
            if self.generation() != generation {
                trace!(reader = %self.label(), "Skipping read scheduled before stop");
                break;
            }
            self.reads.fetch_add(1, Ordering::Relaxed);
            let value = source.read();
            match self.callback(value) {
                Flow::Done => break,
                Flow::Retry => continue,
                Flow::Exhausted => {
                    // Still holding the source: queued cycles see the new generation.
                    self.stop();
                    break;
                }
            }
        }
    }

    fn callback(&self, value: Option<T>) -> Flow {
        let became_ready = {
            let mut state = self.state.lock();

            let Some(value) = value.as_ref() else {
                if self.optional || state.ready {
                    return Flow::Done;
                }
                state.nil_retry_count += 1;
                if state.nil_retry_count > MAX_NIL_RETRIES {
                    error!(
                        reader = %self.label(),
                        retries = state.nil_retry_count,
                        "Source returned no value {} times in a row, stopping reader",
                        state.nil_retry_count
                    );
                    return Flow::Exhausted;
                }
                debug!(
                    reader = %self.label(),
                    attempt = state.nil_retry_count,
                    "Source returned no value, retrying initial read"
                );
                return Flow::Retry;
            };

            state.nil_retry_count = 0;
            let became_ready = !state.ready;
            state.ready = true;
            state.value = Some(value.clone());
            became_ready
        };

        let Some(value) = value else {
            return Flow::Done;
        };

        if became_ready && !self.optional {
            debug!(reader = %self.label(), "Reader is ready");
            if let Some(hook) = &self.ready_hook {
                hook();
            }
        }

        let handler = self.handler.read().clone();
        if let Some(handler) = handler {
            handler(&value);
        }

        self.persist(&value, false);
        Flow::Done
    }

    fn persist(&self, value: &T, force: bool) {
        let Some(persistence) = &self.persistence else {
            return;
        };

        let now = Instant::now();
        {
            let mut state = self.state.lock();
            let interval = state.interval.unwrap_or(self.default_interval);
            if let Some(last) = state.last_persist {
                if !force && now.duration_since(last) <= interval * PERSIST_EVERY_INTERVALS {
                    return;
                }
            }
            state.last_persist = Some(now);
        }

        match (persistence.encode)(value) {
            Some(json) => persistence
                .store
                .set(&persistence.key, StoreValue::String(json)),
            None => warn!(reader = %self.label(), "Failed to encode reader value"),
        }
    }

    fn pause(&self) {
        if let Some(timer) = self.timer.lock().as_mut() {
            timer.pause();
        }
        *self.active.lock() = false;
    }

    fn stop(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(mut timer) = self.timer.lock().take() {
            timer.pause();
        }
        {
            let mut state = self.state.lock();
            state.initialized = false;
            state.nil_retry_count = 0;
        }
        *self.active.lock() = false;
        debug!(reader = %self.label(), "Reader stopped");
    }
}

/// A scheduled poller around one [`MetricSource`].
///
/// Cloning yields another handle to the same reader.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use statwatch_kit::{source_fn, Reader};
///
/// #[tokio::main]
/// async fn main() {
///     let reader = Reader::builder("load", source_fn(|| Some(0.42_f64)))
///         .module("CPU")
///         .interval(Duration::from_secs(1))
///         .handler(|value| println!("load = {value}"))
///         .build()
///         .unwrap();
///
///     reader.start();
///     tokio::time::sleep(Duration::from_secs(3)).await;
///     reader.stop();
/// }
/// ```
pub struct Reader<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Reader<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Reader<T> {
    /// Start building a reader named `name` around `source`.
    pub fn builder<S>(name: impl Into<String>, source: S) -> ReaderBuilder<T>
    where
        S: MetricSource<Value = T>,
    {
        ReaderBuilder::new(name.into(), Box::new(source))
    }

    /// Begin or resume periodic reading.
    ///
    /// Creates the timer on first use when an interval is known and performs
    /// one immediate read per start-from-stopped. Calling it while active has
    /// no further effect. A locked popup reader only warms up.
    pub fn start(&self) {
        let inner = &self.inner;
        let (interval, first_start) = {
            let mut state = inner.state.lock();
            if inner.popup && state.locked {
                let ready = state.ready;
                drop(state);
                if !ready {
                    self.spawn_read();
                }
                return;
            }
            let first_start = !state.initialized;
            state.initialized = true;
            (state.interval, first_start)
        };

        {
            let mut timer = inner.timer.lock();
            if timer.is_none() {
                if let Some(interval) = interval {
                    debug!(
                        reader = %inner.label(),
                        interval_ms = interval.as_millis() as u64,
                        "Set up update interval"
                    );
                    *timer = Some(self.new_timer(interval));
                }
            }
            if let Some(timer) = timer.as_mut() {
                timer.start();
            }
        }

        *inner.active.lock() = true;
        if first_start {
            self.spawn_read();
        }
    }

    /// Suspend reading. The timer and value are kept.
    pub fn pause(&self) {
        self.inner.pause();
    }

    /// Cancel and discard the timer. The next `start()` reads immediately.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn lock(&self) {
        self.inner.state.lock().locked = true;
    }

    pub fn unlock(&self) {
        self.inner.state.lock().locked = false;
    }

    /// Release the source.
    pub fn terminate(&self) {
        self.inner.source.lock().terminate();
        debug!(reader = %self.inner.label(), "Reader terminated");
    }

    /// Run one read cycle on the calling thread.
    pub fn read(&self) {
        self.inner.read_cycle(self.inner.generation());
    }

    /// Change the polling interval.
    ///
    /// A running timer restarts at the new period with an immediate read. A
    /// paused one only takes the new period.
    pub fn set_interval(&self, interval: Duration) {
        if interval.is_zero() {
            warn!(reader = %self.inner.label(), "Ignoring zero update interval");
            return;
        }
        self.inner.state.lock().interval = Some(interval);

        let active = self.is_active();
        if let Some(timer) = self.inner.timer.lock().as_mut() {
            timer.reset(interval, active);
        }
        debug!(
            reader = %self.inner.label(),
            interval_ms = interval.as_millis() as u64,
            "Update interval changed"
        );
    }

    /// Same as [`set_interval`](Self::set_interval) with whole seconds.
    pub fn set_interval_secs(&self, secs: u64) {
        self.set_interval(Duration::from_secs(secs));
    }

    /// Load the interval from `<title>_updateInterval` unless one is already set.
    pub fn init_store_values(&self, title: &str, store: &dyn ConfigStore) {
        let mut state = self.inner.state.lock();
        if state.interval.is_some() {
            return;
        }

        let key = format!("{title}_updateInterval");
        let default = self.inner.default_interval;
        let secs = match store.get(&key) {
            Some(StoreValue::String(raw)) => raw.trim().parse::<f64>().ok(),
            Some(StoreValue::Float(secs)) => Some(secs),
            Some(StoreValue::Int(secs)) => Some(secs as f64),
            Some(StoreValue::Bool(_)) => None,
            None => Some(default.as_secs_f64()),
        };

        let interval = match secs {
            Some(secs) if secs.is_finite() && secs > 0.0 => Duration::from_secs_f64(secs),
            _ => {
                warn!(
                    reader = %self.inner.label(),
                    key = %key,
                    "Invalid stored update interval, using default"
                );
                default
            }
        };
        state.interval = Some(interval);
    }

    /// Replace the value handler.
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        *self.inner.handler.write() = Some(Arc::new(handler));
    }

    /// Persist the current value now, ignoring the write throttle.
    pub fn save(&self) {
        let value = self.inner.state.lock().value.clone();
        if let Some(value) = value {
            self.inner.persist(&value, true);
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn module(&self) -> &str {
        &self.inner.module
    }

    pub fn is_popup(&self) -> bool {
        self.inner.popup
    }

    pub fn is_optional(&self) -> bool {
        self.inner.optional
    }

    /// Last value received, or restored from the store.
    pub fn value(&self) -> Option<T> {
        self.inner.state.lock().value.clone()
    }

    pub fn interval(&self) -> Option<Duration> {
        self.inner.state.lock().interval
    }

    pub fn is_active(&self) -> bool {
        *self.inner.active.lock()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.state.lock().ready
    }

    pub fn is_locked(&self) -> bool {
        self.inner.state.lock().locked
    }

    pub fn nil_retry_count(&self) -> u32 {
        self.inner.state.lock().nil_retry_count
    }

    pub fn has_timer(&self) -> bool {
        self.inner.timer.lock().is_some()
    }

    pub fn timer_state(&self) -> Option<RepeaterState> {
        self.inner.timer.lock().as_ref().map(Repeater::state)
    }

    pub fn timer_period(&self) -> Option<Duration> {
        self.inner.timer.lock().as_ref().map(Repeater::period)
    }

    /// Total calls made to the source.
    pub fn read_count(&self) -> u64 {
        self.inner.reads.load(Ordering::Relaxed)
    }

    fn new_timer(&self, interval: Duration) -> Repeater {
        let weak = Arc::downgrade(&self.inner);
        let generation = self.inner.generation();
        Repeater::new(interval, self.inner.runtime.clone(), move || {
            if let Some(inner) = weak.upgrade() {
                inner.read_cycle(generation);
            }
        })
    }

    fn spawn_read(&self) {
        let inner = self.inner.clone();
        let label = inner.label();
        let generation = inner.generation();
        self.inner.runtime.spawn(async move {
            let read = tokio::task::spawn_blocking(move || inner.read_cycle(generation));
            if let Err(err) = read.await {
                if err.is_panic() {
                    error!(reader = %label, error = %err, "Read panicked");
                }
            }
        });
    }
}

impl<T> fmt::Debug for Reader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("name", &self.inner.name)
            .field("module", &self.inner.module)
            .field("popup", &self.inner.popup)
            .field("optional", &self.inner.optional)
            .field("active", &*self.inner.active.lock())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Reader`].
pub struct ReaderBuilder<T> {
    name: String,
    module: String,
    source: Box<dyn MetricSource<Value = T>>,
    popup: bool,
    optional: bool,
    interval: Option<Duration>,
    default_interval: Duration,
    handler: Option<Handler<T>>,
    ready_hook: Option<ReadyHook>,
    runtime: Option<Handle>,
    persistence: Option<(Arc<dyn ConfigStore>, fn(&T) -> Option<String>, fn(&str) -> Option<T>)>,
}

impl<T: Clone + Send + Sync + 'static> ReaderBuilder<T> {
    fn new(name: String, source: Box<dyn MetricSource<Value = T>>) -> Self {
        Self {
            name,
            module: String::new(),
            source,
            popup: false,
            optional: false,
            interval: None,
            default_interval: DEFAULT_INTERVAL,
            handler: None,
            ready_hook: None,
            runtime: None,
            persistence: None,
        }
    }

    /// Name of the owning module, used in logs and store keys.
    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    /// Only read while the module's popup is visible.
    pub fn popup(mut self, popup: bool) -> Self {
        self.popup = popup;
        self
    }

    /// Empty reads are normal for this source. Disables the retry budget.
    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Fixed interval. Takes precedence over the stored one.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Interval used by `init_store_values` when the store has none.
    pub fn default_interval(mut self, interval: Duration) -> Self {
        self.default_interval = interval;
        self
    }

    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Called once, when the first value arrives. Not called for optional readers.
    pub fn on_ready<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.ready_hook = Some(Arc::new(hook));
        self
    }

    /// Runtime used for timers and reads. Defaults to the current one.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Persist values under `<module>@<name>` and restore the last one on build.
    pub fn persist(mut self, store: Arc<dyn ConfigStore>) -> Self
    where
        T: Serialize + DeserializeOwned,
    {
        self.persistence = Some((store, encode_json::<T>, decode_json::<T>));
        self
    }

    /// Build the reader and run the source's `setup`.
    ///
    /// Fails when no runtime was given and none is current.
    pub fn build(self) -> Result<Reader<T>> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|err| KitError::NoRuntime(err.to_string()))?,
        };

        let mut source = self.source;
        source.setup();

        let key = format!("{}@{}", self.module, self.name);
        let (persistence, restored) = match self.persistence {
            Some((store, encode, decode)) => {
                let restored = match store.get(&key) {
                    Some(StoreValue::String(raw)) => decode(&raw),
                    _ => None,
                };
                (Some(Persistence { store, key, encode }), restored)
            }
            None => (None, None),
        };

        let inner = Arc::new(Inner {
            name: self.name,
            module: self.module,
            popup: self.popup,
            optional: self.optional,
            default_interval: self.default_interval,
            runtime,
            source: Mutex::new(source),
            state: Mutex::new(ReaderState {
                value: restored.clone(),
                interval: self.interval,
                ready: false,
                locked: true,
                initialized: false,
                nil_retry_count: 0,
                last_persist: None,
            }),
            active: Mutex::new(false),
            timer: Mutex::new(None),
            handler: RwLock::new(self.handler),
            ready_hook: self.ready_hook,
            persistence,
            reads: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        });

        if let Some(value) = restored {
            debug!(reader = %inner.label(), "Restored persisted value");
            let handler = inner.handler.read().clone();
            if let Some(handler) = handler {
                handler(&value);
            }
        }
        debug!(reader = %inner.label(), "Successfully initialized reader");

        Ok(Reader { inner })
    }
}

/// Object-safe control surface over readers of any value type.
///
/// Modules hold their readers as `Arc<dyn ReaderControl>`.
pub trait ReaderControl: Send + Sync {
    fn name(&self) -> &str;
    fn is_popup(&self) -> bool;
    fn is_optional(&self) -> bool;
    fn is_active(&self) -> bool;
    fn start(&self);
    fn pause(&self);
    fn stop(&self);
    fn lock(&self);
    fn unlock(&self);
    fn terminate(&self);
    fn set_interval(&self, interval: Duration);
    fn init_store_values(&self, title: &str, store: &dyn ConfigStore);
}

impl<T: Clone + Send + Sync + 'static> ReaderControl for Reader<T> {
    fn name(&self) -> &str {
        Reader::name(self)
    }

    fn is_popup(&self) -> bool {
        Reader::is_popup(self)
    }

    fn is_optional(&self) -> bool {
        Reader::is_optional(self)
    }

    fn is_active(&self) -> bool {
        Reader::is_active(self)
    }

    fn start(&self) {
        Reader::start(self)
    }

    fn pause(&self) {
        Reader::pause(self)
    }

    fn stop(&self) {
        Reader::stop(self)
    }

    fn lock(&self) {
        Reader::lock(self)
    }

    fn unlock(&self) {
        Reader::unlock(self)
    }

    fn terminate(&self) {
        Reader::terminate(self)
    }

    fn set_interval(&self, interval: Duration) {
        Reader::set_interval(self, interval)
    }

    fn init_store_values(&self, title: &str, store: &dyn ConfigStore) {
        Reader::init_store_values(self, title, store)
    }
}
