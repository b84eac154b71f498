//! Pausable repeating timer.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{error, trace};

/// Shortest period a [`Repeater`] accepts. Smaller values are raised to this.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Whether a [`Repeater`] is currently firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeaterState {
    Paused,
    Running,
}

type Callback = Arc<dyn Fn() + Send + Sync>;

/// Invokes a callback every `period` on a blocking worker thread.
///
/// A repeater starts paused. The first fire after [`start`](Self::start) comes
/// one period later. Callback runs never overlap: the next tick waits until
/// the previous run returned, and missed ticks are not replayed. A panicking
/// callback is logged and the repeater keeps going.
///
/// Dropping the repeater cancels it.
pub struct Repeater {
    period: Duration,
    state: RepeaterState,
    callback: Callback,
    runtime: Handle,
    task: Option<JoinHandle<()>>,
    fires: Arc<AtomicU64>,
}

impl Repeater {
    /// Create a paused repeater.
    pub fn new<F>(period: Duration, runtime: Handle, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            period: period.max(MIN_PERIOD),
            state: RepeaterState::Paused,
            callback: Arc::new(callback),
            runtime,
            task: None,
            fires: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Begin firing. Has no effect while running.
    pub fn start(&mut self) {
        if self.state == RepeaterState::Running {
            return;
        }
        self.spawn(self.period);
    }

    /// Stop firing. Has no effect while paused.
    ///
    /// A callback run already in progress finishes on its own.
    pub fn pause(&mut self) {
        if self.state == RepeaterState::Paused {
            return;
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.state = RepeaterState::Paused;
    }

    /// Change the period.
    ///
    /// With `restart` the callback runs right away and the repeater keeps
    /// firing at the new period. Without it the repeater is left paused.
    pub fn reset(&mut self, period: Duration, restart: bool) {
        self.pause();
        self.period = period.max(MIN_PERIOD);
        if restart {
            self.spawn(Duration::ZERO);
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn state(&self) -> RepeaterState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RepeaterState::Running
    }

    /// Number of times the callback was invoked.
    pub fn fires(&self) -> u64 {
        self.fires.load(Ordering::Relaxed)
    }

    fn spawn(&mut self, first_delay: Duration) {
        let callback = self.callback.clone();
        let fires = self.fires.clone();
        let period = self.period;

        let task = self.runtime.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + first_delay, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                fires.fetch_add(1, Ordering::Relaxed);
                trace!(period_ms = period.as_millis() as u64, "Repeater fired");

                let callback = callback.clone();
                if let Err(err) = tokio::task::spawn_blocking(move || callback()).await {
                    if err.is_panic() {
                        error!(error = %err, "Repeater callback panicked");
                    }
                }
            }
        });

        self.task = Some(task);
        self.state = RepeaterState::Running;
    }
}

impl Drop for Repeater {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl fmt::Debug for Repeater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repeater")
            .field("period", &self.period)
            .field("state", &self.state)
            .field("fires", &self.fires())
            .finish()
    }
}
