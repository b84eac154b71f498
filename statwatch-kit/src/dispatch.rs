//! Hand-off of widget updates to the UI context.
//!
//! Reader handlers run on blocking worker threads. Anything that touches a
//! widget goes through a [`UiDispatcher`] so the UI side decides where it runs.

use std::fmt;

use tokio::sync::mpsc;
use tracing::debug;

/// A unit of UI work.
pub type UiJob = Box<dyn FnOnce() + Send + 'static>;

/// Schedules UI work.
pub trait UiDispatcher: Send + Sync {
    fn dispatch(&self, job: UiJob);
}

/// Runs jobs immediately on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatcher;

impl UiDispatcher for InlineDispatcher {
    fn dispatch(&self, job: UiJob) {
        job();
    }
}

/// Queues jobs for a UI loop that drains a [`UiQueue`].
///
/// # Example
///
/// ```rust
/// use statwatch_kit::{QueueDispatcher, UiDispatcher};
///
/// let (dispatcher, mut queue) = QueueDispatcher::new();
/// dispatcher.dispatch(Box::new(|| println!("redraw")));
/// assert_eq!(queue.run_pending(), 1);
/// ```
#[derive(Clone)]
pub struct QueueDispatcher {
    tx: mpsc::UnboundedSender<UiJob>,
}

impl QueueDispatcher {
    pub fn new() -> (Self, UiQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, UiQueue { rx })
    }
}

impl fmt::Debug for QueueDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueDispatcher")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl UiDispatcher for QueueDispatcher {
    fn dispatch(&self, job: UiJob) {
        if self.tx.send(job).is_err() {
            debug!("UI queue closed, dropping job");
        }
    }
}

/// Receiving side of a [`QueueDispatcher`].
pub struct UiQueue {
    rx: mpsc::UnboundedReceiver<UiJob>,
}

impl UiQueue {
    /// Run every job queued so far. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Wait for the next job and run it. Returns `false` once all dispatchers are gone.
    pub async fn run_next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for UiQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiQueue").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn inline_runs_immediately() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        InlineDispatcher.dispatch(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn queue_defers_until_drained() {
        let (dispatcher, mut queue) = QueueDispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = hits.clone();
            dispatcher.dispatch(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        assert_eq!(queue.run_pending(), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(queue.run_pending(), 0);
    }

    #[tokio::test]
    async fn run_next_stops_when_dispatchers_dropped() {
        let (dispatcher, mut queue) = QueueDispatcher::new();
        dispatcher.dispatch(Box::new(|| {}));
        drop(dispatcher);

        assert!(queue.run_next().await);
        assert!(!queue.run_next().await);
    }
}
