//! Process-wide event bus between the settings UI, modules and the app shell.

use tokio::sync::broadcast;
use tracing::trace;

/// Default capacity of the bus backlog per subscriber.
pub const DEFAULT_BUS_CAPACITY: usize = 64;

/// Events exchanged over the [`EventBus`].
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// Enable or disable a module. `None` flips the current state.
    ToggleModule { module: String, state: Option<bool> },
    /// Show or hide a module's popup. `None` flips the current visibility.
    TogglePopup {
        module: String,
        visible: Option<bool>,
    },
    /// A widget of the module was switched on or off.
    ToggleWidget { module: String },
    /// The user clicked inside the settings window.
    ClickInSettings,
    /// The global pause flag changed.
    Pause { state: bool },
}

impl BusEvent {
    /// The module the event targets, if it targets one.
    pub fn module(&self) -> Option<&str> {
        match self {
            BusEvent::ToggleModule { module, .. }
            | BusEvent::TogglePopup { module, .. }
            | BusEvent::ToggleWidget { module } => Some(module),
            BusEvent::ClickInSettings | BusEvent::Pause { .. } => None,
        }
    }
}

/// Broadcast bus. Cloning yields another handle to the same bus.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Returns how many subscribers will see it.
    ///
    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, event: BusEvent) -> usize {
        trace!(?event, "Publishing bus event");
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(BusEvent::ClickInSettings), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(BusEvent::Pause { state: true });
        bus.publish(BusEvent::ToggleWidget {
            module: "CPU".to_string(),
        });

        assert_eq!(rx.recv().await.unwrap(), BusEvent::Pause { state: true });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.module(), Some("CPU"));
    }
}
