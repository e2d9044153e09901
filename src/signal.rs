//! Per-node signals with synchronous, ordered delivery.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::component::ComponentId;

/// The payload delivered to signal observers: the affected plug.
#[derive(Debug, Clone)]
pub struct PlugEvent {
    /// Handle of the affected plug.
    pub plug: ComponentId,
    /// Full dot-separated name of the plug at the time of the event, e.g.
    /// `"AddNode.sum"`.
    pub path: String,
}

type Slot = Arc<dyn Fn(&PlugEvent) + Send + Sync>;

/// An append-only list of observers notified synchronously on the mutating
/// thread.
///
/// Cloning a signal is cheap and yields a handle to the same observer list.
/// Observers cannot be removed; delivery order is subscription order. Each
/// emission delivers to a snapshot of the list taken up front, so an observer
/// may mutate the graph or subscribe further observers; events raised by such
/// a mutation are delivered re-entrantly before the mutating call returns,
/// and a mid-emission subscription takes effect from the next emission.
#[derive(Clone, Default)]
pub struct Signal {
    slots: Arc<Mutex<Vec<Slot>>>,
}

impl Signal {
    /// Subscribe an observer.
    pub fn connect(&self, slot: impl Fn(&PlugEvent) + Send + Sync + 'static) {
        self.slots.lock().push(Arc::new(slot));
    }

    pub(crate) fn emit(&self, event: &PlugEvent) {
        // Snapshot and release before delivery; observers may re-enter.
        let slots: Vec<Slot> = self.slots.lock().clone();
        for slot in &slots {
            slot(event);
        }
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("slots", &self.slots.lock().len())
            .finish()
    }
}

/// The two per-node signals.
#[derive(Debug, Clone, Default)]
pub struct NodeSignals {
    /// Emitted exactly once per successful value assignment.
    pub(crate) set: Signal,
    /// Emitted once per plug per propagation pass.
    pub(crate) dirtied: Signal,
}

/// A test utility that records every event from the signals it is attached
/// to, in delivery order.
///
/// Multiple nodes' signals can be aggregated into one capturing slot.
#[derive(Clone, Default)]
pub struct CapturingSlot {
    events: Arc<Mutex<Vec<PlugEvent>>>,
}

impl CapturingSlot {
    /// A new, empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start recording events from `signal`.
    pub fn attach(&self, signal: &Signal) {
        let events = self.events.clone();
        signal.connect(move |event| events.lock().push(event.clone()));
    }

    /// A snapshot of the recorded events.
    pub fn events(&self) -> Vec<PlugEvent> {
        self.events.lock().clone()
    }

    /// The recorded plug paths, in delivery order.
    pub fn paths(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.path.clone()).collect()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// True if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Drop all recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}
