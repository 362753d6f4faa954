//! Runtime events emitted by the session for observers.
//!
//! Kept lightweight so the turn loop can emit without blocking; a lagging
//! subscriber loses events rather than stalling the pipeline.

use crate::session::ModeChange;
use tokio::sync::broadcast;

/// Events describing what the session is doing right now.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A filtered, non-empty transcript entered dispatch.
    Heard { text: String },
    /// Reply text about to be rendered as speech.
    Reply { text: String },
    /// A mode transition was applied.
    ModeChanged(ModeChange),
    /// An action request completed (success or captured failure).
    ActionRan { name: String, success: bool },
    /// Shutdown was requested by a terminal action.
    ShutdownRequested,
}

/// Broadcast sender for runtime events. Emission is best-effort: with no
/// subscribers the event is simply dropped.
#[derive(Debug, Clone)]
pub struct RuntimeEvents {
    tx: broadcast::Sender<RuntimeEvent>,
}

impl RuntimeEvents {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: RuntimeEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for RuntimeEvents {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_is_fine() {
        let events = RuntimeEvents::default();
        events.emit(RuntimeEvent::ShutdownRequested);
    }

    #[tokio::test]
    async fn subscriber_receives_events_in_order() {
        let events = RuntimeEvents::default();
        let mut rx = events.subscribe();
        events.emit(RuntimeEvent::Heard {
            text: "hello".into(),
        });
        events.emit(RuntimeEvent::Reply { text: "hi".into() });
        assert!(matches!(
            rx.recv().await.unwrap(),
            RuntimeEvent::Heard { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            RuntimeEvent::Reply { .. }
        ));
    }
}
