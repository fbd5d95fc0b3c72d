//! Console event feed
//!
//! The session core never touches UI concerns directly. Forced logouts,
//! denied-access notices and navigation requests are published on a broadcast
//! channel; the hosting shell subscribes and reacts however it likes.

use tokio::sync::broadcast;
use tracing::debug;

/// Severity of a user-facing notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Events emitted by the session and authorization layers
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleEvent {
    /// The session was forcibly terminated (expired or unrecoverable 401)
    SessionExpired,
    /// The caller attempted something their grants do not cover
    AccessDenied { detail: String },
    /// The shell should navigate somewhere
    RedirectTo {
        path: String,
        query: Vec<(String, String)>,
    },
    /// A user-facing notification
    Notify { severity: Severity, message: String },
}

/// Broadcast fan-out for [`ConsoleEvent`]s.
///
/// Emitting never fails; with no subscribers the event is dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ConsoleEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ConsoleEvent) {
        debug!(event = ?event, "Emitting console event");
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(ConsoleEvent::SessionExpired);
        assert_eq!(rx.recv().await.unwrap(), ConsoleEvent::SessionExpired);
    }

    #[test]
    fn emit_without_subscribers_is_a_no_op() {
        let bus = EventBus::new();
        bus.emit(ConsoleEvent::Notify {
            severity: Severity::Info,
            message: "hello".to_string(),
        });
    }
}
