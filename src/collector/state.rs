use log::warn;
use tokio::sync::watch;

/// Lifecycle of one listener connection.
///
/// ```text
/// Disconnected → Connecting → Connected → Disconnected → ...
///                     └──────────────────→ Disconnected   (open failed)
/// any ──────────────────────────────────→ Closing        (shutdown, terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        match (self, next) {
            (Closing, _) => false,
            (_, Closing) => true,
            (Disconnected, Connecting)
            | (Connecting, Connected)
            | (Connecting, Disconnected)
            | (Connected, Disconnected) => true,
            _ => false,
        }
    }
}

/// Publishes state changes to any number of observers.
pub struct StateCell {
    tx: watch::Sender<ConnectionState>,
    label: &'static str,
}

impl StateCell {
    pub fn new(label: &'static str) -> Self {
        let (tx, _) = watch::channel(ConnectionState::Disconnected);
        Self { tx, label }
    }

    pub fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Applies a transition. Repeating the current state is a no-op;
    /// illegal transitions are logged and ignored.
    pub fn set(&self, next: ConnectionState) {
        let current = self.get();
        if current == next {
            return;
        }
        if !current.can_transition_to(next) {
            warn!("[{}] ignoring illegal transition {:?} -> {:?}", self.label, current, next);
            return;
        }
        self.tx.send_replace(next);
    }
}
