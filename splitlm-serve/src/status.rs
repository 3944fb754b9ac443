//! Server status observation
//!
//! The server reports what it is doing as [`StatusEvent`]s. Events go through
//! an unbounded channel to a dedicated task that calls each
//! [`StatusObserver`] in turn, so observers never hold up a network write
//! and never miss an event.
//!
//! [`StatusEvent::Idle`] is derived by the dispatcher itself from the order in
//! which connection events arrive, so it can never be delivered while a
//! connection it has seen open is still being served.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use splitlm::ErrorKind;
use splitlm_runtime::FinishReason;

#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    Listening { addr: SocketAddr },
    Connected { peer: SocketAddr },
    /// One fragment was produced for `peer`. `index` counts from 0 per connection.
    Fragment {
        peer: SocketAddr,
        index: usize,
        text: String,
    },
    Finished {
        peer: SocketAddr,
        reason: FinishReason,
        fragments: usize,
    },
    Failed {
        peer: Option<SocketAddr>,
        kind: ErrorKind,
        message: String,
    },
    /// No connection is being served. Delivered by the dispatcher after
    /// `Listening` and after the event that ends the last open connection.
    Idle,
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listening { addr } => write!(f, "Listening on {addr}"),
            Self::Connected { peer } => write!(f, "Connected to {peer}"),
            Self::Fragment { index, text, .. } => write!(f, "Generated {index}: {text}"),
            Self::Finished {
                peer,
                reason,
                fragments,
            } => write!(f, "Finished {peer} ({reason:?}, {fragments} fragments)"),
            Self::Failed {
                peer: Some(peer),
                kind,
                message,
            } => write!(f, "Error ({kind}) with {peer} - {message}"),
            Self::Failed {
                peer: None,
                kind,
                message,
            } => write!(f, "Error ({kind}) - {message}"),
            Self::Idle => f.write_str("Idle"),
        }
    }
}

/// Receives status events. Called from the dispatcher task, one event at a time.
pub trait StatusObserver: Send + Sync {
    fn on_event(&self, event: &StatusEvent);
}

impl<F> StatusObserver for F
where
    F: Fn(&StatusEvent) + Send + Sync,
{
    fn on_event(&self, event: &StatusEvent) {
        self(event);
    }
}

/// Writes every event to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl StatusObserver for LogObserver {
    fn on_event(&self, event: &StatusEvent) {
        match event {
            StatusEvent::Fragment { peer, .. } => log::debug!("[{peer}] {event}"),
            StatusEvent::Failed { .. } => log::warn!("{event}"),
            _ => log::info!("{event}"),
        }
    }
}

#[derive(Debug)]
struct DisplayState {
    status: String,
    generated: Vec<String>,
}

/// The server's display: a status line plus the fragments generated for the
/// most recent connection.
#[derive(Debug)]
pub struct DisplayLog {
    state: Mutex<DisplayState>,
}

impl Default for DisplayLog {
    fn default() -> Self {
        Self {
            state: Mutex::new(DisplayState {
                status: "Server Status: Idle".to_string(),
                generated: Vec::new(),
            }),
        }
    }
}

impl DisplayLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status line, e.g. `Server Status: Connected to 10.0.0.2:50312`.
    pub fn status(&self) -> String {
        self.lock().status.clone()
    }

    /// `Generated {i}: {text}` entries for the current connection.
    pub fn generated(&self) -> Vec<String> {
        self.lock().generated.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DisplayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StatusObserver for DisplayLog {
    fn on_event(&self, event: &StatusEvent) {
        let mut state = self.lock();
        match event {
            StatusEvent::Connected { peer } => {
                state.status = format!("Server Status: Connected to {peer}");
                state.generated.clear();
            }
            StatusEvent::Fragment { .. } => state.generated.push(event.to_string()),
            StatusEvent::Failed { message, .. } => {
                state.status = format!("Server Status: Error - {message}");
            }
            StatusEvent::Idle => state.status = "Server Status: Idle".to_string(),
            StatusEvent::Listening { .. } | StatusEvent::Finished { .. } => {}
        }
    }
}

/// Cheap handle for emitting status events.
#[derive(Clone)]
pub struct StatusSink {
    tx: Option<mpsc::UnboundedSender<StatusEvent>>,
}

impl StatusSink {
    /// A sink that drops every event.
    #[must_use]
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: StatusEvent) {
        if let Some(tx) = &self.tx {
            // Only fails once the dispatcher has stopped.
            let _ = tx.send(event);
        }
    }
}

/// Counts open connections in delivery order.
#[derive(Debug, Default)]
struct ConnectionCount(usize);

impl ConnectionCount {
    /// Update the count for `event`; true if the server is idle afterwards.
    fn becomes_idle(&mut self, event: &StatusEvent) -> bool {
        match event {
            StatusEvent::Listening { .. } => self.0 == 0,
            StatusEvent::Connected { .. } => {
                self.0 += 1;
                false
            }
            StatusEvent::Finished { .. } | StatusEvent::Failed { peer: Some(_), .. } => {
                self.0 = self.0.saturating_sub(1);
                self.0 == 0
            }
            _ => false,
        }
    }
}

/// Start the dispatcher task for `observers`.
///
/// The task ends after every [`StatusSink`] clone has been dropped and the
/// remaining events have been delivered.
pub fn spawn_dispatcher(observers: Vec<Arc<dyn StatusObserver>>) -> (StatusSink, JoinHandle<()>) {
    if observers.is_empty() {
        return (StatusSink::disabled(), tokio::spawn(async {}));
    }
    let (tx, mut rx) = mpsc::unbounded_channel::<StatusEvent>();
    let handle = tokio::spawn(async move {
        let deliver = |event: &StatusEvent| {
            for observer in &observers {
                observer.on_event(event);
            }
        };
        let mut open = ConnectionCount::default();
        while let Some(event) = rx.recv().await {
            deliver(&event);
            if open.becomes_idle(&event) {
                deliver(&StatusEvent::Idle);
            }
        }
    });
    (StatusSink { tx: Some(tx) }, handle)
}
