//! Delivery of state snapshots to whoever is watching a run.
//!
//! `publish` is called synchronously by the orchestrator, in transition
//! order, before the run moves on.

use std::io::Write;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::state::StateSnapshot;

pub trait StatePublisher: Send + Sync {
    fn publish(&self, snapshot: StateSnapshot);
}

impl<F> StatePublisher for F
where
    F: Fn(StateSnapshot) + Send + Sync,
{
    fn publish(&self, snapshot: StateSnapshot) {
        self(snapshot)
    }
}

/// Forwards snapshots into an unbounded channel.
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<StateSnapshot>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StateSnapshot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatePublisher for ChannelPublisher {
    fn publish(&self, snapshot: StateSnapshot) {
        if self.tx.send(snapshot).is_err() {
            debug!("Snapshot receiver dropped");
        }
    }
}

/// Writes each snapshot as one line of JSON.
pub struct JsonLinesPublisher<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesPublisher<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|p| p.into_inner())
    }
}

impl<W: Write + Send> StatePublisher for JsonLinesPublisher<W> {
    fn publish(&self, snapshot: StateSnapshot) {
        let line = match serde_json::to_string(&snapshot) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to serialize snapshot");
                return;
            }
        };
        let mut writer = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            warn!(error = %e, "Failed to write snapshot");
        }
    }
}
