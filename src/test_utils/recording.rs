use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::PROPAGATION_TIMEOUT;
use crate::MetadataListener;

/// `(event, key, value)` triple, e.g. `("add", "X", "1")`.
pub(crate) type RecordedChange = (&'static str, String, String);

/// Listener that records every notification and forwards it on a channel
/// so tests can apply bounded waits on delivery.
pub(crate) struct RecordingListener {
    changes: Mutex<Vec<RecordedChange>>,
    tx: mpsc::UnboundedSender<RecordedChange>,
}

impl RecordingListener {
    pub(crate) fn create() -> (Arc<Self>, mpsc::UnboundedReceiver<RecordedChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                changes: Mutex::new(Vec::new()),
                tx,
            }),
            rx,
        )
    }

    /// Everything observed so far, in delivery order.
    pub(crate) fn changes(&self) -> Vec<RecordedChange> {
        self.changes.lock().clone()
    }

    fn record(
        &self,
        change: RecordedChange,
    ) {
        self.changes.lock().push(change.clone());
        let _ = self.tx.send(change);
    }
}

impl MetadataListener for RecordingListener {
    fn on_add(
        &self,
        key: &str,
        new_value: &str,
    ) {
        self.record(("add", key.to_string(), new_value.to_string()));
    }

    fn on_update(
        &self,
        key: &str,
        new_value: &str,
    ) {
        self.record(("update", key.to_string(), new_value.to_string()));
    }

    fn on_remove(
        &self,
        key: &str,
        old_value: &str,
    ) {
        self.record(("remove", key.to_string(), old_value.to_string()));
    }
}

/// Waits for the next recorded change with the shared propagation timeout.
pub(crate) async fn await_change(rx: &mut mpsc::UnboundedReceiver<RecordedChange>) -> RecordedChange {
    tokio::time::timeout(PROPAGATION_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for a listener notification")
        .expect("listener channel closed")
}
