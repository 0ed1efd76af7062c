use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

/// Callback contract for observing metadata changes.
///
/// All three handlers default to no-ops so implementations only override
/// the events they care about. Handlers are invoked from the store's watch
/// delivery task, serialized per store instance; listeners registered on
/// different instances may fire concurrently.
pub trait MetadataListener: Send + Sync + 'static {
    fn on_add(
        &self,
        _key: &str,
        _new_value: &str,
    ) {
    }

    fn on_update(
        &self,
        _key: &str,
        _new_value: &str,
    ) {
    }

    fn on_remove(
        &self,
        _key: &str,
        _old_value: &str,
    ) {
    }
}

/// A classified change, produced by diffing a watch event against the
/// last-known state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MetadataChange {
    Added { key: String, value: String },
    Updated { key: String, value: String },
    Removed { key: String, old_value: String },
}

/// Ordered, identity-deduplicated set of listeners.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    listeners: Mutex<Vec<Arc<dyn MetadataListener>>>,
}

impl ListenerRegistry {
    /// Registers a listener; re-adding the same instance is a no-op, so a
    /// listener never receives the same event twice for one change.
    pub(crate) fn add(
        &self,
        listener: Arc<dyn MetadataListener>,
    ) {
        let mut listeners = self.listeners.lock();
        if !listeners.iter().any(|l| same_instance(l, &listener)) {
            listeners.push(listener);
        }
    }

    pub(crate) fn remove(
        &self,
        listener: &Arc<dyn MetadataListener>,
    ) {
        self.listeners.lock().retain(|l| !same_instance(l, listener));
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Dispatches `change` to every listener in insertion order.
    ///
    /// A panicking listener must not take down the delivery task or starve
    /// the listeners behind it; the panic is caught and logged.
    pub(crate) fn notify(
        &self,
        change: &MetadataChange,
    ) {
        let snapshot: Vec<Arc<dyn MetadataListener>> = self.listeners.lock().clone();
        for listener in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| match change {
                MetadataChange::Added { key, value } => listener.on_add(key, value),
                MetadataChange::Updated { key, value } => listener.on_update(key, value),
                MetadataChange::Removed { key, old_value } => listener.on_remove(key, old_value),
            }));
            if outcome.is_err() {
                warn!("metadata listener panicked while handling {:?}", change);
            }
        }
    }
}

/// Identity comparison on the data pointer only; `Arc::ptr_eq` on trait
/// objects also compares vtable pointers, which can differ across codegen
/// units for the same instance.
fn same_instance(
    a: &Arc<dyn MetadataListener>,
    b: &Arc<dyn MetadataListener>,
) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
