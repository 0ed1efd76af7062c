//! The metadata store engine.
//!
//! ## Key Responsibilities
//! - Durable get/put/put_if_absent/replace/remove against the coordination
//!   hierarchy, with atomicity routed through the service's conditional
//!   primitives
//! - Lifecycle management (start/stop) of the watch delivery task
//! - Listener registration and exactly-once-per-change fan-out
//!
//! ## Example Usage
//! ```rust
//! use std::sync::Arc;
//!
//! use m_store::InMemoryEnsemble;
//! use m_store::MetadataStore;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> m_store::Result<()> {
//! let ensemble = InMemoryEnsemble::new();
//! let store = MetadataStore::new(Arc::new(ensemble.client()));
//! store.start().await?;
//! store.put("service-endpoint", "10.0.0.7:6170").await?;
//! assert_eq!(
//!     Some("10.0.0.7:6170".to_string()),
//!     store.get("service-endpoint").await?
//! );
//! # store.stop().await;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use nanoid::nanoid;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::ListenerRegistry;
use super::MetadataListener;
use super::PathResolver;
use super::StoreWatcher;
use crate::utils::convert::bytes_to_string;
use crate::utils::convert::string_to_bytes;
use crate::CoordinationClient;
use crate::CoordinationError;
use crate::CreateMode;
use crate::Result;
use crate::Settings;
use crate::StoreError;
use crate::INSTANCE_ID_LEN;

/// Characters that would break the key-to-path mapping: a separator would
/// silently create a grandchild outside the child-watch scope.
const REJECTED_KEY_CHARS: [char; 2] = ['/', '\0'];

struct WatcherHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Distributed key-value metadata store with change notification.
///
/// Entries live as nodes under a configurable root in a hierarchical
/// coordination service; every started instance sharing that root observes
/// each other's changes through the service's watch mechanism. The remote
/// hierarchy is authoritative: reads go through to the service, the local
/// cache only serves watch-event classification.
pub struct MetadataStore {
    client: Arc<dyn CoordinationClient>,
    settings: Settings,
    resolver: Arc<PathResolver>,
    listeners: Arc<ListenerRegistry>,
    /// Last-known state, owned by the watch loop
    cache: Arc<DashMap<String, String>>,
    /// Correlates log lines when several instances share a process
    instance_id: String,
    started: AtomicBool,
    watcher: Mutex<Option<WatcherHandle>>,
}

impl MetadataStore {
    /// Creates a store over `client` with default [`Settings`].
    pub fn new(client: Arc<dyn CoordinationClient>) -> Self {
        Self::with_settings(client, Settings::default())
    }

    pub fn with_settings(
        client: Arc<dyn CoordinationClient>,
        settings: Settings,
    ) -> Self {
        let resolver = Arc::new(PathResolver::new(&settings.store.root));
        Self {
            client,
            settings,
            resolver,
            listeners: Arc::new(ListenerRegistry::default()),
            cache: Arc::new(DashMap::new()),
            instance_id: nanoid!(INSTANCE_ID_LEN),
            started: AtomicBool::new(false),
            watcher: Mutex::new(None),
        }
    }

    /// Establishes the root node and spawns the watch delivery task.
    /// Idempotent; every other operation fails until this has succeeded.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("[{}] store already started", self.instance_id);
            return Ok(());
        }

        if let Err(e) = self.client.ensure_path(self.resolver.root()).await {
            self.started.store(false, Ordering::SeqCst);
            return Err(e);
        }

        // the subscription must exist before start() returns, or changes
        // made before the watch task's first poll would be lost for good
        let receiver = match self.client.watch_children(self.resolver.root()).await {
            Ok(receiver) => receiver,
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let token = CancellationToken::new();
        let watcher = StoreWatcher::new(
            self.client.clone(),
            self.resolver.clone(),
            self.cache.clone(),
            self.listeners.clone(),
            self.settings.store.notify_unchanged_updates,
            self.settings.retry.watch,
            self.instance_id.clone(),
        );
        let handle = watcher.spawn(receiver, token.clone());
        *self.watcher.lock() = Some(WatcherHandle { token, handle });

        info!(
            "[{}] metadata store started at root {}",
            self.instance_id,
            self.resolver.root()
        );
        Ok(())
    }

    /// Releases the watch and stops delivering events. Idempotent.
    pub async fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        let watcher = self.watcher.lock().take();
        if let Some(WatcherHandle { token, handle }) = watcher {
            token.cancel();
            if let Err(e) = handle.await {
                warn!("[{}] watch task did not shut down cleanly: {:?}", self.instance_id, e);
            }
        }
        info!("[{}] metadata store stopped", self.instance_id);
    }

    /// Returns the current remote value, or `None` if no node exists.
    /// Reads through to the service; the local cache is never the source.
    pub async fn get(
        &self,
        key: &str,
    ) -> Result<Option<String>> {
        self.ensure_started()?;
        validate_key(key)?;

        match self.client.get_data(&self.resolver.path(key)).await {
            Ok(node) => Ok(Some(bytes_to_string(node.data)?)),
            Err(e) if e.is_no_node() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Upserts `key` and returns the prior value, or `None` when the entry
    /// was created. Plain `put` is last-write-wins; losing a create or
    /// overwrite race is retried within the mutation retry budget.
    pub async fn put(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Option<String>> {
        self.ensure_started()?;
        validate_key(key)?;

        let path = self.resolver.path(key);
        let bytes = string_to_bytes(value);

        for _ in 0..=self.settings.retry.mutation.max_retries {
            match self.client.get_data(&path).await {
                Ok(node) => match self.client.set_data(&path, &bytes, None).await {
                    Ok(_) => return Ok(Some(bytes_to_string(node.data)?)),
                    // deleted underneath us; retry as a create
                    Err(e) if e.is_no_node() => continue,
                    Err(e) => return Err(e),
                },
                Err(e) if e.is_no_node() => {
                    match self.client.create(&path, &bytes, CreateMode::Persistent).await {
                        Ok(()) => return Ok(None),
                        // lost the creation race; retry as an overwrite
                        Err(e) if e.is_node_exists() => continue,
                        Err(e) => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(self.mutation_retry_timeout())
    }

    /// Atomically creates `key` unless present. Returns `None` when this
    /// call created the entry, or the existing value when another writer
    /// (possibly in another process) holds it. Never check-then-act: the
    /// decision is the service's atomic create.
    pub async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Option<String>> {
        self.ensure_started()?;
        validate_key(key)?;

        let path = self.resolver.path(key);
        let bytes = string_to_bytes(value);

        for _ in 0..=self.settings.retry.mutation.max_retries {
            match self.client.create(&path, &bytes, CreateMode::Persistent).await {
                Ok(()) => return Ok(None),
                Err(e) if e.is_node_exists() => match self.client.get_data(&path).await {
                    Ok(existing) => return Ok(Some(bytes_to_string(existing.data)?)),
                    // removed between the refused create and the read
                    Err(e) if e.is_no_node() => continue,
                    Err(e) => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
        Err(self.mutation_retry_timeout())
    }

    /// Compare-and-swap: updates `key` to `new_value` only if the current
    /// remote value equals `expected`. Returns `false` (no error, no
    /// notification) when the value does not match or another writer wins
    /// the race; the version precondition on the write is what makes the
    /// swap atomic.
    pub async fn replace(
        &self,
        key: &str,
        expected: &str,
        new_value: &str,
    ) -> Result<bool> {
        self.ensure_started()?;
        validate_key(key)?;

        let path = self.resolver.path(key);
        let node = match self.client.get_data(&path).await {
            Ok(node) => node,
            Err(e) if e.is_no_node() => return Ok(false),
            Err(e) => return Err(e),
        };
        if node.data != expected.as_bytes() {
            return Ok(false);
        }

        let bytes = string_to_bytes(new_value);
        match self.client.set_data(&path, &bytes, Some(node.version)).await {
            Ok(_) => Ok(true),
            // a concurrent writer got there first; a lost CAS is not an error
            Err(e) if e.is_bad_version() || e.is_no_node() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Deletes `key`, returning the prior value, or `None` if no node
    /// existed.
    pub async fn remove(
        &self,
        key: &str,
    ) -> Result<Option<String>> {
        self.ensure_started()?;
        validate_key(key)?;

        let path = self.resolver.path(key);

        for _ in 0..=self.settings.retry.mutation.max_retries {
            let node = match self.client.get_data(&path).await {
                Ok(node) => node,
                Err(e) if e.is_no_node() => return Ok(None),
                Err(e) => return Err(e),
            };
            match self.client.delete(&path, Some(node.version)).await {
                Ok(()) => return Ok(Some(bytes_to_string(node.data)?)),
                // changed underneath us; re-read and try again
                Err(e) if e.is_bad_version() => continue,
                Err(e) if e.is_no_node() => return Ok(None),
                Err(e) => return Err(e),
            }
        }
        Err(self.mutation_retry_timeout())
    }

    /// Registers a listener for add/update/remove events, local and remote.
    /// Re-adding the same instance is a no-op.
    pub fn add_listener(
        &self,
        listener: Arc<dyn MetadataListener>,
    ) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(
        &self,
        listener: &Arc<dyn MetadataListener>,
    ) {
        self.listeners.remove(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Root path all entries of this store live under.
    pub fn root(&self) -> &str {
        self.resolver.root()
    }

    /// Node path a key maps to (useful for inspecting raw state through
    /// the coordination client directly).
    pub fn path(
        &self,
        key: &str,
    ) -> String {
        self.resolver.path(key)
    }

    fn ensure_started(&self) -> Result<()> {
        if self.started.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::NotStarted.into())
        }
    }

    fn mutation_retry_timeout(&self) -> crate::Error {
        CoordinationError::RetryTimeout(Duration::from_millis(
            self.settings.retry.mutation.timeout_ms,
        ))
        .into()
    }
}

fn validate_key(key: &str) -> Result<()> {
    for rejected in REJECTED_KEY_CHARS {
        if key.contains(rejected) {
            return Err(StoreError::InvalidArgument {
                argument: "key",
                rejected,
            }
            .into());
        }
    }
    Ok(())
}
