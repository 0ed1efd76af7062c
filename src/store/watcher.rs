use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use super::ListenerRegistry;
use super::MetadataChange;
use super::PathResolver;
use crate::utils::async_task::task_with_timeout_and_exponential_backoff;
use crate::BackoffPolicy;
use crate::CoordinationClient;
use crate::NodeEvent;
use crate::NodeEventKind;
use crate::Result;

/// Watch-event delivery loop of one store instance.
///
/// Subscribes to the root's child events, diffs each event against the
/// last-known cache to classify it as add/update/remove, and fans the
/// classified change out to the listener registry. Local and remote
/// mutations both arrive on this single serialized stream, which is what
/// makes delivery exactly-once per distinct change for this instance.
pub(crate) struct StoreWatcher {
    client: Arc<dyn CoordinationClient>,
    resolver: Arc<PathResolver>,
    cache: Arc<DashMap<String, String>>,
    listeners: Arc<ListenerRegistry>,
    notify_unchanged_updates: bool,
    retry: BackoffPolicy,
    instance_id: String,
}

impl StoreWatcher {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        client: Arc<dyn CoordinationClient>,
        resolver: Arc<PathResolver>,
        cache: Arc<DashMap<String, String>>,
        listeners: Arc<ListenerRegistry>,
        notify_unchanged_updates: bool,
        retry: BackoffPolicy,
        instance_id: String,
    ) -> Self {
        Self {
            client,
            resolver,
            cache,
            listeners,
            notify_unchanged_updates,
            retry,
            instance_id,
        }
    }

    /// Starts the delivery loop over an already-established subscription.
    ///
    /// The first receiver must be obtained before the store's `start()`
    /// returns; otherwise changes made between `start()` and this task's
    /// first poll would never reach the watch stream. Only re-subscriptions
    /// after stream loss happen inside the loop.
    pub(crate) fn spawn(
        self,
        initial: mpsc::UnboundedReceiver<NodeEvent>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(initial, token).await })
    }

    async fn run(
        &self,
        initial: mpsc::UnboundedReceiver<NodeEvent>,
        token: CancellationToken,
    ) {
        let mut receiver = initial;
        loop {
            debug!("[{}] watching children of {}", self.instance_id, self.resolver.root());

            let mut stream = UnboundedReceiverStream::new(receiver);
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    event = stream.next() => match event {
                        Some(event) => self.apply(event),
                        None => {
                            // session lost; re-arm best effort. Changes that
                            // happen while we are down coalesce into the next
                            // diff: delivery is at-least-once, not exactly-once.
                            warn!("[{}] watch stream closed, re-subscribing", self.instance_id);
                            break;
                        }
                    },
                }
            }

            receiver = tokio::select! {
                _ = token.cancelled() => return,
                subscribed = self.subscribe() => match subscribed {
                    Ok(rx) => rx,
                    Err(e) => {
                        warn!(
                            "[{}] giving up on watch subscription: {:?}",
                            self.instance_id, e
                        );
                        return;
                    }
                },
            };
        }
    }

    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<NodeEvent>> {
        task_with_timeout_and_exponential_backoff(
            || self.client.watch_children(self.resolver.root()),
            self.retry.max_retries,
            Duration::from_millis(self.retry.base_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
            Duration::from_millis(self.retry.timeout_ms),
        )
        .await
    }

    /// Classifies one raw node event against the last-known state and
    /// notifies listeners. Reconciliation failures are logged and skipped;
    /// they must never terminate the delivery loop.
    pub(crate) fn apply(
        &self,
        event: NodeEvent,
    ) {
        let Some(key) = self.resolver.key_of(&event.path) else {
            // the root itself or something outside our subtree
            return;
        };
        let key = key.to_string();

        match event.kind {
            NodeEventKind::Created | NodeEventKind::DataChanged => {
                let Some(bytes) = event.data else {
                    warn!("[{}] data event without payload at {}", self.instance_id, event.path);
                    return;
                };
                let value = match String::from_utf8(bytes) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(
                            "[{}] skipping non-UTF-8 payload at {}: {:?}",
                            self.instance_id, event.path, e
                        );
                        return;
                    }
                };
                match self.cache.insert(key.clone(), value.clone()) {
                    None => self.listeners.notify(&MetadataChange::Added { key, value }),
                    Some(previous) if previous != value => {
                        self.listeners.notify(&MetadataChange::Updated { key, value })
                    }
                    Some(_) if self.notify_unchanged_updates => {
                        self.listeners.notify(&MetadataChange::Updated { key, value })
                    }
                    // redundant fire for a change we already observed
                    Some(_) => {}
                }
            }
            NodeEventKind::Deleted => {
                if let Some((_, old_value)) = self.cache.remove(&key) {
                    self.listeners.notify(&MetadataChange::Removed { key, old_value });
                }
            }
        }
    }
}
