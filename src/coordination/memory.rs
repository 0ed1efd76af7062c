//! In-memory coordination service.
//!
//! A process-local stand-in for a real coordination ensemble: versioned
//! hierarchical nodes, atomic create-if-absent, version-checked writes and
//! deletes, and child-watch fan-out. Sessions created from one
//! [`InMemoryEnsemble`] share state, so several store instances can race
//! on the same root exactly like separate processes would against a real
//! service.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use super::CoordinationClient;
use super::CreateMode;
use super::NodeData;
use super::NodeEvent;
use super::NodeEventKind;
use crate::CoordinationError;
use crate::Result;

#[derive(Debug)]
struct StoredNode {
    data: Vec<u8>,
    version: i64,
    mode: CreateMode,
    owner_session: u64,
}

struct ChildWatcher {
    parent: String,
    session_id: u64,
    tx: mpsc::UnboundedSender<NodeEvent>,
}

#[derive(Default)]
struct EnsembleState {
    nodes: Mutex<BTreeMap<String, StoredNode>>,
    watchers: Mutex<Vec<ChildWatcher>>,
    next_session_id: AtomicU64,
}

impl EnsembleState {
    /// Fans an event out to every live watcher of the changed node's parent.
    ///
    /// Called with the nodes lock held so event order matches the
    /// serialization order of the mutations that produced them.
    fn emit(
        &self,
        event: NodeEvent,
    ) {
        let parent = parent_of(&event.path);
        self.watchers
            .lock()
            .retain(|w| w.parent != parent || w.tx.send(event.clone()).is_ok());
    }
}

/// Shared remote state of the in-memory service.
#[derive(Clone, Default)]
pub struct InMemoryEnsemble {
    state: Arc<EnsembleState>,
}

impl InMemoryEnsemble {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new session against this ensemble.
    pub fn client(&self) -> InMemoryCoordination {
        let session_id = self.state.next_session_id.fetch_add(1, Ordering::SeqCst);
        debug!("opened in-memory coordination session {}", session_id);
        InMemoryCoordination {
            state: self.state.clone(),
            session_id,
            connected: AtomicBool::new(true),
        }
    }

    #[cfg(test)]
    pub(crate) fn node_count(&self) -> usize {
        self.state.nodes.lock().len()
    }
}

/// One session of the in-memory service.
pub struct InMemoryCoordination {
    state: Arc<EnsembleState>,
    session_id: u64,
    connected: AtomicBool,
}

impl InMemoryCoordination {
    /// Simulates losing the session: subsequent calls fail with
    /// [`CoordinationError::SessionLost`], this session's watch streams
    /// close, and its ephemeral nodes are removed.
    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            debug!("in-memory coordination session {} disconnected", self.session_id);
            let mut nodes = self.state.nodes.lock();
            self.state.watchers.lock().retain(|w| w.session_id != self.session_id);

            let expired: Vec<String> = nodes
                .iter()
                .filter(|(_, n)| n.mode == CreateMode::Ephemeral && n.owner_session == self.session_id)
                .map(|(path, _)| path.clone())
                .collect();
            for path in expired {
                nodes.remove(&path);
                self.state.emit(NodeEvent {
                    path,
                    kind: NodeEventKind::Deleted,
                    data: None,
                });
            }
        }
    }

    /// Restores a disconnected session (new-session semantics: previously
    /// returned watch receivers stay closed and must be re-obtained).
    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(CoordinationError::SessionLost(format!(
                "session {} is disconnected",
                self.session_id
            ))
            .into())
        }
    }
}

#[async_trait]
impl CoordinationClient for InMemoryCoordination {
    async fn create(
        &self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
    ) -> Result<()> {
        self.ensure_connected()?;

        let mut nodes = self.state.nodes.lock();
        if nodes.contains_key(path) {
            return Err(CoordinationError::NodeExists {
                path: path.to_string(),
            }
            .into());
        }
        nodes.insert(
            path.to_string(),
            StoredNode {
                data: data.to_vec(),
                version: 0,
                mode,
                owner_session: self.session_id,
            },
        );
        self.state.emit(NodeEvent {
            path: path.to_string(),
            kind: NodeEventKind::Created,
            data: Some(data.to_vec()),
        });
        Ok(())
    }

    async fn get_data(
        &self,
        path: &str,
    ) -> Result<NodeData> {
        self.ensure_connected()?;

        let nodes = self.state.nodes.lock();
        let node = nodes.get(path).ok_or_else(|| CoordinationError::NoNode {
            path: path.to_string(),
        })?;
        Ok(NodeData {
            data: node.data.clone(),
            version: node.version,
        })
    }

    async fn set_data(
        &self,
        path: &str,
        data: &[u8],
        expected_version: Option<i64>,
    ) -> Result<i64> {
        self.ensure_connected()?;

        let mut nodes = self.state.nodes.lock();
        let node = nodes.get_mut(path).ok_or_else(|| CoordinationError::NoNode {
            path: path.to_string(),
        })?;
        if let Some(expected) = expected_version {
            if node.version != expected {
                return Err(CoordinationError::BadVersion {
                    path: path.to_string(),
                    expected,
                    actual: node.version,
                }
                .into());
            }
        }
        node.data = data.to_vec();
        node.version += 1;
        let version = node.version;
        self.state.emit(NodeEvent {
            path: path.to_string(),
            kind: NodeEventKind::DataChanged,
            data: Some(data.to_vec()),
        });
        Ok(version)
    }

    async fn check_exists(
        &self,
        path: &str,
    ) -> Result<bool> {
        self.ensure_connected()?;
        Ok(self.state.nodes.lock().contains_key(path))
    }

    async fn delete(
        &self,
        path: &str,
        expected_version: Option<i64>,
    ) -> Result<()> {
        self.ensure_connected()?;

        let mut nodes = self.state.nodes.lock();
        let node = nodes.get(path).ok_or_else(|| CoordinationError::NoNode {
            path: path.to_string(),
        })?;
        if let Some(expected) = expected_version {
            if node.version != expected {
                return Err(CoordinationError::BadVersion {
                    path: path.to_string(),
                    expected,
                    actual: node.version,
                }
                .into());
            }
        }
        nodes.remove(path);
        self.state.emit(NodeEvent {
            path: path.to_string(),
            kind: NodeEventKind::Deleted,
            data: None,
        });
        Ok(())
    }

    async fn watch_children(
        &self,
        path: &str,
    ) -> Result<mpsc::UnboundedReceiver<NodeEvent>> {
        self.ensure_connected()?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.state.watchers.lock().push(ChildWatcher {
            parent: path.to_string(),
            session_id: self.session_id,
            tx,
        });
        Ok(rx)
    }

    async fn ensure_path(
        &self,
        path: &str,
    ) -> Result<()> {
        self.ensure_connected()?;

        let mut prefix = String::new();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            prefix.push('/');
            prefix.push_str(component);
            match self.create(&prefix, &[], CreateMode::Persistent).await {
                Ok(()) => {}
                Err(e) if e.is_node_exists() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Parent path of a node ("/root/key" -> "/root").
fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}
