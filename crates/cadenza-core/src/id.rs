//! Node identity registry.
//!
//! Issues human-readable node identifiers of the form `<sequence>-<nodeType>`
//! and tracks which of them are still alive, for debugging and lookup.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Sequence number reserved for the engine's output destination.
const DESTINATION_SEQUENCE: u64 = 0;

/// Unique, human-readable identifier of a graph node (e.g. `"3-noise"`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Arc<str>);

impl NodeId {
    fn new(sequence: u64, node_type: &str) -> Self {
        Self(Arc::from(format!("{sequence}-{node_type}")))
    }

    /// Id of the engine's output destination.
    pub fn destination() -> Self {
        Self::new(DESTINATION_SEQUENCE, "destination")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Sequence part of the id, if well formed.
    pub fn sequence(&self) -> Option<u64> {
        self.0.split_once('-').and_then(|(seq, _)| seq.parse().ok())
    }

    /// Node type part of the id.
    pub fn node_type(&self) -> &str {
        self.0.split_once('-').map(|(_, ty)| ty).unwrap_or(&self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Issues node ids and tracks their liveness.
///
/// Explicitly constructed and shared via `Arc`, so tests can run isolated
/// registries side by side.
#[derive(Debug)]
pub struct NodeIdRegistry {
    next: AtomicU64,
    live: DashMap<NodeId, String>,
}

impl NodeIdRegistry {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(DESTINATION_SEQUENCE + 1),
            live: DashMap::new(),
        }
    }

    /// Issue a fresh id for a node of the given type and mark it live.
    pub fn issue(&self, node_type: &str) -> NodeId {
        let sequence = self.next.fetch_add(1, Ordering::Relaxed);
        let id = NodeId::new(sequence, node_type);
        self.live.insert(id.clone(), node_type.to_string());
        tracing::trace!("Issued node id {}", id);
        id
    }

    /// Mark an id as released. Returns false if it was not live.
    pub fn release(&self, id: &NodeId) -> bool {
        let released = self.live.remove(id).is_some();
        if released {
            tracing::trace!("Released node id {}", id);
        }
        released
    }

    pub fn is_live(&self, id: &NodeId) -> bool {
        self.live.contains_key(id)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// All live ids, ordered by sequence.
    pub fn live_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.live.iter().map(|e| e.key().clone()).collect();
        ids.sort_by_key(|id| id.sequence());
        ids
    }

    /// Find a live id by its string form.
    pub fn lookup(&self, id: &str) -> Option<NodeId> {
        self.live
            .iter()
            .find(|e| e.key().as_str() == id)
            .map(|e| e.key().clone())
    }

    /// Node type a live id was issued for.
    pub fn node_type(&self, id: &NodeId) -> Option<String> {
        self.live.get(id).map(|e| e.value().clone())
    }

    /// Forget every id and restart the sequence. Test teardown only.
    pub fn reset(&self) {
        self.live.clear();
        self.next.store(DESTINATION_SEQUENCE + 1, Ordering::Relaxed);
    }
}

impl Default for NodeIdRegistry {
    fn default() -> Self {
        Self::new()
    }
}
