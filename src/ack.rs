//! # Lineage Tracking
//!
//! The [`AckTracker`] decides when a source delivery is done. Every delivery
//! gets a [`Lineage`] root and one tracked edge. A stage that emits a message
//! derived from an input registers a child edge for each root the input
//! descends from ([`AckTracker::anchor`]) before it acks the input's own edge.
//! When the last edge of a root is acked the root completes; the first fail of
//! any edge settles it as failed. Either way exactly one [`Settlement`] is sent
//! to the source, which then acks or fails the delivery with its queue.
//!
//! Acks of edges that are unknown (already acked, or belonging to a root that
//! was already settled) are ignored, so a duplicate ack never settles a root
//! twice.

use crate::message::{Anchor, EdgeId, Lineage};
use crate::metrics;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Final outcome of one lineage root.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settlement {
  /// Every message derived from the delivery was processed.
  Ack(Lineage),
  /// Some derived message failed; the delivery should be redelivered.
  Fail(Lineage),
}

impl Settlement {
  /// The root this settlement applies to.
  pub fn lineage(&self) -> Lineage {
    match self {
      Settlement::Ack(l) | Settlement::Fail(l) => *l,
    }
  }
}

/// Receiver side of the settlement channel, owned by the source node.
pub type SettlementReceiver = mpsc::UnboundedReceiver<Settlement>;

/// Tracks outstanding edges per lineage root.
pub struct AckTracker {
  enabled: bool,
  next_edge: AtomicU64,
  roots: Mutex<HashMap<Lineage, HashSet<EdgeId>>>,
  settled_tx: mpsc::UnboundedSender<Settlement>,
}

impl AckTracker {
  /// Creates a tracker and the receiver its settlements are sent to.
  ///
  /// A disabled tracker never tracks anything: [`track`](Self::track) and
  /// [`anchor`](Self::anchor) return no anchors and no settlement is sent.
  pub fn new(enabled: bool) -> (Arc<Self>, SettlementReceiver) {
    let (settled_tx, settled_rx) = mpsc::unbounded_channel();
    let tracker = Arc::new(Self {
      enabled,
      next_edge: AtomicU64::new(1),
      roots: Mutex::new(HashMap::new()),
      settled_tx,
    });
    (tracker, settled_rx)
  }

  /// Creates a disabled tracker.
  pub fn disabled() -> Arc<Self> {
    Self::new(false).0
  }

  /// Whether lineage tracking is on.
  pub fn is_enabled(&self) -> bool {
    self.enabled
  }

  fn roots(&self) -> MutexGuard<'_, HashMap<Lineage, HashSet<EdgeId>>> {
    self.roots.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn next_edge(&self) -> EdgeId {
    EdgeId(self.next_edge.fetch_add(1, Ordering::Relaxed))
  }

  /// Starts tracking a new root and returns the anchor of its first edge.
  pub fn track(&self, root: Lineage) -> Vec<Anchor> {
    if !self.enabled {
      return Vec::new();
    }
    let edge = self.next_edge();
    self.roots().entry(root).or_default().insert(edge);
    trace!(%root, "tracking delivery");
    vec![Anchor::new(root, edge)]
  }

  /// Registers child edges for a message derived from `parents`.
  ///
  /// Returns one anchor per distinct live root among the parents. Roots that
  /// were already settled are skipped, so their descendants are untracked.
  pub fn anchor(&self, parents: &[Anchor]) -> Vec<Anchor> {
    if !self.enabled || parents.is_empty() {
      return Vec::new();
    }
    let mut roots = self.roots();
    let mut anchors = Vec::with_capacity(parents.len());
    let mut seen = HashSet::with_capacity(parents.len());
    for parent in parents {
      if !seen.insert(parent.root) {
        continue;
      }
      if let Some(edges) = roots.get_mut(&parent.root) {
        let edge = self.next_edge();
        edges.insert(edge);
        anchors.push(Anchor::new(parent.root, edge));
      }
    }
    anchors
  }

  /// Marks an edge as processed. Completes its root when no edges remain.
  pub fn ack(&self, anchor: &Anchor) {
    if !self.enabled {
      return;
    }
    let completed = {
      let mut roots = self.roots();
      match roots.get_mut(&anchor.root) {
        Some(edges) => {
          edges.remove(&anchor.edge);
          if edges.is_empty() {
            roots.remove(&anchor.root);
            true
          } else {
            false
          }
        }
        None => false,
      }
    };
    if completed {
      debug!(root = %anchor.root, "delivery completed");
      metrics::record_ack();
      let _ = self.settled_tx.send(Settlement::Ack(anchor.root));
    }
  }

  /// Marks an edge as failed. Settles its root as failed the first time.
  pub fn fail(&self, anchor: &Anchor) {
    if !self.enabled {
      return;
    }
    let failed = self.roots().remove(&anchor.root).is_some();
    if failed {
      debug!(root = %anchor.root, "delivery failed");
      metrics::record_fail();
      let _ = self.settled_tx.send(Settlement::Fail(anchor.root));
    }
  }

  /// Acks every anchor.
  pub fn ack_all(&self, anchors: &[Anchor]) {
    for anchor in anchors {
      self.ack(anchor);
    }
  }

  /// Fails every anchor.
  pub fn fail_all(&self, anchors: &[Anchor]) {
    for anchor in anchors {
      self.fail(anchor);
    }
  }

  /// Number of roots still awaiting settlement.
  pub fn pending_roots(&self) -> usize {
    self.roots().len()
  }

  /// Whether the root is still awaiting settlement.
  pub fn is_pending(&self, root: Lineage) -> bool {
    self.roots().contains_key(&root)
  }
}
