//! # Keyed Fan-In Join
//!
//! [`JoinBuffer`] holds partial records keyed by message id until both sides,
//! `A` and `B`, have contributed. The contribution that completes a record
//! returns a [`Joined`] value carrying every lineage handle collected for the
//! key and removes the record, so each key yields at most one joined record.
//!
//! A side that contributes twice before the other side arrives overwrites its
//! earlier value; both lineages are kept so both inputs are settled when the
//! record completes or is evicted.
//!
//! Incomplete records can be bounded two ways, both optional:
//! - by age, checked by [`JoinBuffer::evict_expired`] on every tick;
//! - by count, checked when a new key would exceed the capacity, evicting the
//!   oldest record first.
//!
//! Evicted records hand back their lineages so the caller can fail them and
//! let the source redeliver.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::time::{Duration, Instant};

/// One side of a contribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Side<A, B> {
  /// Left-hand contribution.
  A(A),
  /// Right-hand contribution.
  B(B),
}

/// Bounds on incomplete records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinPolicy {
  /// Maximum age of an incomplete record.
  pub ttl: Option<Duration>,
  /// Maximum number of incomplete records.
  pub capacity: Option<usize>,
}

/// A completed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joined<K, A, B, L> {
  /// Join key.
  pub key: K,
  /// Left-hand value.
  pub a: A,
  /// Right-hand value.
  pub b: B,
  /// Every lineage handle contributed for the key.
  pub lineages: Vec<L>,
}

/// Why an incomplete record was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
  /// It outlived the configured time-to-live.
  Expired,
  /// A newer key needed its place.
  Capacity,
  /// The key was failed explicitly.
  Failed,
  /// The buffer was drained on shutdown.
  Drained,
}

/// An incomplete record removed from the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evicted<K, L> {
  /// Join key.
  pub key: K,
  /// Lineage handles the record held.
  pub lineages: Vec<L>,
  /// Why it was removed.
  pub reason: EvictionReason,
}

/// Result of one contribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinStep<K, A, B, L> {
  /// The completed record, if this contribution completed one.
  pub joined: Option<Joined<K, A, B, L>>,
  /// Records evicted to make room for this contribution.
  pub evicted: Vec<Evicted<K, L>>,
}

#[derive(Debug)]
struct Partial<A, B, L> {
  a: Option<A>,
  b: Option<B>,
  lineages: Vec<L>,
  seq: u64,
  created: Instant,
}

/// Buffer of partial records keyed by `K`.
#[derive(Debug)]
pub struct JoinBuffer<K, A, B, L> {
  records: HashMap<K, Partial<A, B, L>>,
  order: BTreeMap<u64, K>,
  next_seq: u64,
  policy: JoinPolicy,
}

impl<K, A, B, L> JoinBuffer<K, A, B, L>
where
  K: Hash + Eq + Clone,
{
  /// Creates an empty buffer bounded by `policy`.
  pub fn new(policy: JoinPolicy) -> Self {
    Self {
      records: HashMap::new(),
      order: BTreeMap::new(),
      next_seq: 0,
      policy,
    }
  }

  /// Creates an unbounded buffer.
  pub fn unbounded() -> Self {
    Self::new(JoinPolicy::default())
  }

  /// Adds one side's value for `key`, together with its lineage handles.
  pub fn contribute(
    &mut self,
    key: K,
    side: Side<A, B>,
    lineage: impl IntoIterator<Item = L>,
    now: Instant,
  ) -> JoinStep<K, A, B, L> {
    let mut evicted = Vec::new();
    if !self.records.contains_key(&key) {
      evicted = self.make_room();
      let seq = self.next_seq;
      self.next_seq += 1;
      self.order.insert(seq, key.clone());
      self.records.insert(
        key.clone(),
        Partial {
          a: None,
          b: None,
          lineages: Vec::new(),
          seq,
          created: now,
        },
      );
    }

    let Some(record) = self.records.get_mut(&key) else {
      return JoinStep {
        joined: None,
        evicted,
      };
    };
    record.lineages.extend(lineage);
    match side {
      Side::A(a) => record.a = Some(a),
      Side::B(b) => record.b = Some(b),
    }

    if record.a.is_none() || record.b.is_none() {
      return JoinStep {
        joined: None,
        evicted,
      };
    }

    let joined = self.remove(&key).and_then(|p| match (p.a, p.b) {
      (Some(a), Some(b)) => Some(Joined {
        key,
        a,
        b,
        lineages: p.lineages,
      }),
      _ => None,
    });
    JoinStep { joined, evicted }
  }

  /// Drops the record for `key`, returning its lineages for failing.
  pub fn fail_key(&mut self, key: &K) -> Option<Evicted<K, L>> {
    self.remove(key).map(|p| Evicted {
      key: key.clone(),
      lineages: p.lineages,
      reason: EvictionReason::Failed,
    })
  }

  /// Drops every record older than the time-to-live.
  pub fn evict_expired(&mut self, now: Instant) -> Vec<Evicted<K, L>> {
    let Some(ttl) = self.policy.ttl else {
      return Vec::new();
    };
    let expired: Vec<K> = self
      .order
      .values()
      .filter(|k| {
        self
          .records
          .get(*k)
          .is_some_and(|p| now.saturating_duration_since(p.created) >= ttl)
      })
      .cloned()
      .collect();
    self.evict_keys(expired, EvictionReason::Expired)
  }

  /// Drops every record, oldest first.
  pub fn drain(&mut self) -> Vec<Evicted<K, L>> {
    let keys: Vec<K> = self.order.values().cloned().collect();
    self.evict_keys(keys, EvictionReason::Drained)
  }

  /// Number of incomplete records.
  pub fn len(&self) -> usize {
    self.records.len()
  }

  /// Whether no record is pending.
  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  /// Whether `key` has an incomplete record.
  pub fn contains(&self, key: &K) -> bool {
    self.records.contains_key(key)
  }

  fn make_room(&mut self) -> Vec<Evicted<K, L>> {
    let Some(capacity) = self.policy.capacity else {
      return Vec::new();
    };
    let mut evicted = Vec::new();
    while self.records.len() >= capacity {
      let Some((_, oldest)) = self.order.pop_first() else {
        break;
      };
      if let Some(p) = self.records.remove(&oldest) {
        evicted.push(Evicted {
          key: oldest,
          lineages: p.lineages,
          reason: EvictionReason::Capacity,
        });
      }
    }
    evicted
  }

  fn evict_keys(&mut self, keys: Vec<K>, reason: EvictionReason) -> Vec<Evicted<K, L>> {
    keys
      .into_iter()
      .filter_map(|key| {
        self.remove(&key).map(|p| Evicted {
          key,
          lineages: p.lineages,
          reason,
        })
      })
      .collect()
  }

  fn remove(&mut self, key: &K) -> Option<Partial<A, B, L>> {
    let partial = self.records.remove(key)?;
    self.order.remove(&partial.seq);
    Some(partial)
  }
}
