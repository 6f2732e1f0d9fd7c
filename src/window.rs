//! # Sliding-Window Counting
//!
//! A [`SlotCounter`] keeps, per key, a fixed ring of counters. A
//! [`WindowedCounter`] drives it as a sliding window: increments go to the
//! head slot, and each [`snapshot`](WindowedCounter::snapshot) returns the sum
//! over all slots before zeroing the tail slot and rotating.
//!
//! Time never enters the counter. Whoever calls `snapshot` on a fixed period
//! turns a window of `L` slots into `L` periods of history; the snapshot taken
//! at the end of a period still includes the slot it is about to evict.
//!
//! ```rust
//! use stormweave::window::WindowedCounter;
//!
//! let mut counter = WindowedCounter::new(3).unwrap();
//! counter.increment("rust".to_string());
//! let snapshot = counter.snapshot();
//! assert_eq!(snapshot.get(&"rust".to_string()), Some(1));
//! ```

use crate::error::WindowError;
use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
struct SlotEntry {
  slots: Vec<u64>,
  first_seen: u64,
}

impl SlotEntry {
  fn total(&self) -> u64 {
    self.slots.iter().sum()
  }
}

/// Per-key counters over a fixed ring of slots.
#[derive(Debug, Clone)]
pub struct SlotCounter<K> {
  entries: HashMap<K, SlotEntry>,
  num_slots: usize,
  next_seq: u64,
}

impl<K: Hash + Eq + Clone> SlotCounter<K> {
  /// Creates a counter with `num_slots` slots per key.
  pub fn new(num_slots: usize) -> Result<Self, WindowError> {
    if num_slots == 0 {
      return Err(WindowError::NoSlots);
    }
    Ok(Self {
      entries: HashMap::new(),
      num_slots,
      next_seq: 0,
    })
  }

  /// Number of slots per key.
  pub fn num_slots(&self) -> usize {
    self.num_slots
  }

  /// Adds one to `key` in `slot`. Slots outside the ring wrap around.
  pub fn increment(&mut self, key: K, slot: usize) {
    let slot = slot % self.num_slots;
    let num_slots = self.num_slots;
    let next_seq = &mut self.next_seq;
    let entry = self.entries.entry(key).or_insert_with(|| {
      let first_seen = *next_seq;
      *next_seq += 1;
      SlotEntry {
        slots: vec![0; num_slots],
        first_seen,
      }
    });
    entry.slots[slot] += 1;
  }

  /// Count of `key` in one slot.
  pub fn slot_count(&self, key: &K, slot: usize) -> u64 {
    self
      .entries
      .get(key)
      .map_or(0, |e| e.slots[slot % self.num_slots])
  }

  /// Count of `key` summed over all slots.
  pub fn total(&self, key: &K) -> u64 {
    self.entries.get(key).map_or(0, SlotEntry::total)
  }

  /// Sums every key over all slots. Keys with a zero total are omitted.
  pub fn totals(&self) -> WindowSnapshot<K> {
    let entries = self
      .entries
      .iter()
      .filter_map(|(k, e)| {
        let total = e.total();
        (total > 0).then(|| (k.clone(), total, e.first_seen))
      })
      .collect();
    WindowSnapshot { entries }
  }

  /// Zeroes `slot` for every key and drops keys whose total becomes zero.
  pub fn reset_slot(&mut self, slot: usize) {
    let slot = slot % self.num_slots;
    self.entries.retain(|_, e| {
      e.slots[slot] = 0;
      e.total() > 0
    });
  }

  /// Number of keys currently held.
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// Whether no key is held.
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// Sliding window of `L` slots over a [`SlotCounter`].
#[derive(Debug, Clone)]
pub struct WindowedCounter<K> {
  counter: SlotCounter<K>,
  head: usize,
  tail: usize,
  length: usize,
}

impl<K: Hash + Eq + Clone> WindowedCounter<K> {
  /// Creates a window of `length` slots. `length` must be at least 2.
  pub fn new(length: usize) -> Result<Self, WindowError> {
    if length < 2 {
      return Err(WindowError::InvalidLength(length));
    }
    Ok(Self {
      counter: SlotCounter::new(length)?,
      head: 0,
      tail: 1,
      length,
    })
  }

  /// Number of slots in the window.
  pub fn window_length(&self) -> usize {
    self.length
  }

  /// Adds one to `key` in the head slot.
  pub fn increment(&mut self, key: K) {
    self.counter.increment(key, self.head);
  }

  /// Returns the window totals, then evicts the tail slot and rotates.
  pub fn snapshot(&mut self) -> WindowSnapshot<K> {
    let totals = self.counter.totals();
    self.counter.reset_slot(self.tail);
    self.head = self.tail;
    self.tail = (self.tail + 1) % self.length;
    totals
  }

  /// Number of keys with a non-zero count in the window.
  pub fn len(&self) -> usize {
    self.counter.len()
  }

  /// Whether the window holds no counts.
  pub fn is_empty(&self) -> bool {
    self.counter.is_empty()
  }
}

/// A ranked entry of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranked<K> {
  /// 1-based rank.
  pub rank: usize,
  /// The counted key.
  pub key: K,
  /// Total count in the window.
  pub count: u64,
}

/// Window totals at one point in time.
#[derive(Debug, Clone)]
pub struct WindowSnapshot<K> {
  entries: Vec<(K, u64, u64)>,
}

impl<K: Hash + Eq + Clone> WindowSnapshot<K> {
  /// Total for `key`, if it has a non-zero count.
  pub fn get(&self, key: &K) -> Option<u64> {
    self
      .entries
      .iter()
      .find(|(k, _, _)| k == key)
      .map(|(_, count, _)| *count)
  }

  /// Whether `key` has a non-zero count.
  pub fn contains(&self, key: &K) -> bool {
    self.get(key).is_some()
  }

  /// Number of keys in the snapshot.
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// Whether the snapshot is empty.
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Snapshot as a key to count map.
  pub fn into_map(self) -> HashMap<K, u64> {
    self
      .entries
      .into_iter()
      .map(|(k, count, _)| (k, count))
      .collect()
  }

  /// The `n` highest counts, ties broken by the order keys were first counted.
  pub fn top_n(&self, n: usize) -> Vec<Ranked<K>> {
    let mut sorted: Vec<&(K, u64, u64)> = self.entries.iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    sorted
      .into_iter()
      .take(n)
      .enumerate()
      .map(|(i, (key, count, _))| Ranked {
        rank: i + 1,
        key: key.clone(),
        count: *count,
      })
      .collect()
  }
}
