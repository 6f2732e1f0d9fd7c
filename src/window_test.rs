//! Tests for slot and windowed counters.

use crate::error::WindowError;
use crate::window::{SlotCounter, WindowedCounter};
use proptest::prelude::*;

fn key(s: &str) -> String {
  s.to_string()
}

#[test]
fn test_window_shorter_than_two_rejected() {
  assert_eq!(
    WindowedCounter::<String>::new(1).unwrap_err(),
    WindowError::InvalidLength(1)
  );
  assert_eq!(
    WindowedCounter::<String>::new(0).unwrap_err(),
    WindowError::InvalidLength(0)
  );
  assert!(WindowedCounter::<String>::new(2).is_ok());
}

#[test]
fn test_slot_counter_rejects_zero_slots() {
  assert_eq!(
    SlotCounter::<String>::new(0).unwrap_err(),
    WindowError::NoSlots
  );
}

#[test]
fn test_slot_counter_reset_drops_zero_keys() {
  let mut counter = SlotCounter::new(3).unwrap();
  counter.increment(key("a"), 0);
  counter.increment(key("b"), 0);
  counter.increment(key("b"), 1);
  counter.reset_slot(0);
  assert_eq!(counter.total(&key("a")), 0);
  assert_eq!(counter.total(&key("b")), 1);
  assert_eq!(counter.len(), 1);
  assert_eq!(counter.slot_count(&key("b"), 1), 1);
}

#[test]
fn test_eviction_after_window_length_snapshots() {
  let mut window = WindowedCounter::new(3).unwrap();
  window.increment(key("k"));

  // The snapshot closing the slot's last period still reports it.
  for n in 1..=3 {
    let snapshot = window.snapshot();
    assert_eq!(snapshot.get(&key("k")), Some(1), "snapshot {n}");
  }
  assert!(!window.snapshot().contains(&key("k")));
  assert!(window.is_empty());
}

#[test]
fn test_snapshot_sums_across_slots() {
  let mut window = WindowedCounter::new(4).unwrap();
  for _ in 0..3 {
    window.increment(key("k"));
  }
  window.snapshot();
  for _ in 0..5 {
    window.increment(key("k"));
  }
  assert_eq!(window.snapshot().get(&key("k")), Some(8));
}

#[test]
fn test_top_n_ties_keep_first_seen_order() {
  let mut window = WindowedCounter::new(2).unwrap();
  window.increment(key("late"));
  window.increment(key("early"));
  window.increment(key("big"));
  window.increment(key("big"));
  let ranked = window.snapshot().top_n(10);
  let keys: Vec<_> = ranked.iter().map(|r| r.key.as_str()).collect();
  assert_eq!(keys, vec!["big", "late", "early"]);
  assert_eq!(ranked[0].rank, 1);
  assert_eq!(ranked[0].count, 2);
  assert_eq!(ranked[2].rank, 3);
}

#[test]
fn test_top_n_truncates() {
  let mut window = WindowedCounter::new(2).unwrap();
  for k in ["a", "b", "c"] {
    window.increment(key(k));
  }
  assert_eq!(window.snapshot().top_n(2).len(), 2);
}

proptest! {
  #[test]
  fn prop_snapshot_totals_match_increments(
    length in 2usize..8,
    rounds in proptest::collection::vec(proptest::collection::vec(0u8..4, 0..20), 1..6),
  ) {
    let mut window = WindowedCounter::new(length).unwrap();
    let mut history: Vec<Vec<u8>> = Vec::new();
    for round in rounds {
      for k in &round {
        window.increment(*k);
      }
      history.push(round);
      let snapshot = window.snapshot().into_map();
      let start = history.len().saturating_sub(length);
      for k in 0u8..4 {
        let expected: u64 = history[start..]
          .iter()
          .map(|r| r.iter().filter(|x| **x == k).count() as u64)
          .sum();
        prop_assert_eq!(snapshot.get(&k).copied().unwrap_or(0), expected);
      }
    }
  }
}
