//! Tests for the keyed join buffer.

use crate::join::{EvictionReason, JoinBuffer, JoinPolicy, Side};
use std::time::{Duration, Instant};

type Buffer = JoinBuffer<i64, &'static str, &'static str, u32>;

#[test]
fn test_complete_after_both_sides_exactly_once() {
  let mut buffer = Buffer::unbounded();
  let now = Instant::now();

  let step = buffer.contribute(1, Side::A("positive"), [10], now);
  assert!(step.joined.is_none());
  assert!(buffer.contains(&1));

  let step = buffer.contribute(1, Side::B("1,2"), [20], now);
  let joined = step.joined.unwrap();
  assert_eq!(joined.key, 1);
  assert_eq!(joined.a, "positive");
  assert_eq!(joined.b, "1,2");
  assert_eq!(joined.lineages, vec![10, 20]);
  assert!(buffer.is_empty());
}

#[test]
fn test_arrival_order_does_not_matter() {
  let mut buffer = Buffer::unbounded();
  let now = Instant::now();
  assert!(buffer.contribute(7, Side::B("geo"), [2], now).joined.is_none());
  let joined = buffer.contribute(7, Side::A("label"), [1], now).joined.unwrap();
  assert_eq!(joined.lineages, vec![2, 1]);
}

#[test]
fn test_duplicate_side_overwrites_and_keeps_lineage() {
  let mut buffer = Buffer::unbounded();
  let now = Instant::now();
  buffer.contribute(1, Side::A("old"), [1], now);
  buffer.contribute(1, Side::A("new"), [2], now);
  assert_eq!(buffer.len(), 1);
  let joined = buffer.contribute(1, Side::B("geo"), [3], now).joined.unwrap();
  assert_eq!(joined.a, "new");
  assert_eq!(joined.lineages, vec![1, 2, 3]);
}

#[test]
fn test_late_duplicate_starts_new_record() {
  let mut buffer = Buffer::unbounded();
  let now = Instant::now();
  buffer.contribute(1, Side::A("a"), [1], now);
  buffer.contribute(1, Side::B("b"), [2], now);
  let step = buffer.contribute(1, Side::B("b"), [3], now);
  assert!(step.joined.is_none());
  assert_eq!(buffer.len(), 1);
}

#[test]
fn test_keys_are_independent() {
  let mut buffer = Buffer::unbounded();
  let now = Instant::now();
  buffer.contribute(1, Side::A("a1"), [1], now);
  buffer.contribute(2, Side::B("b2"), [2], now);
  assert_eq!(buffer.len(), 2);
  let joined = buffer.contribute(2, Side::A("a2"), [3], now).joined.unwrap();
  assert_eq!(joined.key, 2);
  assert!(buffer.contains(&1));
}

#[test]
fn test_fail_key_only_touches_that_key() {
  let mut buffer = Buffer::unbounded();
  let now = Instant::now();
  buffer.contribute(1, Side::A("a1"), [1], now);
  buffer.contribute(2, Side::A("a2"), [2], now);
  let evicted = buffer.fail_key(&1).unwrap();
  assert_eq!(evicted.lineages, vec![1]);
  assert_eq!(evicted.reason, EvictionReason::Failed);
  assert!(!buffer.contains(&1));
  assert!(buffer.contains(&2));
  assert!(buffer.fail_key(&1).is_none());
}

#[test]
fn test_ttl_eviction() {
  let mut buffer = Buffer::new(JoinPolicy {
    ttl: Some(Duration::from_secs(10)),
    capacity: None,
  });
  let start = Instant::now();
  buffer.contribute(1, Side::A("a"), [1], start);
  buffer.contribute(2, Side::A("a"), [2], start + Duration::from_secs(5));

  assert!(buffer.evict_expired(start + Duration::from_secs(9)).is_empty());
  let evicted = buffer.evict_expired(start + Duration::from_secs(12));
  assert_eq!(evicted.len(), 1);
  assert_eq!(evicted[0].key, 1);
  assert_eq!(evicted[0].reason, EvictionReason::Expired);
  assert!(buffer.contains(&2));
}

#[test]
fn test_no_ttl_never_expires() {
  let mut buffer = Buffer::unbounded();
  let start = Instant::now();
  buffer.contribute(1, Side::A("a"), [1], start);
  assert!(buffer.evict_expired(start + Duration::from_secs(86_400)).is_empty());
}

#[test]
fn test_capacity_evicts_oldest() {
  let mut buffer = Buffer::new(JoinPolicy {
    ttl: None,
    capacity: Some(2),
  });
  let now = Instant::now();
  buffer.contribute(1, Side::A("a"), [1], now);
  buffer.contribute(2, Side::A("a"), [2], now);
  // Touching an existing key does not evict.
  assert!(buffer.contribute(1, Side::A("again"), [3], now).evicted.is_empty());

  let step = buffer.contribute(3, Side::B("b"), [4], now);
  assert_eq!(step.evicted.len(), 1);
  assert_eq!(step.evicted[0].key, 1);
  assert_eq!(step.evicted[0].lineages, vec![1, 3]);
  assert_eq!(step.evicted[0].reason, EvictionReason::Capacity);
  assert_eq!(buffer.len(), 2);
}

#[test]
fn test_drain_returns_everything_oldest_first() {
  let mut buffer = Buffer::unbounded();
  let now = Instant::now();
  buffer.contribute(5, Side::A("a"), [1], now);
  buffer.contribute(3, Side::B("b"), [2], now);
  let keys: Vec<i64> = buffer.drain().into_iter().map(|e| e.key).collect();
  assert_eq!(keys, vec![5, 3]);
  assert!(buffer.is_empty());
}
