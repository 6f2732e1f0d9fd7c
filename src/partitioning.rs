//! # Key Partitioning
//!
//! Stateful stages that run as N parallel instances must see every message of
//! a key on the same instance. A [`PartitionKey`] is extracted from each
//! message and [`shard_for_key`] maps it to an instance index; the
//! [`KeyRouterNode`](crate::nodes::key_router_node::KeyRouterNode) applies the
//! mapping inside a graph.
//!
//! ```rust
//! use stormweave::partitioning::{PartitionKey, shard_for_key};
//!
//! let key = PartitionKey::from("42");
//! assert_eq!(shard_for_key(&key, 4), shard_for_key(&key, 4));
//! assert!(shard_for_key(&key, 4) < 4);
//! ```

use crate::message::{Message, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Partition key that determines which instance handles a message.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PartitionKey(pub String);

impl PartitionKey {
  /// Creates a new partition key from a string.
  pub fn new(s: String) -> Self {
    Self(s)
  }

  /// Returns the key as a string slice.
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<String> for PartitionKey {
  fn from(s: String) -> Self {
    Self(s)
  }
}

impl From<&str> for PartitionKey {
  fn from(s: &str) -> Self {
    Self(s.to_string())
  }
}

/// Extracts the partition key from a message.
pub trait PartitionKeyExtractor: Send + Sync {
  /// Returns the key, or `None` when the message carries none.
  fn extract_key(&self, message: &Message) -> Option<PartitionKey>;
}

/// Keys messages by the value of one field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldKey(pub usize);

impl PartitionKeyExtractor for FieldKey {
  fn extract_key(&self, message: &Message) -> Option<PartitionKey> {
    match message.field(self.0)? {
      Value::Null => None,
      value => Some(PartitionKey(value.to_string())),
    }
  }
}

/// Maps a key to one of `shards` instances. `shards` of zero maps to 0.
pub fn shard_for_key(key: &PartitionKey, shards: usize) -> usize {
  if shards <= 1 {
    return 0;
  }
  let mut hasher = DefaultHasher::new();
  key.hash(&mut hasher);
  (hasher.finish() % shards as u64) as usize
}
