//! # Message Envelope
//!
//! Every item flowing between nodes is a [`Message`]: the name of the stream it
//! was emitted on, an ordered list of field [`Value`]s and the [`Anchor`]s that
//! tie it to the source deliveries it descends from.
//!
//! ## Lineage
//!
//! A source delivery is identified by a [`Lineage`] root. Each message derived
//! from it carries one [`Anchor`] per root it descends from; a joined message
//! therefore carries anchors for both of its input halves. Anchors are created
//! and retired by the [`AckTracker`](crate::ack::AckTracker).
//!
//! ## Streams
//!
//! Stream names are plain strings. The names used by the pipeline live in
//! [`streams`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Names of the streams used by the pipeline.
pub mod streams {
  /// Raw deliveries from the source.
  pub const DEFAULT: &str = "default";
  /// Sentiment-enriched records.
  pub const SENTIMENT: &str = "sentiment";
  /// Geography-enriched records.
  pub const GEOGRAPHY: &str = "geography";
  /// Joined records.
  pub const JOINED: &str = "joined";
  /// Fully classified records bound for the archive table.
  pub const ARCHIVE: &str = "archive";
  /// One record per extracted topic.
  pub const TOPIC: &str = "topic";
  /// Ranked trending entries.
  pub const TRENDING: &str = "trending";
  /// Control tick driving windows, batches and join eviction.
  pub const TICK: &str = "__tick";
}

/// Root identifier of one source delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Lineage(pub u64);

impl fmt::Display for Lineage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "lineage:{}", self.0)
  }
}

/// Identifier of one tracked edge within a lineage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub u64);

/// A handle tying a message to a source delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Anchor {
  /// The delivery this anchor descends from.
  pub root: Lineage,
  /// The tracked edge this anchor settles.
  pub edge: EdgeId,
}

impl Anchor {
  /// Creates an anchor for the given root and edge.
  pub fn new(root: Lineage, edge: EdgeId) -> Self {
    Self { root, edge }
  }
}

/// A single field value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum Value {
  /// Absent value.
  #[default]
  Null,
  /// Signed integer.
  Int(i64),
  /// Text.
  Str(String),
  /// Boolean flag.
  Bool(bool),
}

impl Value {
  /// Returns the integer, if this is an [`Value::Int`].
  pub fn as_i64(&self) -> Option<i64> {
    match self {
      Value::Int(v) => Some(*v),
      _ => None,
    }
  }

  /// Returns the text, if this is a [`Value::Str`].
  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::Str(v) => Some(v),
      _ => None,
    }
  }

  /// Returns the flag, if this is a [`Value::Bool`].
  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Value::Bool(v) => Some(*v),
      _ => None,
    }
  }

  /// Whether this is [`Value::Null`].
  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Null => Ok(()),
      Value::Int(v) => write!(f, "{}", v),
      Value::Str(v) => f.write_str(v),
      Value::Bool(v) => write!(f, "{}", v),
    }
  }
}

impl From<i64> for Value {
  fn from(v: i64) -> Self {
    Value::Int(v)
  }
}

impl From<bool> for Value {
  fn from(v: bool) -> Self {
    Value::Bool(v)
  }
}

impl From<String> for Value {
  fn from(v: String) -> Self {
    Value::Str(v)
  }
}

impl From<&str> for Value {
  fn from(v: &str) -> Self {
    Value::Str(v.to_string())
  }
}

impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(v: Option<T>) -> Self {
    v.map_or(Value::Null, Into::into)
  }
}

/// Ordered field values of a message.
pub type Fields = Vec<Value>;

/// A message flowing between nodes.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
  stream: String,
  fields: Fields,
  anchors: Vec<Anchor>,
}

impl Message {
  /// Creates an unanchored message on a stream.
  pub fn new(stream: impl Into<String>, fields: Fields) -> Self {
    Self {
      stream: stream.into(),
      fields,
      anchors: Vec::new(),
    }
  }

  /// Creates a message carrying the given anchors.
  pub fn anchored(stream: impl Into<String>, fields: Fields, anchors: Vec<Anchor>) -> Self {
    Self {
      stream: stream.into(),
      fields,
      anchors,
    }
  }

  /// Creates a control tick.
  pub fn tick() -> Self {
    Self::new(streams::TICK, Vec::new())
  }

  /// Whether this message is a control tick.
  pub fn is_tick(&self) -> bool {
    self.stream == streams::TICK
  }

  /// Stream the message was emitted on.
  pub fn stream(&self) -> &str {
    &self.stream
  }

  /// All field values, in order.
  pub fn fields(&self) -> &[Value] {
    &self.fields
  }

  /// Field at the given position.
  pub fn field(&self, index: usize) -> Option<&Value> {
    self.fields.get(index)
  }

  /// Anchors tying this message to its source deliveries.
  pub fn anchors(&self) -> &[Anchor] {
    &self.anchors
  }

  /// Replaces the anchors, keeping stream and fields.
  pub fn with_anchors(mut self, anchors: Vec<Anchor>) -> Self {
    self.anchors = anchors;
    self
  }

  /// Splits the message into stream, fields and anchors.
  pub fn into_parts(self) -> (String, Fields, Vec<Anchor>) {
    (self.stream, self.fields, self.anchors)
  }
}

/// Generator of unique lineage roots.
///
/// Adapted from the classic sequence generator: a relaxed atomic counter is
/// enough because roots only need to be unique, not ordered across threads.
#[derive(Debug)]
pub struct LineageGenerator {
  counter: AtomicU64,
}

impl LineageGenerator {
  /// Creates a generator starting at 1.
  pub fn new() -> Self {
    Self::starting_at(1)
  }

  /// Creates a generator starting at the given value.
  pub fn starting_at(start: u64) -> Self {
    Self {
      counter: AtomicU64::new(start),
    }
  }

  /// Returns the next unused root.
  pub fn next_root(&self) -> Lineage {
    Lineage(self.counter.fetch_add(1, Ordering::Relaxed))
  }
}

impl Default for LineageGenerator {
  fn default() -> Self {
    Self::new()
  }
}
