//! # Durable Sinks
//!
//! Two kinds of storage sit at the end of the pipeline:
//!
//! - a column-family table written in row batches through
//!   [`BatchWriter<Row>`](crate::batch::BatchWriter), for the archive and
//!   topic streams;
//! - a blob store written one object per message, for the raw payloads.
//!
//! [`MemoryTable`] and [`MemoryBlobStore`] are in-process implementations used
//! for local runs and tests.

use crate::batch::BatchWriter;
use crate::error::{SinkError, StageError};
use crate::payload::{Payload, json_text, parse_timestamp};
use crate::records::{ArchiveRecord, Geography, TopicRecord};
use crate::row_key::row_key;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// One column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
  /// `family:qualifier` column name.
  pub column: String,
  /// Cell value as text.
  pub value: String,
}

/// One table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
  /// Row key.
  pub key: String,
  /// Cells in insertion order.
  pub cells: Vec<Cell>,
}

impl Row {
  /// Creates an empty row.
  pub fn new(key: impl Into<String>) -> Self {
    Self {
      key: key.into(),
      cells: Vec::new(),
    }
  }

  /// Adds a cell.
  pub fn push(&mut self, column: &str, value: impl Into<String>) {
    self.cells.push(Cell {
      column: column.to_string(),
      value: value.into(),
    });
  }

  /// Adds a cell when the value is present.
  pub fn push_opt(&mut self, column: &str, value: Option<String>) {
    if let Some(value) = value {
      self.push(column, value);
    }
  }

  /// Value of the first cell in `column`.
  pub fn get(&self, column: &str) -> Option<&str> {
    self
      .cells
      .iter()
      .find(|c| c.column == column)
      .map(|c| c.value.as_str())
  }
}

/// Adds the location cells of `family` when coordinates are present.
fn push_location(row: &mut Row, family: &str, geography: &Geography) {
  let Some(coordinates) = geography.coordinates.as_deref().filter(|c| !c.is_empty()) else {
    return;
  };
  let place = &geography.place;
  row.push(&format!("{family}:coordinates"), coordinates);
  row.push_opt(&format!("{family}:admin_district1"), place.admin_district.clone());
  row.push_opt(&format!("{family}:admin_district2"), place.admin_district2.clone());
  row.push_opt(&format!("{family}:country_region"), place.country_region.clone());
  row.push_opt(&format!("{family}:locality"), place.locality.clone());
  row.push_opt(&format!("{family}:postalcode"), place.postal_code.clone());
}

/// Builds the archive-table row for a classified message.
///
/// Rows are keyed by the author's screen name, newest first.
pub fn archive_row(record: &ArchiveRecord) -> Result<Row, StageError> {
  let created = parse_timestamp(&record.created_date)?;
  let payload = Payload::parse(&record.payload)?;
  let creator = payload
    .creator
    .clone()
    .ok_or_else(|| StageError::MalformedPayload("missing Creator".to_string()))?;
  let screen_name = creator
    .screen_name
    .clone()
    .ok_or_else(|| StageError::MalformedPayload("missing Creator.ScreenName".to_string()))?;

  let mut row = Row::new(row_key(&screen_name, created, record.id));
  push_location(&mut row, "loc", &record.geography);

  row.push_opt("user:profile_id", creator.id.as_ref().and_then(json_text));
  row.push("user:screenname", screen_name.clone());
  row.push_opt(
    "user:profile_created_dt",
    creator.created_at.as_ref().and_then(json_text),
  );
  row.push_opt(
    "user:followers_count",
    creator.followers_count.as_ref().and_then(json_text),
  );
  row.push_opt(
    "user:friends_count",
    creator.friends_count.as_ref().and_then(json_text),
  );
  row.push_opt(
    "user:statuses_count",
    creator.statuses_count.as_ref().and_then(json_text),
  );

  row.push("tweet:id", record.id.to_string());
  row.push("tweet:created_dt", created.to_rfc3339());
  row.push("tweet:text", payload.text()?);
  row.push_opt("tweet:is_retweet", payload.is_retweet.as_ref().and_then(json_text));
  row.push_opt("tweet:retweeted", payload.retweeted.as_ref().and_then(json_text));
  row.push_opt(
    "tweet:retweet_count",
    payload.retweet_count.as_ref().and_then(json_text),
  );
  row.push_opt("tweet:source", payload.source.as_ref().and_then(json_text));
  row.push("tweet:sentiment", record.sentiment.clone());
  row.push("tweet:swear_word_count", record.swear_word_count.to_string());

  for (i, tag) in payload.hashtags().into_iter().enumerate() {
    row.push(&format!("ht:tag{}", i + 1), tag);
  }
  Ok(row)
}

/// Builds the topic-table row for one extracted topic.
///
/// Rows are keyed by the topic, newest first.
pub fn topic_row(record: &TopicRecord) -> Result<Row, StageError> {
  let created = parse_timestamp(&record.created_date)?;
  let mut row = Row::new(row_key(&record.topic, created, record.id));
  push_location(&mut row, "tp", &record.geography);
  row.push("tp:created_dt", created.to_rfc3339());
  row.push("tp:sentiment", record.sentiment.clone());
  row.push("tp:vulgar_tweet", record.vulgar.to_string());
  Ok(row)
}

/// Path of the blob holding a raw payload.
pub fn blob_path(created: DateTime<Utc>, id: i64) -> String {
  format!(
    "Year={}/Month={}/Day={}/{}.json",
    created.year(),
    created.month(),
    created.day(),
    id
  )
}

/// Object storage for raw payloads.
#[async_trait]
pub trait BlobStore: Send + Sync {
  /// Stores `body` at `path`, replacing any existing object.
  async fn put(&self, path: &str, body: Vec<u8>) -> Result<(), SinkError>;
}

/// In-process table.
#[derive(Debug, Default)]
pub struct MemoryTable {
  rows: Mutex<Vec<Row>>,
  writes: AtomicUsize,
  failing: AtomicBool,
}

impl MemoryTable {
  /// Creates an empty table.
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, Vec<Row>> {
    self.rows.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Makes every following write fail (or succeed again).
  pub fn set_failing(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  /// Number of batch writes attempted.
  pub fn write_count(&self) -> usize {
    self.writes.load(Ordering::SeqCst)
  }

  /// Every row written so far.
  pub fn rows(&self) -> Vec<Row> {
    self.lock().clone()
  }
}

#[async_trait]
impl BatchWriter<Row> for MemoryTable {
  async fn write_batch(&self, records: &[Row]) -> Result<(), SinkError> {
    self.writes.fetch_add(1, Ordering::SeqCst);
    if self.failing.load(Ordering::SeqCst) {
      return Err(SinkError::Write("table unavailable".to_string()));
    }
    self.lock().extend_from_slice(records);
    Ok(())
  }
}

/// In-process blob store.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
  blobs: Mutex<BTreeMap<String, Vec<u8>>>,
  failing: AtomicBool,
}

impl MemoryBlobStore {
  /// Creates an empty store.
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
    self.blobs.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Makes every following put fail (or succeed again).
  pub fn set_failing(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  /// Body stored at `path`.
  pub fn get(&self, path: &str) -> Option<Vec<u8>> {
    self.lock().get(path).cloned()
  }

  /// Every stored path, sorted.
  pub fn paths(&self) -> Vec<String> {
    self.lock().keys().cloned().collect()
  }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
  async fn put(&self, path: &str, body: Vec<u8>) -> Result<(), SinkError> {
    if self.failing.load(Ordering::SeqCst) {
      return Err(SinkError::Write(format!("cannot store {}", path)));
    }
    self.lock().insert(path.to_string(), body);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::records::Place;
  use chrono::TimeZone;

  const PAYLOAD: &str = r#"{
    "Id": 7,
    "Text": "hello #storm",
    "CreatedAt": "2015-03-04T10:00:00Z",
    "Hashtags": ["storm", "rust"],
    "RetweetCount": 2,
    "Creator": { "Id": 11, "ScreenName": "alice", "FollowersCount": 5 }
  }"#;

  fn geography(coordinates: Option<&str>) -> Geography {
    Geography {
      coordinates: coordinates.map(str::to_string),
      place: Place {
        locality: Some("X".to_string()),
        ..Place::default()
      },
    }
  }

  #[test]
  fn test_archive_row_columns() {
    let row = archive_row(&ArchiveRecord {
      id: 7,
      created_date: "2015-03-04T10:00:00Z".to_string(),
      payload: PAYLOAD.to_string(),
      geography: geography(Some("1,2")),
      sentiment: "Positive".to_string(),
      swear_word_count: 0,
    })
    .unwrap();

    assert!(row.key.starts_with("alice_"));
    assert!(row.key.ends_with('7'));
    assert_eq!(row.get("loc:coordinates"), Some("1,2"));
    assert_eq!(row.get("loc:locality"), Some("X"));
    assert_eq!(row.get("loc:admin_district1"), None);
    assert_eq!(row.get("user:followers_count"), Some("5"));
    assert_eq!(row.get("tweet:text"), Some("hello #storm"));
    assert_eq!(row.get("tweet:retweet_count"), Some("2"));
    assert_eq!(row.get("ht:tag1"), Some("storm"));
    assert_eq!(row.get("ht:tag2"), Some("rust"));
  }

  #[test]
  fn test_archive_row_requires_creator() {
    let err = archive_row(&ArchiveRecord {
      id: 7,
      created_date: "2015-03-04T10:00:00Z".to_string(),
      payload: r#"{ "Text": "x" }"#.to_string(),
      geography: Geography::default(),
      sentiment: "Unknown".to_string(),
      swear_word_count: 0,
    })
    .unwrap_err();
    assert!(matches!(err, StageError::MalformedPayload(_)));
  }

  #[test]
  fn test_topic_row_skips_location_without_coordinates() {
    let row = topic_row(&TopicRecord {
      id: 3,
      created_date: "2015-03-04T10:00:00Z".to_string(),
      topic: "storm".to_string(),
      geography: geography(None),
      sentiment: "Neutral".to_string(),
      vulgar: false,
    })
    .unwrap();
    assert!(row.key.starts_with("storm_"));
    assert_eq!(row.get("tp:locality"), None);
    assert_eq!(row.get("tp:vulgar_tweet"), Some("false"));
  }

  #[test]
  fn test_blob_path_layout() {
    let ts = Utc.with_ymd_and_hms(2015, 3, 4, 10, 0, 0).unwrap();
    assert_eq!(blob_path(ts, 42), "Year=2015/Month=3/Day=4/42.json");
  }

  #[tokio::test]
  async fn test_memory_table_failure_toggle() {
    let table = MemoryTable::new();
    table.set_failing(true);
    assert!(table.write_batch(&[Row::new("k")]).await.is_err());
    table.set_failing(false);
    table.write_batch(&[Row::new("k")]).await.unwrap();
    assert_eq!(table.rows().len(), 1);
    assert_eq!(table.write_count(), 2);
  }
}
