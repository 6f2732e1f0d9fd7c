//! # Blob Writer Stage
//!
//! Stores each inbound payload verbatim under a date-partitioned path
//! (`Year=Y/Month=M/Day=D/<id>.json`) derived from its creation timestamp.
//! A failed put fails the input so the message is redelivered.

use crate::error::StageError;
use crate::message::Message;
use crate::payload::Payload;
use crate::records::{InboundRecord, StreamRecord};
use crate::sink::{BlobStore, blob_path};
use crate::stage::{Stage, StageOutput};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Archives raw payloads to a [`BlobStore`].
pub struct BlobWriterStage {
  store: Arc<dyn BlobStore>,
}

impl BlobWriterStage {
  /// Creates a stage writing to `store`.
  pub fn new(store: Arc<dyn BlobStore>) -> Self {
    Self { store }
  }

  fn locate(message: &Message) -> Result<(String, InboundRecord), StageError> {
    let inbound = InboundRecord::from_message(message)?;
    let created = Payload::parse(&inbound.payload)?.created_at()?;
    Ok((blob_path(created, inbound.id), inbound))
  }
}

#[async_trait]
impl Stage for BlobWriterStage {
  fn output_streams(&self) -> Vec<String> {
    Vec::new()
  }

  async fn process(&mut self, message: &Message) -> StageOutput {
    let (path, inbound) = match Self::locate(message) {
      Ok(located) => located,
      Err(e) => return StageOutput::failed(e.to_string()),
    };
    match self.store.put(&path, inbound.payload.into_bytes()).await {
      Ok(()) => {
        debug!(id = inbound.id, %path, "payload stored");
        StageOutput::success()
      }
      Err(e) => StageOutput::failed(e.to_string()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sink::MemoryBlobStore;
  use crate::stage::Verdict;

  const PAYLOAD: &str = r#"{"Id":12,"Text":"hi","CreatedAt":"Wed Mar 04 10:00:00 +0000 2015"}"#;

  fn inbound() -> Message {
    InboundRecord {
      id: 12,
      payload: PAYLOAD.to_string(),
    }
    .into_message()
  }

  #[tokio::test]
  async fn test_stores_under_date_path() {
    let store = Arc::new(MemoryBlobStore::new());
    let mut stage = BlobWriterStage::new(store.clone());

    assert_eq!(stage.process(&inbound()).await.verdict, Verdict::Success);
    assert_eq!(store.paths(), vec!["Year=2015/Month=3/Day=4/12.json"]);
    assert_eq!(
      store.get("Year=2015/Month=3/Day=4/12.json"),
      Some(PAYLOAD.as_bytes().to_vec())
    );
  }

  #[tokio::test]
  async fn test_store_failure_fails_input() {
    let store = Arc::new(MemoryBlobStore::new());
    store.set_failing(true);
    let mut stage = BlobWriterStage::new(store.clone());
    assert!(matches!(stage.process(&inbound()).await.verdict, Verdict::Failed(_)));
  }

  #[tokio::test]
  async fn test_missing_timestamp_fails() {
    let store = Arc::new(MemoryBlobStore::new());
    let mut stage = BlobWriterStage::new(store.clone());
    let message = InboundRecord {
      id: 1,
      payload: "{}".to_string(),
    }
    .into_message();
    assert!(matches!(stage.process(&message).await.verdict, Verdict::Failed(_)));
    assert!(store.paths().is_empty());
  }
}
