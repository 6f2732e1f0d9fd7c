//! # Classify Stage
//!
//! Reads `joined` records, classifies the message text and emits one
//! `archive` record for the message followed by one `topic` record per topic. Every
//! output is anchored to the joined input.

use crate::classify::Classifier;
use crate::error::StageError;
use crate::message::{Message, streams};
use crate::payload::Payload;
use crate::records::{ArchiveRecord, JoinedRecord, StreamRecord, TopicRecord};
use crate::stage::{Emission, Stage, StageOutput};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

/// Splits joined messages into archive and topic records.
pub struct ClassifyStage {
  classifier: Arc<Classifier>,
}

impl ClassifyStage {
  /// Creates a stage using `classifier`.
  pub fn new(classifier: Arc<Classifier>) -> Self {
    Self { classifier }
  }

  fn classify(&self, message: &Message) -> Result<StageOutput, StageError> {
    let joined = JoinedRecord::from_message(message)?;
    let payload = Payload::parse(&joined.payload)?;
    let created_date = payload.created_at_raw()?.to_string();
    let classification = self.classifier.classify(payload.text()?);
    trace!(
      id = joined.id,
      topics = classification.topics.len(),
      swear_words = classification.swear_word_count,
      "classified"
    );

    let parents = message.anchors().to_vec();
    let vulgar = classification.is_vulgar();
    let archive = ArchiveRecord {
      id: joined.id,
      created_date: created_date.clone(),
      payload: joined.payload,
      geography: joined.geography.clone(),
      sentiment: joined.label.clone(),
      swear_word_count: classification.swear_word_count as i64,
    };
    let mut output = StageOutput::success().emit(Emission::record(archive, parents.clone()));

    for topic in classification.topics {
      let record = TopicRecord {
        id: joined.id,
        created_date: created_date.clone(),
        topic,
        geography: joined.geography.clone(),
        sentiment: joined.label.clone(),
        vulgar,
      };
      output = output.emit(Emission::record(record, parents.clone()));
    }
    Ok(output)
  }
}

#[async_trait]
impl Stage for ClassifyStage {
  fn output_streams(&self) -> Vec<String> {
    vec![streams::ARCHIVE.to_string(), streams::TOPIC.to_string()]
  }

  async fn process(&mut self, message: &Message) -> StageOutput {
    self
      .classify(message)
      .unwrap_or_else(|e| StageOutput::failed(e.to_string()))
  }
}
