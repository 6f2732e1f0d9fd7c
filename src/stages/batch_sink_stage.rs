//! # Batch Sink Stage
//!
//! Converts each input into a sink record and queues it in a [`BatchSink`]
//! together with the input's anchors. The input is held: its anchors are
//! settled with the batch it is written in. A batch is flushed when more than
//! `threshold` records are queued, on every tick, and once more when the
//! inputs end.
//!
//! Conversion happens at enqueue time, so a malformed input fails on its own
//! and never takes a batch down with it.

use crate::batch::{BatchSink, BatchWriter, FlushOutcome};
use crate::error::StageError;
use crate::message::Message;
use crate::records::{ArchiveRecord, StreamRecord, TopicRecord};
use crate::sink::{Row, archive_row, topic_row};
use crate::stage::{Stage, StageOutput};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Turns an input message into a sink record.
pub type Converter<R> = Box<dyn Fn(&Message) -> Result<R, StageError> + Send>;

/// A stage writing its inputs in batches.
pub struct BatchSinkStage<R> {
  sink: BatchSink<R>,
  convert: Converter<R>,
  threshold: usize,
}

impl<R: Send + Sync + 'static> BatchSinkStage<R> {
  /// Creates a stage flushing `sink` above `threshold` queued records.
  pub fn new(sink: BatchSink<R>, threshold: usize, convert: Converter<R>) -> Self {
    Self {
      sink,
      convert,
      threshold,
    }
  }

  fn settle(outcome: FlushOutcome) -> StageOutput {
    match outcome {
      FlushOutcome::Empty => StageOutput::held(),
      FlushOutcome::Written { anchors, .. } => StageOutput::held().release_ack(anchors),
      FlushOutcome::Failed { anchors, .. } => StageOutput::held().release_fail(anchors),
    }
  }
}

impl BatchSinkStage<Row> {
  /// Writes `archive` records as archive-table rows.
  pub fn archive(name: &str, writer: Arc<dyn BatchWriter<Row>>, threshold: usize) -> Self {
    Self::new(
      BatchSink::new(name, writer),
      threshold,
      Box::new(|message: &Message| archive_row(&ArchiveRecord::from_message(message)?)),
    )
  }

  /// Writes `topic` records as topic-table rows.
  pub fn topics(name: &str, writer: Arc<dyn BatchWriter<Row>>, threshold: usize) -> Self {
    Self::new(
      BatchSink::new(name, writer),
      threshold,
      Box::new(|message: &Message| topic_row(&TopicRecord::from_message(message)?)),
    )
  }
}

#[async_trait]
impl<R: Send + Sync + 'static> Stage for BatchSinkStage<R> {
  fn output_streams(&self) -> Vec<String> {
    Vec::new()
  }

  async fn process(&mut self, message: &Message) -> StageOutput {
    let record = match (self.convert)(message) {
      Ok(record) => record,
      Err(e) => return StageOutput::failed(e.to_string()),
    };
    self.sink.enqueue(record, message.anchors().to_vec());
    match self.sink.maybe_flush(self.threshold).await {
      Some(outcome) => Self::settle(outcome),
      None => StageOutput::held(),
    }
  }

  async fn on_tick(&mut self) -> StageOutput {
    Self::settle(self.sink.flush_on_timer().await)
  }

  async fn finish(&mut self) -> StageOutput {
    info!(sink = %self.sink.name(), queued = self.sink.len(), "final flush");
    Self::settle(self.sink.flush().await)
  }
}
