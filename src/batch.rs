//! # Batching Sink
//!
//! [`BatchSink`] accumulates records with the anchors of the messages they
//! came from and hands them to a [`BatchWriter`] in one call. A flush drains
//! the whole queue under the lock and writes outside it, so records enqueued
//! during a write go into the next batch.
//!
//! A batch is settled as a unit: a successful write returns every anchor for
//! acking, a failed write returns every anchor for failing. A failed write may
//! have been partially applied by the writer; redelivery then produces
//! duplicates, never losses.

use crate::error::SinkError;
use crate::message::Anchor;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Writes a batch of records to durable storage.
#[async_trait]
pub trait BatchWriter<R>: Send + Sync {
  /// Writes every record. An error means the batch must be retried as a whole.
  async fn write_batch(&self, records: &[R]) -> Result<(), SinkError>;
}

/// What a flush did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
  /// The queue was empty; the writer was not called.
  Empty,
  /// The batch was written. The anchors should be acked.
  Written {
    /// Number of records written.
    records: usize,
    /// Anchors of every written record.
    anchors: Vec<Anchor>,
  },
  /// The write failed. The anchors should be failed.
  Failed {
    /// Number of records in the failed batch.
    records: usize,
    /// Anchors of every record in the batch.
    anchors: Vec<Anchor>,
    /// The writer's error.
    error: SinkError,
  },
}

struct Queued<R> {
  record: R,
  anchors: Vec<Anchor>,
}

/// A queue of records flushed on a size threshold or on demand.
pub struct BatchSink<R> {
  name: String,
  queue: Mutex<Vec<Queued<R>>>,
  writer: Arc<dyn BatchWriter<R>>,
}

impl<R: Send + Sync> BatchSink<R> {
  /// Creates an empty sink writing through `writer`.
  pub fn new(name: impl Into<String>, writer: Arc<dyn BatchWriter<R>>) -> Self {
    Self {
      name: name.into(),
      queue: Mutex::new(Vec::new()),
      writer,
    }
  }

  /// Sink name used in logs and metrics.
  pub fn name(&self) -> &str {
    &self.name
  }

  fn queue(&self) -> MutexGuard<'_, Vec<Queued<R>>> {
    self.queue.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Appends a record and the anchors of the message it came from.
  pub fn enqueue(&self, record: R, anchors: Vec<Anchor>) {
    self.queue().push(Queued { record, anchors });
  }

  /// Number of queued records.
  pub fn len(&self) -> usize {
    self.queue().len()
  }

  /// Whether nothing is queued.
  pub fn is_empty(&self) -> bool {
    self.queue().is_empty()
  }

  /// Flushes only when more than `threshold` records are queued.
  pub async fn maybe_flush(&self, threshold: usize) -> Option<FlushOutcome> {
    if self.len() > threshold {
      Some(self.flush().await)
    } else {
      None
    }
  }

  /// Flushes whatever is queued. An empty queue is a no-op.
  pub async fn flush_on_timer(&self) -> FlushOutcome {
    self.flush().await
  }

  /// Drains the queue and writes it as one batch.
  pub async fn flush(&self) -> FlushOutcome {
    let drained = std::mem::take(&mut *self.queue());
    if drained.is_empty() {
      return FlushOutcome::Empty;
    }

    let count = drained.len();
    let mut records = Vec::with_capacity(count);
    let mut anchors = Vec::new();
    for queued in drained {
      records.push(queued.record);
      anchors.extend(queued.anchors);
    }

    match self.writer.write_batch(&records).await {
      Ok(()) => {
        debug!(sink = %self.name, records = count, "batch written");
        crate::metrics::record_batch_flush(&self.name, count, true);
        FlushOutcome::Written {
          records: count,
          anchors,
        }
      }
      Err(error) => {
        warn!(sink = %self.name, records = count, %error, "batch write failed");
        crate::metrics::record_batch_flush(&self.name, count, false);
        FlushOutcome::Failed {
          records: count,
          anchors,
          error,
        }
      }
    }
  }
}
