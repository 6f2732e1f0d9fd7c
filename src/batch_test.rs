//! Tests for the batching sink.

use crate::batch::{BatchSink, BatchWriter, FlushOutcome};
use crate::error::SinkError;
use crate::message::{Anchor, EdgeId, Lineage};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingWriter {
  calls: AtomicUsize,
  batches: Mutex<Vec<Vec<u32>>>,
  fail: AtomicBool,
}

#[async_trait]
impl BatchWriter<u32> for RecordingWriter {
  async fn write_batch(&self, records: &[u32]) -> Result<(), SinkError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if self.fail.load(Ordering::SeqCst) {
      return Err(SinkError::Write("region unavailable".to_string()));
    }
    self.batches.lock().unwrap().push(records.to_vec());
    Ok(())
  }
}

fn anchor(n: u64) -> Vec<Anchor> {
  vec![Anchor::new(Lineage(n), EdgeId(n))]
}

fn sink_with(writer: &Arc<RecordingWriter>) -> BatchSink<u32> {
  BatchSink::new("test", Arc::clone(writer) as Arc<dyn BatchWriter<u32>>)
}

#[tokio::test]
async fn test_threshold_is_strictly_greater() {
  let writer = Arc::new(RecordingWriter::default());
  let sink = sink_with(&writer);
  for i in 0..500 {
    sink.enqueue(i, anchor(i as u64));
  }
  assert!(sink.maybe_flush(500).await.is_none());
  assert_eq!(writer.calls.load(Ordering::SeqCst), 0);

  sink.enqueue(500, anchor(500));
  match sink.maybe_flush(500).await {
    Some(FlushOutcome::Written { records, anchors }) => {
      assert_eq!(records, 501);
      assert_eq!(anchors.len(), 501);
    }
    other => panic!("expected a written batch, got {:?}", other),
  }
  assert_eq!(writer.calls.load(Ordering::SeqCst), 1);
  assert_eq!(writer.batches.lock().unwrap()[0].len(), 501);
  assert!(sink.is_empty());
}

#[tokio::test]
async fn test_timer_flush_on_empty_queue_is_noop() {
  let writer = Arc::new(RecordingWriter::default());
  let sink = sink_with(&writer);
  assert_eq!(sink.flush_on_timer().await, FlushOutcome::Empty);
  assert_eq!(writer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_timer_flush_writes_small_batch() {
  let writer = Arc::new(RecordingWriter::default());
  let sink = sink_with(&writer);
  sink.enqueue(1, anchor(1));
  sink.enqueue(2, anchor(2));
  let outcome = sink.flush_on_timer().await;
  assert_eq!(
    outcome,
    FlushOutcome::Written {
      records: 2,
      anchors: [anchor(1), anchor(2)].concat(),
    }
  );
  assert_eq!(*writer.batches.lock().unwrap(), vec![vec![1, 2]]);
}

#[tokio::test]
async fn test_failed_write_returns_every_anchor() {
  let writer = Arc::new(RecordingWriter::default());
  writer.fail.store(true, Ordering::SeqCst);
  let sink = sink_with(&writer);
  for i in 0..3 {
    sink.enqueue(i, anchor(i as u64));
  }
  match sink.flush_on_timer().await {
    FlushOutcome::Failed {
      records, anchors, ..
    } => {
      assert_eq!(records, 3);
      assert_eq!(anchors, [anchor(0), anchor(1), anchor(2)].concat());
    }
    other => panic!("expected a failed batch, got {:?}", other),
  }
  // The failed batch is not retried from the queue; redelivery refills it.
  assert!(sink.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_enqueue_and_flush_keep_every_record_once() {
  const PRODUCERS: u32 = 4;
  const PER_PRODUCER: u32 = 250;

  let writer = Arc::new(RecordingWriter::default());
  let sink = Arc::new(sink_with(&writer));
  let done = Arc::new(AtomicBool::new(false));

  let flusher = {
    let sink = Arc::clone(&sink);
    let done = Arc::clone(&done);
    tokio::spawn(async move {
      let mut flushed = Vec::new();
      let mut flushes = 0;
      while !done.load(Ordering::SeqCst) {
        match sink.flush_on_timer().await {
          FlushOutcome::Written { anchors, .. } => flushed.extend(anchors),
          FlushOutcome::Empty => {}
          FlushOutcome::Failed { error, .. } => panic!("unexpected write failure: {}", error),
        }
        flushes += 1;
        tokio::task::yield_now().await;
      }
      (flushed, flushes)
    })
  };

  let producers: Vec<_> = (0..PRODUCERS)
    .map(|p| {
      let sink = Arc::clone(&sink);
      tokio::spawn(async move {
        for i in 0..PER_PRODUCER {
          let id = p * PER_PRODUCER + i;
          sink.enqueue(id, anchor(id as u64));
          if i % 10 == 0 {
            tokio::task::yield_now().await;
          }
        }
      })
    })
    .collect();
  for producer in producers {
    producer.await.unwrap();
  }
  done.store(true, Ordering::SeqCst);
  let (mut anchors, flushes) = flusher.await.unwrap();
  assert!(flushes > 0);

  if let FlushOutcome::Written { anchors: rest, .. } = sink.flush().await {
    anchors.extend(rest);
  }
  assert!(sink.is_empty());

  // Batches in write order, flattened, line up with the anchors returned.
  let written: Vec<u32> = writer.batches.lock().unwrap().concat();
  let expected_anchors: Vec<Anchor> = written.iter().flat_map(|&id| anchor(id as u64)).collect();
  assert_eq!(anchors, expected_anchors);

  let mut sorted = written;
  sorted.sort_unstable();
  assert_eq!(sorted, (0..PRODUCERS * PER_PRODUCER).collect::<Vec<_>>());
}
