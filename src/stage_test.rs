//! Tests for the stage adapter and a small enrich-and-merge graph.

use crate::ack::{AckTracker, Settlement, SettlementReceiver};
use crate::edge::Edge;
use crate::enrich::UNKNOWN_LABEL;
use crate::error::EnrichError;
use crate::graph::Graph;
use crate::join::JoinPolicy;
use crate::message::{Lineage, Message, Value};
use crate::node::{InputStream, Node};
use crate::nodes::collector_node::CollectorNode;
use crate::nodes::common::receiver_stream;
use crate::nodes::source_node::{SourceNode, SourceSettings};
use crate::records::{Geography, InboundRecord, JoinedRecord, Place, StreamRecord};
use crate::source::MemoryQueue;
use crate::stage::{ERROR_PORT, Emission, IN_PORT, Stage, StageNode, StageOutput, TICK_PORT};
use crate::stages::enrich_stage::{GeographyStage, SentimentStage};
use crate::stages::merge_stage::MergeStage;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Answers each input with the outcome scripted for its first field.
struct Scripted {
  ticks: usize,
}

#[async_trait::async_trait]
impl Stage for Scripted {
  fn output_streams(&self) -> Vec<String> {
    vec!["out".to_string()]
  }

  async fn process(&mut self, message: &Message) -> StageOutput {
    let child = Emission {
      stream: "out".to_string(),
      fields: message.fields().to_vec(),
      parents: message.anchors().to_vec(),
    };
    match message.field(0).and_then(Value::as_str) {
      Some("ok") => StageOutput::success().emit(child),
      Some("degraded") => StageOutput::degraded("fallback").emit(child),
      Some("held") => StageOutput::held(),
      _ => StageOutput::failed("bad input"),
    }
  }

  async fn on_tick(&mut self) -> StageOutput {
    self.ticks += 1;
    StageOutput::success().emit(Emission {
      stream: "out".to_string(),
      fields: vec![Value::Int(self.ticks as i64)],
      parents: Vec::new(),
    })
  }

  async fn finish(&mut self) -> StageOutput {
    StageOutput::success().emit(Emission {
      stream: "out".to_string(),
      fields: vec![Value::from("finished")],
      parents: Vec::new(),
    })
  }
}

struct Harness {
  tracker: Arc<AckTracker>,
  settlements: SettlementReceiver,
  input: mpsc::Sender<Message>,
  ticks: mpsc::Sender<Message>,
  out: InputStream,
  errors: InputStream,
}

async fn harness() -> Harness {
  let (tracker, settlements) = AckTracker::new(true);
  let node = StageNode::new("scripted", Scripted { ticks: 0 }, tracker.clone());
  let (input, input_rx) = mpsc::channel(8);
  let (ticks, ticks_rx) = mpsc::channel(8);
  let mut inputs = HashMap::new();
  inputs.insert(IN_PORT.to_string(), receiver_stream(input_rx));
  inputs.insert(TICK_PORT.to_string(), receiver_stream(ticks_rx));

  let mut outputs = node.execute(inputs).await.unwrap();
  Harness {
    tracker,
    settlements,
    input,
    ticks,
    out: outputs.remove("out").unwrap(),
    errors: outputs.remove(ERROR_PORT).unwrap(),
  }
}

impl Harness {
  async fn send(&self, root: u64, tag: &str) {
    let anchors = self.tracker.track(Lineage(root));
    let message = Message::anchored("default", vec![Value::from(tag)], anchors);
    self.input.send(message).await.unwrap();
  }
}

async fn next(stream: &mut InputStream) -> Message {
  tokio::time::timeout(Duration::from_secs(1), stream.next())
    .await
    .expect("message in time")
    .expect("stream open")
}

async fn next_settlement(rx: &mut SettlementReceiver) -> Settlement {
  tokio::time::timeout(Duration::from_secs(1), rx.recv())
    .await
    .expect("settlement in time")
    .expect("tracker alive")
}

#[tokio::test]
async fn test_child_is_anchored_before_input_is_acked() {
  let mut h = harness().await;
  h.send(1, "ok").await;

  let child = next(&mut h.out).await;
  assert_eq!(child.anchors().len(), 1);
  assert_eq!(child.anchors()[0].root, Lineage(1));
  assert!(h.tracker.is_pending(Lineage(1)));
  assert!(h.settlements.try_recv().is_err());

  h.tracker.ack_all(child.anchors());
  assert_eq!(next_settlement(&mut h.settlements).await, Settlement::Ack(Lineage(1)));
}

#[tokio::test]
async fn test_degraded_input_is_acked() {
  let mut h = harness().await;
  h.send(2, "degraded").await;

  let child = next(&mut h.out).await;
  h.tracker.ack_all(child.anchors());
  assert_eq!(next_settlement(&mut h.settlements).await, Settlement::Ack(Lineage(2)));
}

#[tokio::test]
async fn test_failed_input_is_failed_and_reported() {
  let mut h = harness().await;
  h.send(3, "boom").await;

  assert_eq!(next_settlement(&mut h.settlements).await, Settlement::Fail(Lineage(3)));
  let report = next(&mut h.errors).await;
  assert_eq!(report.field(0).and_then(Value::as_str), Some("scripted"));
  assert_eq!(report.field(1).and_then(Value::as_str), Some("default"));
  assert_eq!(report.field(2).and_then(Value::as_str), Some("bad input"));
}

#[tokio::test]
async fn test_held_input_stays_pending() {
  let mut h = harness().await;
  h.send(4, "held").await;
  h.send(5, "ok").await;

  // The second input is processed, so the first has been handled by now.
  let child = next(&mut h.out).await;
  assert_eq!(child.anchors()[0].root, Lineage(5));
  assert!(h.tracker.is_pending(Lineage(4)));
}

#[tokio::test]
async fn test_tick_and_finish() {
  let mut h = harness().await;
  h.ticks.send(Message::tick()).await.unwrap();
  let tick = next(&mut h.out).await;
  assert_eq!(tick.field(0), Some(&Value::Int(1)));
  assert!(tick.anchors().is_empty());

  drop(h.input);
  let last = next(&mut h.out).await;
  assert_eq!(last.field(0).and_then(Value::as_str), Some("finished"));
  assert!(h.out.next().await.is_none());
}

#[tokio::test]
async fn test_second_execute_is_rejected() {
  let tracker = AckTracker::disabled();
  let node = StageNode::new("scripted", Scripted { ticks: 0 }, tracker);
  let (_tx, rx) = mpsc::channel(1);
  let mut inputs = HashMap::new();
  inputs.insert(IN_PORT.to_string(), receiver_stream(rx));
  assert!(node.execute(inputs).await.is_ok());
  assert!(node.execute(HashMap::new()).await.is_err());
}

#[tokio::test]
async fn test_enrich_and_merge_graph_acks_each_delivery_once() {
  let queue = Arc::new(MemoryQueue::new());
  queue.publish(InboundRecord {
    id: 1,
    payload: r#"{"Id":1,"Text":"hello #storm","Language":"en"}"#.to_string(),
  });
  queue.close();

  let (tracker, settlements) = AckTracker::new(true);
  let settings = SourceSettings {
    receive_timeout: Duration::from_millis(20),
    idle_backoff: Duration::from_millis(5),
    pending_backoff: Duration::from_millis(5),
    ..SourceSettings::default()
  };
  let source = SourceNode::new(
    "source",
    queue.clone(),
    tracker.clone(),
    settlements,
    settings,
    CancellationToken::new(),
  );
  let sentiment = |_: &str| -> Result<String, EnrichError> { Ok("positive".to_string()) };
  let geography = |_: &str| -> Result<Geography, EnrichError> {
    Ok(Geography {
      coordinates: Some("1,2".to_string()),
      place: Place {
        locality: Some("X".to_string()),
        ..Place::default()
      },
    })
  };
  let (collector, mut joined) = CollectorNode::channel("collect", 8, tracker.clone());

  let mut graph = Graph::new("mini", tracker.clone());
  graph.add_node("source".to_string(), Box::new(source)).unwrap();
  graph
    .add_node(
      "sentiment".to_string(),
      Box::new(StageNode::new("sentiment", SentimentStage::new(Arc::new(sentiment)), tracker.clone())),
    )
    .unwrap();
  graph
    .add_node(
      "geography".to_string(),
      Box::new(StageNode::new("geography", GeographyStage::new(Arc::new(geography)), tracker.clone())),
    )
    .unwrap();
  graph
    .add_node(
      "merge".to_string(),
      Box::new(StageNode::new("merge", MergeStage::new("merge", JoinPolicy::default()), tracker.clone())),
    )
    .unwrap();
  graph.add_node("collect".to_string(), Box::new(collector)).unwrap();
  for edge in [
    Edge::new("source", "out", "sentiment", "in"),
    Edge::new("source", "out", "geography", "in"),
    Edge::new("sentiment", "sentiment", "merge", "in"),
    Edge::new("geography", "geography", "merge", "in"),
    Edge::new("merge", "joined", "collect", "in"),
  ] {
    graph.add_edge(edge).unwrap();
  }

  graph.execute().await.unwrap();

  let message = tokio::time::timeout(Duration::from_secs(2), joined.recv())
    .await
    .unwrap()
    .unwrap();
  let record = JoinedRecord::from_message(&message).unwrap();
  assert_eq!(record.id, 1);
  assert_eq!(record.payload, r#"{"Id":1,"Text":"hello #storm","Language":"en"}"#);
  assert_eq!(record.label, "positive");
  assert_ne!(record.label, UNKNOWN_LABEL);
  assert_eq!(record.geography.coordinates.as_deref(), Some("1,2"));
  assert_eq!(record.geography.place.locality.as_deref(), Some("X"));
  assert_eq!(record.geography.place.country_region, None);

  tokio::time::timeout(Duration::from_secs(2), graph.wait_for_completion())
    .await
    .unwrap()
    .unwrap();
  assert!(joined.recv().await.is_none());
  assert_eq!(tracker.pending_roots(), 0);
  assert_eq!(queue.locked_len(), 0);
  assert_eq!(queue.ready_len(), 0);
  assert_eq!(queue.redelivery_count(), 0);
}
