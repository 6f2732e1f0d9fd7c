//! # Merge Stage
//!
//! Joins the `sentiment` and `geography` records of each message id into one
//! `joined` record. Inputs are held until both sides have arrived; the joined
//! record is emitted anchored to every contributing root, and only then are
//! the held anchors acked.
//!
//! Incomplete records are bounded by a [`JoinPolicy`]. A record evicted for
//! age (checked on every tick) or capacity (checked on insert) has its
//! anchors failed, so the source redelivers the message and both sides are
//! produced again. When the inputs end, whatever is still incomplete is
//! failed the same way.
//!
//! Both sides of an id must reach the same instance; run several instances
//! behind a [`KeyRouterNode`](crate::nodes::key_router_node::KeyRouterNode).

use crate::error::StageError;
use crate::join::{Evicted, JoinBuffer, JoinPolicy, Side};
use crate::message::{Anchor, Message, streams};
use crate::metrics;
use crate::records::{
  Geography, GeographyRecord, JoinedRecord, SentimentRecord, StreamRecord, record_id,
};
use crate::stage::{Emission, Stage, StageOutput};
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, warn};

/// Payload and label carried by the sentiment side.
type Labelled = (String, String);

/// Joins sentiment and geography by message id.
pub struct MergeStage {
  name: String,
  buffer: JoinBuffer<i64, Labelled, Geography, Anchor>,
}

impl MergeStage {
  /// Creates a merge stage bounded by `policy`.
  pub fn new(name: impl Into<String>, policy: JoinPolicy) -> Self {
    Self {
      name: name.into(),
      buffer: JoinBuffer::new(policy),
    }
  }

  /// Number of ids waiting for their other side.
  pub fn pending(&self) -> usize {
    self.buffer.len()
  }

  fn side(message: &Message) -> Result<(i64, Side<Labelled, Geography>), StageError> {
    match message.stream() {
      streams::SENTIMENT => {
        let record = SentimentRecord::from_message(message)?;
        Ok((record.id, Side::A((record.payload, record.label))))
      }
      streams::GEOGRAPHY => {
        let record = GeographyRecord::from_message(message)?;
        Ok((record.id, Side::B(record.geography)))
      }
      other => Err(StageError::UnexpectedStream(other.to_string())),
    }
  }

  fn release_evicted(&self, mut output: StageOutput, evicted: Vec<Evicted<i64, Anchor>>) -> StageOutput {
    for record in evicted {
      warn!(
        stage = %self.name,
        id = record.key,
        reason = ?record.reason,
        "incomplete join evicted"
      );
      output = output.release_fail(record.lineages);
    }
    output
  }
}

#[async_trait]
impl Stage for MergeStage {
  fn output_streams(&self) -> Vec<String> {
    vec![streams::JOINED.to_string()]
  }

  async fn process(&mut self, message: &Message) -> StageOutput {
    let (id, side) = match Self::side(message) {
      Ok(parsed) => parsed,
      Err(e) => {
        // Whatever was buffered for this id can no longer complete.
        let evicted = record_id(message)
          .and_then(|id| self.buffer.fail_key(&id))
          .into_iter()
          .collect();
        return self.release_evicted(StageOutput::failed(e.to_string()), evicted);
      }
    };

    let step = self
      .buffer
      .contribute(id, side, message.anchors().iter().copied(), Instant::now());
    let mut output = self.release_evicted(StageOutput::held(), step.evicted);

    if let Some(joined) = step.joined {
      debug!(stage = %self.name, id, "joined");
      let (payload, label) = joined.a;
      let record = JoinedRecord {
        id: joined.key,
        payload,
        geography: joined.b,
        label,
      };
      output = output
        .emit(Emission::record(record, joined.lineages.clone()))
        .release_ack(joined.lineages);
    }

    metrics::record_join_pending(&self.name, self.buffer.len());
    output
  }

  async fn on_tick(&mut self) -> StageOutput {
    let expired = self.buffer.evict_expired(Instant::now());
    metrics::record_join_pending(&self.name, self.buffer.len());
    self.release_evicted(StageOutput::success(), expired)
  }

  async fn finish(&mut self) -> StageOutput {
    let remaining = self.buffer.drain();
    metrics::record_join_pending(&self.name, 0);
    self.release_evicted(StageOutput::success(), remaining)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::message::{EdgeId, Lineage, Value};
  use crate::records::Place;
  use crate::stage::{Release, Verdict};
  use std::time::Duration;

  fn anchor(root: u64) -> Anchor {
    Anchor::new(Lineage(root), EdgeId(root * 10))
  }

  fn sentiment(id: i64, root: u64) -> Message {
    SentimentRecord {
      id,
      payload: "hello #storm".to_string(),
      label: "positive".to_string(),
    }
    .into_anchored(vec![anchor(root)])
  }

  fn geography(id: i64, root: u64) -> Message {
    GeographyRecord {
      id,
      geography: Geography {
        coordinates: Some("1,2".to_string()),
        place: Place {
          locality: Some("X".to_string()),
          ..Place::default()
        },
      },
    }
    .into_anchored(vec![anchor(root)])
  }

  #[tokio::test]
  async fn test_first_side_is_held() {
    let mut stage = MergeStage::new("merge", JoinPolicy::default());
    let output = stage.process(&sentiment(1, 1)).await;
    assert_eq!(output.verdict, Verdict::Held);
    assert!(output.emissions.is_empty());
    assert!(output.releases.is_empty());
    assert_eq!(stage.pending(), 1);
  }

  #[tokio::test]
  async fn test_second_side_emits_joined_and_acks_both() {
    let mut stage = MergeStage::new("merge", JoinPolicy::default());
    stage.process(&geography(1, 1)).await;
    let output = stage.process(&sentiment(1, 2)).await;

    assert_eq!(output.emissions.len(), 1);
    let joined = JoinedRecord::from_fields(&output.emissions[0].fields).unwrap();
    assert_eq!(joined.id, 1);
    assert_eq!(joined.payload, "hello #storm");
    assert_eq!(joined.label, "positive");
    assert_eq!(joined.geography.coordinates.as_deref(), Some("1,2"));
    assert_eq!(joined.geography.place.locality.as_deref(), Some("X"));
    assert_eq!(joined.geography.place.postal_code, None);

    assert_eq!(output.emissions[0].parents, vec![anchor(1), anchor(2)]);
    assert_eq!(output.releases, vec![Release::Ack(vec![anchor(1), anchor(2)])]);
    assert_eq!(stage.pending(), 0);
  }

  #[tokio::test]
  async fn test_keys_do_not_interfere() {
    let mut stage = MergeStage::new("merge", JoinPolicy::default());
    stage.process(&sentiment(1, 1)).await;
    stage.process(&sentiment(2, 2)).await;
    let output = stage.process(&geography(2, 3)).await;

    assert_eq!(output.releases, vec![Release::Ack(vec![anchor(2), anchor(3)])]);
    assert_eq!(stage.pending(), 1);
  }

  #[tokio::test]
  async fn test_malformed_side_fails_only_its_key() {
    let mut stage = MergeStage::new("merge", JoinPolicy::default());
    stage.process(&sentiment(1, 1)).await;
    stage.process(&sentiment(2, 2)).await;

    let broken = Message::anchored(streams::GEOGRAPHY, vec![Value::Int(1)], vec![anchor(3)]);
    let output = stage.process(&broken).await;

    assert!(matches!(output.verdict, Verdict::Failed(_)));
    assert_eq!(output.releases, vec![Release::Fail(vec![anchor(1)])]);
    assert_eq!(stage.pending(), 1);
  }

  #[tokio::test]
  async fn test_capacity_eviction_fails_oldest() {
    let policy = JoinPolicy {
      ttl: None,
      capacity: Some(1),
    };
    let mut stage = MergeStage::new("merge", policy);
    stage.process(&sentiment(1, 1)).await;
    let output = stage.process(&sentiment(2, 2)).await;

    assert_eq!(output.verdict, Verdict::Held);
    assert_eq!(output.releases, vec![Release::Fail(vec![anchor(1)])]);
    assert_eq!(stage.pending(), 1);
  }

  #[tokio::test]
  async fn test_tick_expires_old_records() {
    let policy = JoinPolicy {
      ttl: Some(Duration::from_millis(1)),
      capacity: None,
    };
    let mut stage = MergeStage::new("merge", policy);
    stage.process(&sentiment(1, 1)).await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    let output = stage.on_tick().await;
    assert_eq!(output.releases, vec![Release::Fail(vec![anchor(1)])]);
    assert_eq!(stage.pending(), 0);
  }

  #[tokio::test]
  async fn test_finish_fails_incomplete() {
    let mut stage = MergeStage::new("merge", JoinPolicy::default());
    stage.process(&geography(5, 1)).await;
    let output = stage.finish().await;
    assert_eq!(output.releases, vec![Release::Fail(vec![anchor(1)])]);
  }
}
