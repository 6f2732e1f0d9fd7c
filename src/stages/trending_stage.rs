//! # Trending Stage
//!
//! Counts topics over a sliding window. Each `topic` record adds one to its
//! topic and is acked at once. On every tick the window is snapshotted and
//! the top entries are emitted on `trending`, rank first, ties in the order
//! the topics were first counted. Rankings are aggregates and carry no
//! lineage.

use crate::error::WindowError;
use crate::message::{Message, streams};
use crate::records::{StreamRecord, TopicRecord, TrendingRecord};
use crate::stage::{Emission, Stage, StageOutput};
use crate::window::WindowedCounter;
use async_trait::async_trait;
use tracing::info;

/// Windowed topic counter emitting a ranking per tick.
pub struct TrendingStage {
  counter: WindowedCounter<String>,
  top_n: usize,
}

impl TrendingStage {
  /// Creates a stage over `window_slots` ticks, ranking `top_n` topics.
  ///
  /// # Errors
  ///
  /// Fails when `window_slots` is below 2.
  pub fn new(window_slots: usize, top_n: usize) -> Result<Self, WindowError> {
    Ok(Self {
      counter: WindowedCounter::new(window_slots)?,
      top_n,
    })
  }
}

#[async_trait]
impl Stage for TrendingStage {
  fn output_streams(&self) -> Vec<String> {
    vec![streams::TRENDING.to_string()]
  }

  async fn process(&mut self, message: &Message) -> StageOutput {
    match TopicRecord::from_message(message) {
      Ok(record) => {
        self.counter.increment(record.topic);
        StageOutput::success()
      }
      Err(e) => StageOutput::failed(e.to_string()),
    }
  }

  async fn on_tick(&mut self) -> StageOutput {
    let snapshot = self.counter.snapshot();
    let ranking = snapshot.top_n(self.top_n);
    info!(keys = snapshot.len(), ranked = ranking.len(), "trending snapshot");

    ranking
      .into_iter()
      .fold(StageOutput::success(), |output, entry| {
        let record = TrendingRecord {
          rank: entry.rank as i64,
          key: entry.key,
          count: entry.count as i64,
        };
        output.emit(Emission::record(record, Vec::new()))
      })
  }
}
