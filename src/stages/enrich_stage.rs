//! # Enrichment Stages
//!
//! [`SentimentStage`] and [`GeographyStage`] read inbound records and emit
//! one enriched record each. A lookup that errors or times out does not fail
//! the message: the record is emitted with an `Unknown` label or empty
//! geography and the input is acked as degraded. Only an input that is not
//! an inbound record fails.

use crate::enrich::{GeographyPort, SentimentPort, UNKNOWN_LABEL};
use crate::error::EnrichError;
use crate::message::{Message, streams};
use crate::records::{Geography, GeographyRecord, InboundRecord, SentimentRecord, StreamRecord};
use crate::stage::{Emission, Stage, StageOutput};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

async fn bounded<T, F>(timeout: Option<Duration>, lookup: F) -> Result<T, EnrichError>
where
  F: Future<Output = Result<T, EnrichError>>,
{
  match timeout {
    Some(limit) => tokio::time::timeout(limit, lookup)
      .await
      .map_err(|_| EnrichError::Timeout)?,
    None => lookup.await,
  }
}

/// Labels each inbound message with its sentiment.
pub struct SentimentStage {
  port: Arc<dyn SentimentPort>,
  timeout: Option<Duration>,
}

impl SentimentStage {
  /// Creates a stage looking labels up through `port`.
  pub fn new(port: Arc<dyn SentimentPort>) -> Self {
    Self { port, timeout: None }
  }

  /// Bounds each lookup; a slower lookup degrades to `Unknown`.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }
}

#[async_trait]
impl Stage for SentimentStage {
  fn output_streams(&self) -> Vec<String> {
    vec![streams::SENTIMENT.to_string()]
  }

  async fn process(&mut self, message: &Message) -> StageOutput {
    let inbound = match InboundRecord::from_message(message) {
      Ok(inbound) => inbound,
      Err(e) => return StageOutput::failed(e.to_string()),
    };

    let (label, output) = match bounded(self.timeout, self.port.lookup(&inbound.payload)).await {
      Ok(label) => (label, StageOutput::success()),
      Err(e) => {
        debug!(id = inbound.id, error = %e, "sentiment lookup failed");
        (UNKNOWN_LABEL.to_string(), StageOutput::degraded(e.to_string()))
      }
    };

    let record = SentimentRecord {
      id: inbound.id,
      payload: inbound.payload,
      label,
    };
    output.emit(Emission::record(record, message.anchors().to_vec()))
  }
}

/// Resolves the geography of each inbound message.
pub struct GeographyStage {
  port: Arc<dyn GeographyPort>,
  timeout: Option<Duration>,
}

impl GeographyStage {
  /// Creates a stage resolving geography through `port`.
  pub fn new(port: Arc<dyn GeographyPort>) -> Self {
    Self { port, timeout: None }
  }

  /// Bounds each lookup; a slower lookup degrades to empty geography.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }
}

#[async_trait]
impl Stage for GeographyStage {
  fn output_streams(&self) -> Vec<String> {
    vec![streams::GEOGRAPHY.to_string()]
  }

  async fn process(&mut self, message: &Message) -> StageOutput {
    let inbound = match InboundRecord::from_message(message) {
      Ok(inbound) => inbound,
      Err(e) => return StageOutput::failed(e.to_string()),
    };

    let (geography, output) = match bounded(self.timeout, self.port.lookup(&inbound.payload)).await {
      Ok(geography) => (geography, StageOutput::success()),
      Err(e) => {
        debug!(id = inbound.id, error = %e, "geography lookup failed");
        (Geography::default(), StageOutput::degraded(e.to_string()))
      }
    };

    let record = GeographyRecord {
      id: inbound.id,
      geography,
    };
    output.emit(Emission::record(record, message.anchors().to_vec()))
  }
}
