//! # Source Node
//!
//! Pulls deliveries from a [`SourceAdapter`] and emits them as
//! [`InboundRecord`] messages, each on a fresh lineage root. Settlements from
//! the [`AckTracker`] come back to this node, which acks or fails the
//! delivery with the adapter.
//!
//! ## Ports
//!
//! - **Output**: `"out"` - One message per accepted delivery
//!
//! ## Flow control
//!
//! Once more than `max_pending` deliveries are in flight the node
//! stops receiving and only waits for settlements, checking again every
//! `pending_backoff`. An empty receive idles for `idle_backoff`, as does a
//! transport error.
//!
//! The node ends when the adapter reports [`SourceError::Closed`] and nothing
//! is in flight, or when its cancellation token fires.

use crate::ack::{AckTracker, Settlement, SettlementReceiver};
use crate::config::PipelineConfig;
use crate::error::SourceError;
use crate::message::{Lineage, LineageGenerator, Message};
use crate::metrics;
use crate::node::{InputStreams, Node, NodeExecutionError, OutputStreams};
use crate::nodes::common::{BaseNode, delegate_base_node, receiver_stream};
use crate::payload::Payload;
use crate::records::{InboundRecord, StreamRecord};
use crate::source::{Delivery, DeliveryTag, SourceAdapter};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Polling and admission settings of a [`SourceNode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
  /// Ceiling on deliveries emitted but not yet settled.
  pub max_pending: usize,
  /// How long one receive call may wait.
  pub receive_timeout: Duration,
  /// Pause after an empty receive or a transport error.
  pub idle_backoff: Duration,
  /// Pause between checks while at the in-flight ceiling.
  pub pending_backoff: Duration,
  /// Accept only payloads whose language is English.
  pub english_only: bool,
}

impl Default for SourceSettings {
  fn default() -> Self {
    Self::from(&PipelineConfig::default())
  }
}

impl From<&PipelineConfig> for SourceSettings {
  fn from(config: &PipelineConfig) -> Self {
    Self {
      max_pending: config.max_pending,
      receive_timeout: config.receive_timeout(),
      idle_backoff: config.idle_backoff(),
      pending_backoff: config.pending_backoff(),
      english_only: config.english_only,
    }
  }
}

/// A node that feeds a pipeline from a queue.
pub struct SourceNode {
  base: BaseNode,
  adapter: Arc<dyn SourceAdapter>,
  tracker: Arc<AckTracker>,
  settlements: Mutex<Option<SettlementReceiver>>,
  settings: SourceSettings,
  cancel: CancellationToken,
  channel_capacity: usize,
}

impl SourceNode {
  /// Creates a source node.
  ///
  /// `settlements` must be the receiver returned alongside `tracker`.
  pub fn new(
    name: impl Into<String>,
    adapter: Arc<dyn SourceAdapter>,
    tracker: Arc<AckTracker>,
    settlements: SettlementReceiver,
    settings: SourceSettings,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      base: BaseNode::new(name.into(), Vec::new(), vec!["out".to_string()]),
      adapter,
      tracker,
      settlements: Mutex::new(Some(settlements)),
      settings,
      cancel,
      channel_capacity: 64,
    }
  }

  /// Sets the capacity of the output channel.
  pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
    self.channel_capacity = capacity.max(1);
    self
  }
}

#[async_trait]
impl Node for SourceNode {
  delegate_base_node!();

  fn execute(
    &self,
    _inputs: InputStreams,
  ) -> Pin<Box<dyn Future<Output = Result<OutputStreams, NodeExecutionError>> + Send + '_>> {
    Box::pin(async move {
      let settlements = self
        .settlements
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take()
        .ok_or_else(|| format!("Source '{}' is already running", self.name()))?;

      let (out_tx, out_rx) = mpsc::channel(self.channel_capacity);
      let mut poller = Poller {
        name: self.name().to_string(),
        adapter: Arc::clone(&self.adapter),
        tracker: Arc::clone(&self.tracker),
        settlements,
        settings: self.settings.clone(),
        cancel: self.cancel.clone(),
        lineages: LineageGenerator::new(),
        in_flight: HashMap::new(),
        out: out_tx,
      };
      tokio::spawn(async move { poller.run().await });

      let mut outputs = HashMap::new();
      outputs.insert("out".to_string(), receiver_stream(out_rx));
      Ok(outputs)
    })
  }
}

struct Poller {
  name: String,
  adapter: Arc<dyn SourceAdapter>,
  tracker: Arc<AckTracker>,
  settlements: SettlementReceiver,
  settings: SourceSettings,
  cancel: CancellationToken,
  lineages: LineageGenerator,
  in_flight: HashMap<Lineage, DeliveryTag>,
  out: mpsc::Sender<Message>,
}

impl Poller {
  async fn run(&mut self) {
    info!(source = %self.name, "source started");
    loop {
      while let Ok(settlement) = self.settlements.try_recv() {
        self.settle(settlement).await;
      }

      if self.in_flight.len() > self.settings.max_pending {
        trace!(source = %self.name, in_flight = self.in_flight.len(), "at pending ceiling");
        tokio::select! {
          _ = self.cancel.cancelled() => break,
          Some(settlement) = self.settlements.recv() => self.settle(settlement).await,
          _ = tokio::time::sleep(self.settings.pending_backoff) => {}
        }
        continue;
      }

      let received = tokio::select! {
        _ = self.cancel.cancelled() => break,
        Some(settlement) = self.settlements.recv() => {
          self.settle(settlement).await;
          continue;
        }
        received = self.adapter.receive(self.settings.receive_timeout) => received,
      };

      match received {
        Ok(Some(delivery)) => {
          if !self.emit(delivery).await {
            break;
          }
        }
        Ok(None) => {
          if self.idle().await {
            break;
          }
        }
        Err(SourceError::Closed) if self.in_flight.is_empty() => break,
        Err(SourceError::Closed) => {
          // Closed while deliveries are outstanding: their settlements may
          // still requeue messages, so wait for them.
          tokio::select! {
            _ = self.cancel.cancelled() => break,
            Some(settlement) = self.settlements.recv() => self.settle(settlement).await,
            _ = tokio::time::sleep(self.settings.pending_backoff) => {}
          }
        }
        Err(e) => {
          warn!(source = %self.name, error = %e, "receive failed");
          if self.idle().await {
            break;
          }
        }
      }
    }
    info!(source = %self.name, in_flight = self.in_flight.len(), "source stopped");
  }

  /// Sleeps for the idle backoff. Returns true when cancelled.
  async fn idle(&self) -> bool {
    tokio::select! {
      _ = self.cancel.cancelled() => true,
      _ = tokio::time::sleep(self.settings.idle_backoff) => false,
    }
  }

  fn accepts(&self, record: &InboundRecord) -> bool {
    if !self.settings.english_only {
      return true;
    }
    // Unparseable payloads pass; the stages that read them report the error.
    match Payload::parse(&record.payload) {
      Ok(payload) => payload.is_english(),
      Err(_) => true,
    }
  }

  /// Emits a delivery. Returns false when the output has closed.
  async fn emit(&mut self, delivery: Delivery) -> bool {
    let Delivery { tag, record } = delivery;
    if !self.accepts(&record) {
      debug!(source = %self.name, id = record.id, "skipping non-English message");
      self.settle_with_adapter(tag, true).await;
      return true;
    }

    let root = self.lineages.next_root();
    let anchors = self.tracker.track(root);
    let tracked = !anchors.is_empty();
    if tracked {
      self.in_flight.insert(root, tag);
      metrics::record_in_flight(&self.name, self.in_flight.len());
    }

    let id = record.id;
    if self.out.send(record.into_anchored(anchors.clone())).await.is_err() {
      warn!(source = %self.name, id, "output closed");
      self.tracker.fail_all(&anchors);
      if !tracked {
        self.settle_with_adapter(tag, false).await;
      }
      return false;
    }
    trace!(source = %self.name, id, %root, "emitted");

    if !tracked {
      self.settle_with_adapter(tag, true).await;
    }
    true
  }

  async fn settle(&mut self, settlement: Settlement) {
    let Some(tag) = self.in_flight.remove(&settlement.lineage()) else {
      return;
    };
    metrics::record_in_flight(&self.name, self.in_flight.len());
    self
      .settle_with_adapter(tag, matches!(settlement, Settlement::Ack(_)))
      .await;
  }

  async fn settle_with_adapter(&self, tag: DeliveryTag, success: bool) {
    let result = if success {
      self.adapter.ack(tag).await
    } else {
      debug!(source = %self.name, tag = tag.0, "returning delivery for redelivery");
      self.adapter.fail(tag).await
    };
    if let Err(e) = result {
      warn!(source = %self.name, tag = tag.0, error = %e, "settling delivery failed");
    }
  }
}
