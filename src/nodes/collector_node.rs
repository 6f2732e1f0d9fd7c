//! # Collector Node
//!
//! A sink that forwards every message it receives to a channel owned by the
//! caller, then acks it. Used to expose a pipeline's final stream (for
//! example the trending ranking) outside the graph.
//!
//! ## Ports
//!
//! - **Input**: `"in"` - Messages to collect (several producers may connect)
//!
//! The receiver sees the end of the stream once the input has ended.

use crate::ack::AckTracker;
use crate::message::Message;
use crate::node::{InputStreams, Node, NodeExecutionError, OutputStreams};
use crate::nodes::common::{BaseNode, delegate_base_node};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

/// A node that hands messages to an external receiver.
pub struct CollectorNode {
  base: BaseNode,
  sender: Mutex<Option<mpsc::Sender<Message>>>,
  tracker: Arc<AckTracker>,
}

impl CollectorNode {
  /// Creates a collector sending to `sender`.
  pub fn new(name: impl Into<String>, sender: mpsc::Sender<Message>, tracker: Arc<AckTracker>) -> Self {
    Self {
      base: BaseNode::new(name.into(), vec!["in".to_string()], Vec::new()),
      sender: Mutex::new(Some(sender)),
      tracker,
    }
  }

  /// Creates a collector and the receiver its messages arrive on.
  pub fn channel(
    name: impl Into<String>,
    capacity: usize,
    tracker: Arc<AckTracker>,
  ) -> (Self, mpsc::Receiver<Message>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (Self::new(name, tx, tracker), rx)
  }
}

#[async_trait]
impl Node for CollectorNode {
  delegate_base_node!();

  fn execute(
    &self,
    mut inputs: InputStreams,
  ) -> Pin<Box<dyn Future<Output = Result<OutputStreams, NodeExecutionError>> + Send + '_>> {
    Box::pin(async move {
      let mut input = inputs.remove("in").ok_or("Missing 'in' input")?;
      let sender = self
        .sender
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take()
        .ok_or_else(|| format!("Collector '{}' is already running", self.name()))?;
      let tracker = Arc::clone(&self.tracker);
      let name = self.name().to_string();

      tokio::spawn(async move {
        while let Some(message) = input.next().await {
          let anchors = message.anchors().to_vec();
          if sender.send(message).await.is_err() {
            debug!(collector = %name, "receiver dropped, acking remaining input");
          }
          tracker.ack_all(&anchors);
        }
      });

      Ok(HashMap::new())
    })
  }
}
