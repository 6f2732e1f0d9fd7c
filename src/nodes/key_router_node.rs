//! # Key Router Node
//!
//! Routes each message to one of N outputs by partition key, so all messages
//! sharing a key reach the same downstream instance.
//!
//! ## Ports
//!
//! - **Input**: `"in"` - Messages to route (several producers may connect)
//! - **Output**: `"out_0"` .. `"out_{N-1}"` - One port per downstream instance
//!
//! Messages keep their anchors; routing does not create lineage. Messages
//! without a key go to `"out_0"`.

use crate::node::{InputStreams, Node, NodeExecutionError, OutputStreams};
use crate::nodes::common::{BaseNode, delegate_base_node, receiver_stream};
use crate::partitioning::{PartitionKeyExtractor, shard_for_key};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Name of the output port for instance `index`.
pub fn partition_port(index: usize) -> String {
  format!("out_{}", index)
}

/// A node that partitions its input by key.
pub struct KeyRouterNode {
  base: BaseNode,
  extractor: Arc<dyn PartitionKeyExtractor>,
  partitions: usize,
  channel_capacity: usize,
}

impl KeyRouterNode {
  /// Creates a router with `partitions` outputs.
  pub fn new(
    name: impl Into<String>,
    extractor: Arc<dyn PartitionKeyExtractor>,
    partitions: usize,
  ) -> Self {
    let partitions = partitions.max(1);
    Self {
      base: BaseNode::new(
        name.into(),
        vec!["in".to_string()],
        (0..partitions).map(partition_port).collect(),
      ),
      extractor,
      partitions,
      channel_capacity: 64,
    }
  }

  /// Sets the capacity of each output channel.
  pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
    self.channel_capacity = capacity.max(1);
    self
  }
}

#[async_trait]
impl Node for KeyRouterNode {
  delegate_base_node!();

  fn execute(
    &self,
    mut inputs: InputStreams,
  ) -> Pin<Box<dyn Future<Output = Result<OutputStreams, NodeExecutionError>> + Send + '_>> {
    Box::pin(async move {
      let mut input = inputs.remove("in").ok_or("Missing 'in' input")?;

      let mut senders = Vec::with_capacity(self.partitions);
      let mut outputs = HashMap::new();
      for index in 0..self.partitions {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        senders.push(tx);
        outputs.insert(partition_port(index), receiver_stream(rx));
      }

      let extractor = Arc::clone(&self.extractor);
      let name = self.name().to_string();
      tokio::spawn(async move {
        while let Some(message) = input.next().await {
          let shard = match extractor.extract_key(&message) {
            Some(key) => shard_for_key(&key, senders.len()),
            None => {
              warn!(router = %name, stream = %message.stream(), "message has no partition key");
              0
            }
          };
          if senders[shard].send(message).await.is_err() {
            warn!(router = %name, shard, "partition closed");
          }
        }
      });

      Ok(outputs)
    })
  }
}
