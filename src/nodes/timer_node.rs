//! # Timer Node
//!
//! A source node that emits a control tick at a fixed interval.
//!
//! ## Ports
//!
//! - **Output**: `"out"` - Periodic [`Message::tick`]s
//!
//! The first tick is sent one full interval after start. Missed ticks are
//! skipped rather than bunched. The tick stream is lazy: it ends when the
//! cancellation token fires, and stops ticking once its consumer drops it.

use crate::message::Message;
use crate::node::{InputStreams, Node, NodeExecutionError, OutputStream, OutputStreams};
use crate::nodes::common::{BaseNode, delegate_base_node};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// A node that generates periodic ticks.
pub struct TimerNode {
  base: BaseNode,
  interval: Duration,
  cancel: CancellationToken,
}

impl TimerNode {
  /// Creates a timer ticking every `interval` until `cancel` fires.
  pub fn new(name: impl Into<String>, interval: Duration, cancel: CancellationToken) -> Self {
    Self {
      base: BaseNode::new(name.into(), Vec::new(), vec!["out".to_string()]),
      interval,
      cancel,
    }
  }
}

#[async_trait]
impl Node for TimerNode {
  delegate_base_node!();

  fn execute(
    &self,
    _inputs: InputStreams,
  ) -> Pin<Box<dyn Future<Output = Result<OutputStreams, NodeExecutionError>> + Send + '_>> {
    Box::pin(async move {
      if self.interval.is_zero() {
        return Err(format!("Timer '{}' needs a non-zero interval", self.name()).into());
      }

      let period = self.interval;
      let cancel = self.cancel.clone();
      let name = self.name().to_string();

      let ticks = stream! {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
          let fired = tokio::select! {
            _ = cancel.cancelled() => false,
            _ = interval.tick() => true,
          };
          if !fired {
            break;
          }
          trace!(timer = %name, "tick");
          yield Message::tick();
        }
      };

      let mut outputs = HashMap::new();
      let ticks: OutputStream = Box::pin(ticks);
      outputs.insert("out".to_string(), ticks);
      Ok(outputs)
    })
  }
}
