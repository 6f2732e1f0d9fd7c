//! # Source Adapters
//!
//! A [`SourceAdapter`] is a peek-lock queue: [`receive`](SourceAdapter::receive)
//! hands out a message and hides it from other receivers until it is
//! [`ack`](SourceAdapter::ack)ed (deleted) or [`fail`](SourceAdapter::fail)ed
//! (made visible again). The source node settles every delivery exactly once.
//!
//! [`MemoryQueue`] is the in-process implementation. Failed messages go back
//! to the front of the queue so they are redelivered next.

use crate::error::SourceError;
use crate::records::InboundRecord;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

/// Opaque handle of one delivery, used to settle it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeliveryTag(pub u64);

/// One received message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
  /// Handle to settle the delivery with.
  pub tag: DeliveryTag,
  /// The message.
  pub record: InboundRecord,
}

/// A peek-lock message queue.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
  /// Waits up to `timeout` for a message. `Ok(None)` means none arrived;
  /// [`SourceError::Closed`] means none ever will.
  async fn receive(&self, timeout: Duration) -> Result<Option<Delivery>, SourceError>;

  /// Deletes a delivered message.
  async fn ack(&self, tag: DeliveryTag) -> Result<(), SourceError>;

  /// Returns a delivered message to the queue for redelivery.
  async fn fail(&self, tag: DeliveryTag) -> Result<(), SourceError>;
}

#[derive(Default)]
struct QueueState {
  ready: VecDeque<InboundRecord>,
  locked: HashMap<DeliveryTag, InboundRecord>,
  next_tag: u64,
  closed: bool,
  redeliveries: u64,
}

/// In-process peek-lock queue.
#[derive(Default)]
pub struct MemoryQueue {
  state: Mutex<QueueState>,
  notify: Notify,
}

impl MemoryQueue {
  /// Creates an empty, open queue.
  pub fn new() -> Self {
    Self::default()
  }

  fn state(&self) -> MutexGuard<'_, QueueState> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Appends a message.
  pub fn publish(&self, record: InboundRecord) {
    self.state().ready.push_back(record);
    self.notify.notify_one();
  }

  /// Stops accepting messages. Receivers see [`SourceError::Closed`] once
  /// nothing is ready or locked.
  pub fn close(&self) {
    self.state().closed = true;
    self.notify.notify_waiters();
  }

  /// Messages waiting to be received.
  pub fn ready_len(&self) -> usize {
    self.state().ready.len()
  }

  /// Messages received but not yet settled.
  pub fn locked_len(&self) -> usize {
    self.state().locked.len()
  }

  /// Number of failed deliveries returned to the queue.
  pub fn redelivery_count(&self) -> u64 {
    self.state().redeliveries
  }

  fn try_take(&self) -> Result<Option<Delivery>, SourceError> {
    let mut state = self.state();
    if let Some(record) = state.ready.pop_front() {
      let tag = DeliveryTag(state.next_tag);
      state.next_tag += 1;
      state.locked.insert(tag, record.clone());
      return Ok(Some(Delivery { tag, record }));
    }
    if state.closed && state.locked.is_empty() {
      return Err(SourceError::Closed);
    }
    Ok(None)
  }
}

#[async_trait]
impl SourceAdapter for MemoryQueue {
  async fn receive(&self, timeout: Duration) -> Result<Option<Delivery>, SourceError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
      let notified = self.notify.notified();
      if let Some(delivery) = self.try_take()? {
        return Ok(Some(delivery));
      }
      if tokio::time::timeout_at(deadline, notified).await.is_err() {
        return self.try_take();
      }
    }
  }

  async fn ack(&self, tag: DeliveryTag) -> Result<(), SourceError> {
    let removed = {
      let mut state = self.state();
      let removed = state.locked.remove(&tag).is_some();
      if removed && state.closed && state.locked.is_empty() {
        self.notify.notify_waiters();
      }
      removed
    };
    if removed {
      Ok(())
    } else {
      Err(SourceError::Transport(format!(
        "unknown delivery {}",
        tag.0
      )))
    }
  }

  async fn fail(&self, tag: DeliveryTag) -> Result<(), SourceError> {
    let requeued = {
      let mut state = self.state();
      match state.locked.remove(&tag) {
        Some(record) => {
          state.ready.push_front(record);
          state.redeliveries += 1;
          true
        }
        None => false,
      }
    };
    if requeued {
      self.notify.notify_one();
      Ok(())
    } else {
      Err(SourceError::Transport(format!(
        "unknown delivery {}",
        tag.0
      )))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(id: i64) -> InboundRecord {
    InboundRecord {
      id,
      payload: format!("{{\"Id\":{}}}", id),
    }
  }

  #[tokio::test]
  async fn test_receive_locks_until_ack() {
    let queue = MemoryQueue::new();
    queue.publish(record(1));
    let delivery = queue
      .receive(Duration::from_millis(10))
      .await
      .unwrap()
      .unwrap();
    assert_eq!(delivery.record.id, 1);
    assert_eq!(queue.locked_len(), 1);
    assert!(queue.receive(Duration::from_millis(10)).await.unwrap().is_none());

    queue.ack(delivery.tag).await.unwrap();
    assert_eq!(queue.locked_len(), 0);
    assert!(queue.ack(delivery.tag).await.is_err());
  }

  #[tokio::test]
  async fn test_fail_redelivers_first() {
    let queue = MemoryQueue::new();
    queue.publish(record(1));
    queue.publish(record(2));
    let first = queue.receive(Duration::ZERO).await.unwrap().unwrap();
    queue.fail(first.tag).await.unwrap();
    let again = queue.receive(Duration::ZERO).await.unwrap().unwrap();
    assert_eq!(again.record.id, 1);
    assert_ne!(again.tag, first.tag);
    assert_eq!(queue.redelivery_count(), 1);
  }

  #[tokio::test]
  async fn test_closed_only_when_drained_and_settled() {
    let queue = MemoryQueue::new();
    queue.publish(record(1));
    queue.close();
    let delivery = queue.receive(Duration::ZERO).await.unwrap().unwrap();
    assert_eq!(queue.receive(Duration::ZERO).await, Ok(None));
    queue.ack(delivery.tag).await.unwrap();
    assert_eq!(
      queue.receive(Duration::ZERO).await,
      Err(SourceError::Closed)
    );
  }

  #[tokio::test]
  async fn test_receive_wakes_on_publish() {
    let queue = std::sync::Arc::new(MemoryQueue::new());
    let publisher = std::sync::Arc::clone(&queue);
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(20)).await;
      publisher.publish(record(5));
    });
    let delivery = queue.receive(Duration::from_secs(5)).await.unwrap();
    assert_eq!(delivery.map(|d| d.record.id), Some(5));
  }
}
