//! # Stages
//!
//! A [`Stage`] is the unit of pipeline logic: it consumes one message at a
//! time and answers with a [`StageOutput`] describing what to emit and how
//! the input should be settled. [`StageNode`] runs a stage inside the graph
//! and does the lineage bookkeeping:
//!
//! 1. every [`Emission`] is anchored to its parents' roots and sent;
//! 2. only then is the input settled according to the [`Verdict`];
//! 3. finally any [`Release`]s (anchors the stage held earlier) are applied.
//!
//! Registering children before acking the parent keeps a root open while any
//! descendant is still in flight.
//!
//! ## Ticks
//!
//! Every stage node has a `"tick"` input. Ticks call [`Stage::on_tick`], which
//! is where windowed stages snapshot, batch sinks flush and the join evicts.
//! When all data inputs have ended, [`Stage::finish`] runs once and the
//! node's outputs close.

use crate::ack::AckTracker;
use crate::message::{Anchor, Fields, Message, Value};
use crate::metrics;
use crate::node::{InputStream, InputStreams, Node, NodeExecutionError, OutputStreams};
use crate::nodes::common::{BaseNode, delegate_base_node, receiver_stream};
use crate::records::StreamRecord;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Input port carrying control ticks.
pub const TICK_PORT: &str = "tick";
/// Output port carrying reports of failed inputs.
pub const ERROR_PORT: &str = "error";
/// Default data input port.
pub const IN_PORT: &str = "in";

/// How the input that produced an output should be settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
  /// Processed; ack the input.
  Success,
  /// Processed with a fallback; ack the input and record the reason.
  Degraded(String),
  /// The stage kept the input's anchors and will release them later.
  Held,
  /// Not processed; fail the input.
  Failed(String),
}

/// Anchors a stage held earlier, released now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Release {
  /// Ack the anchors.
  Ack(Vec<Anchor>),
  /// Fail the anchors.
  Fail(Vec<Anchor>),
}

/// A message to emit, anchored to the roots of `parents`.
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
  /// Stream (and output port) to emit on.
  pub stream: String,
  /// Field values.
  pub fields: Fields,
  /// Anchors of the messages this one derives from. Empty for unanchored output.
  pub parents: Vec<Anchor>,
}

impl Emission {
  /// Emits a typed record derived from `parents`.
  pub fn record<R: StreamRecord>(record: R, parents: Vec<Anchor>) -> Self {
    Self {
      stream: R::STREAM.to_string(),
      fields: record.into_fields(),
      parents,
    }
  }
}

/// What a stage produced for one input or tick.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
  /// Settlement of the input.
  pub verdict: Verdict,
  /// Messages to emit, in order.
  pub emissions: Vec<Emission>,
  /// Previously held anchors to settle.
  pub releases: Vec<Release>,
}

impl StageOutput {
  /// An output with the given verdict and nothing else.
  pub fn new(verdict: Verdict) -> Self {
    Self {
      verdict,
      emissions: Vec::new(),
      releases: Vec::new(),
    }
  }

  /// Successful processing.
  pub fn success() -> Self {
    Self::new(Verdict::Success)
  }

  /// Processing with a fallback.
  pub fn degraded(reason: impl Into<String>) -> Self {
    Self::new(Verdict::Degraded(reason.into()))
  }

  /// The input's anchors are held by the stage.
  pub fn held() -> Self {
    Self::new(Verdict::Held)
  }

  /// Processing failed.
  pub fn failed(reason: impl Into<String>) -> Self {
    Self::new(Verdict::Failed(reason.into()))
  }

  /// Adds an emission.
  pub fn emit(mut self, emission: Emission) -> Self {
    self.emissions.push(emission);
    self
  }

  /// Releases held anchors as acked.
  pub fn release_ack(mut self, anchors: Vec<Anchor>) -> Self {
    if !anchors.is_empty() {
      self.releases.push(Release::Ack(anchors));
    }
    self
  }

  /// Releases held anchors as failed.
  pub fn release_fail(mut self, anchors: Vec<Anchor>) -> Self {
    if !anchors.is_empty() {
      self.releases.push(Release::Fail(anchors));
    }
    self
  }
}

/// Pipeline logic run by a [`StageNode`].
#[async_trait]
pub trait Stage: Send + 'static {
  /// Streams this stage emits on. Each becomes an output port.
  fn output_streams(&self) -> Vec<String>;

  /// Processes one input message.
  async fn process(&mut self, message: &Message) -> StageOutput;

  /// Handles a control tick.
  async fn on_tick(&mut self) -> StageOutput {
    StageOutput::success()
  }

  /// Runs once after every data input has ended.
  async fn finish(&mut self) -> StageOutput {
    StageOutput::success()
  }
}

/// Adapts a [`Stage`] into a graph [`Node`].
pub struct StageNode<S> {
  base: BaseNode,
  stage: Mutex<Option<S>>,
  tracker: Arc<AckTracker>,
  data_ports: Vec<String>,
  channel_capacity: usize,
}

impl<S: Stage> StageNode<S> {
  /// Creates a node reading data from `"in"`.
  pub fn new(name: impl Into<String>, stage: S, tracker: Arc<AckTracker>) -> Self {
    Self::with_input_ports(name, stage, tracker, vec![IN_PORT.to_string()])
  }

  /// Creates a node reading data from the given ports.
  pub fn with_input_ports(
    name: impl Into<String>,
    stage: S,
    tracker: Arc<AckTracker>,
    data_ports: Vec<String>,
  ) -> Self {
    let mut inputs = data_ports.clone();
    inputs.push(TICK_PORT.to_string());
    let mut outputs = stage.output_streams();
    outputs.push(ERROR_PORT.to_string());
    Self {
      base: BaseNode::new(name.into(), inputs, outputs),
      stage: Mutex::new(Some(stage)),
      tracker,
      data_ports,
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
impl<S: Stage> Node for StageNode<S> {
  delegate_base_node!();

  fn execute(
    &self,
    mut inputs: InputStreams,
  ) -> Pin<Box<dyn Future<Output = Result<OutputStreams, NodeExecutionError>> + Send + '_>> {
    Box::pin(async move {
      let stage = self
        .stage
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take()
        .ok_or_else(|| format!("Stage '{}' is already running", self.name()))?;

      let data: Vec<InputStream> = self
        .data_ports
        .iter()
        .filter_map(|port| inputs.remove(port))
        .collect();
      let mut data = futures::stream::select_all(data);
      let mut ticks: InputStream = inputs
        .remove(TICK_PORT)
        .unwrap_or_else(|| Box::pin(futures::stream::pending()));

      let mut outputs = HashMap::new();
      let mut senders = HashMap::new();
      for port in self.output_port_names() {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        senders.insert(port.clone(), tx);
        outputs.insert(port.clone(), receiver_stream(rx));
      }

      let mut runner = StageRunner {
        name: self.name().to_string(),
        stage,
        tracker: Arc::clone(&self.tracker),
        senders,
      };

      tokio::spawn(async move {
        loop {
          tokio::select! {
            item = data.next() => match item {
              Some(message) => runner.handle(message).await,
              None => break,
            },
            Some(_) = ticks.next() => runner.tick().await,
          }
        }
        runner.finish().await;
        debug!(stage = %runner.name, "stage finished");
      });

      Ok(outputs)
    })
  }
}

struct StageRunner<S> {
  name: String,
  stage: S,
  tracker: Arc<AckTracker>,
  senders: HashMap<String, mpsc::Sender<Message>>,
}

impl<S: Stage> StageRunner<S> {
  async fn handle(&mut self, message: Message) {
    if message.is_tick() {
      self.tick().await;
      return;
    }
    let output = self.stage.process(&message).await;
    self.apply(output, Some(&message)).await;
  }

  async fn tick(&mut self) {
    let output = self.stage.on_tick().await;
    self.apply(output, None).await;
  }

  async fn finish(&mut self) {
    let output = self.stage.finish().await;
    self.apply(output, None).await;
  }

  async fn apply(&mut self, output: StageOutput, input: Option<&Message>) {
    for emission in output.emissions {
      self.emit(emission).await;
    }

    match (output.verdict, input) {
      (Verdict::Success, Some(input)) => self.tracker.ack_all(input.anchors()),
      (Verdict::Degraded(reason), Some(input)) => {
        warn!(stage = %self.name, %reason, "degraded result");
        metrics::record_degraded(&self.name);
        self.tracker.ack_all(input.anchors());
      }
      (Verdict::Held, _) | (Verdict::Success, None) => {}
      (Verdict::Degraded(reason), None) => {
        warn!(stage = %self.name, %reason, "degraded tick");
      }
      (Verdict::Failed(reason), input) => {
        error!(stage = %self.name, %reason, "processing failed");
        metrics::record_stage_error(&self.name);
        let stream = match input {
          Some(input) => {
            self.tracker.fail_all(input.anchors());
            input.stream().to_string()
          }
          None => String::new(),
        };
        self.report(reason, stream).await;
      }
    }

    for release in output.releases {
      match release {
        Release::Ack(anchors) => self.tracker.ack_all(&anchors),
        Release::Fail(anchors) => self.tracker.fail_all(&anchors),
      }
    }
  }

  async fn emit(&mut self, emission: Emission) {
    let Some(tx) = self.senders.get(&emission.stream) else {
      warn!(stage = %self.name, stream = %emission.stream, "no output port for stream");
      return;
    };
    let anchors = self.tracker.anchor(&emission.parents);
    let message = Message::anchored(emission.stream.clone(), emission.fields, anchors.clone());
    if tx.send(message).await.is_err() {
      warn!(stage = %self.name, stream = %emission.stream, "downstream closed");
      self.tracker.fail_all(&anchors);
      return;
    }
    metrics::record_emitted(&self.name, &emission.stream, 1);
  }

  async fn report(&mut self, reason: String, stream: String) {
    if let Some(tx) = self.senders.get(ERROR_PORT) {
      let report = Message::new(
        ERROR_PORT,
        vec![
          Value::Str(self.name.clone()),
          Value::Str(stream),
          Value::Str(reason),
        ],
      );
      let _ = tx.send(report).await;
    }
  }
}
