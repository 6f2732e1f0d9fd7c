//! # Node Architecture
//!
//! Every part of a pipeline (source, enrichment, join, sink, timer) is a
//! [`Node`]. A node declares named input and output ports, and
//! [`Node::execute`] turns the streams connected to its inputs into streams on
//! its outputs. The [`Graph`](crate::graph::Graph) wires outputs to inputs.
//!
//! ## Node Types
//!
//! - **Source nodes**: 0 inputs, 1+ outputs
//! - **Stage nodes**: 1+ inputs, outputs per emitted stream plus `"error"`
//! - **Sink stages**: 1+ inputs, only the `"error"` output
//!
//! ## Streams
//!
//! Items are [`Message`]s. Nodes run their processing loop on a spawned task
//! and expose bounded channels as output streams, so a slow consumer applies
//! backpressure to its producer.
//!
//! ## Port Naming Convention
//!
//! - Single input port: `"in"`
//! - Single output port: `"out"`
//! - Per-stream ports are named after the stream (`"sentiment"`, `"topic"`)
//! - Indexed ports: `"out_0"`, `"out_1"`, ...
//! - Control port: `"tick"` (input)
//! - Failed-message report port: `"error"` (output)

use crate::message::Message;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use tokio_stream::Stream;

/// Stream of messages consumed on an input port.
pub type InputStream = Pin<Box<dyn Stream<Item = Message> + Send>>;

/// Stream of messages produced on an output port.
pub type OutputStream = Pin<Box<dyn Stream<Item = Message> + Send>>;

/// Input streams keyed by port name.
pub type InputStreams = HashMap<String, InputStream>;

/// Output streams keyed by port name.
pub type OutputStreams = HashMap<String, OutputStream>;

/// Error type for node execution operations.
pub type NodeExecutionError = Box<dyn std::error::Error + Send + Sync>;

/// A named unit of processing with input and output ports.
///
/// # Execution Model
///
/// 1. The graph collects the streams connected to each input port.
/// 2. It calls `execute(inputs)`, which starts the node's work and returns
///    its output streams immediately.
/// 3. The graph connects those outputs to downstream inputs.
///
/// `execute` is called at most once per node instance.
#[async_trait]
pub trait Node: Send + Sync {
  /// Returns the name of the node.
  fn name(&self) -> &str;

  /// Sets the name of the node.
  fn set_name(&mut self, name: &str);

  /// Returns the names of all input ports, in order. Empty for sources.
  fn input_port_names(&self) -> &[String];

  /// Returns the names of all output ports, in order.
  fn output_port_names(&self) -> &[String];

  /// Checks if this node has an input port with the given name.
  fn has_input_port(&self, name: &str) -> bool;

  /// Checks if this node has an output port with the given name.
  fn has_output_port(&self, name: &str) -> bool;

  /// Starts the node.
  ///
  /// # Arguments
  ///
  /// * `inputs` - Streams connected to this node's input ports. Ports with
  ///   no connection are absent.
  ///
  /// # Returns
  ///
  /// One stream per output port. Every stream ends once the node has
  /// finished, which is how the graph observes completion.
  fn execute(
    &self,
    inputs: InputStreams,
  ) -> Pin<Box<dyn Future<Output = Result<OutputStreams, NodeExecutionError>> + Send + '_>>;
}
