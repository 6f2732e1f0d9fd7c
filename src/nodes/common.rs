//! # Common Node Utilities
//!
//! Shared helpers for node implementations.

use crate::message::Message;
use crate::node::OutputStream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Name and port lists shared by every node.
#[derive(Debug, Clone)]
pub struct BaseNode {
  /// Node name.
  pub name: String,
  /// Input port names, in order.
  pub input_port_names: Vec<String>,
  /// Output port names, in order.
  pub output_port_names: Vec<String>,
}

impl BaseNode {
  /// Creates a new BaseNode with the given name and port names.
  pub fn new(name: String, input_port_names: Vec<String>, output_port_names: Vec<String>) -> Self {
    Self {
      name,
      input_port_names,
      output_port_names,
    }
  }

  /// Returns the node's name.
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Sets the node's name.
  pub fn set_name(&mut self, name: &str) {
    self.name = name.to_string();
  }

  /// Returns the list of input port names.
  pub fn input_port_names(&self) -> &[String] {
    &self.input_port_names
  }

  /// Returns the list of output port names.
  pub fn output_port_names(&self) -> &[String] {
    &self.output_port_names
  }

  /// Checks if the node has an input port with the given name.
  pub fn has_input_port(&self, name: &str) -> bool {
    self.input_port_names.iter().any(|p| p == name)
  }

  /// Checks if the node has an output port with the given name.
  pub fn has_output_port(&self, name: &str) -> bool {
    self.output_port_names.iter().any(|p| p == name)
  }
}

/// Boxes a channel receiver as an output stream.
pub fn receiver_stream(rx: mpsc::Receiver<Message>) -> OutputStream {
  Box::pin(ReceiverStream::new(rx))
}

/// Implements the port accessors of [`Node`](crate::node::Node) by
/// delegating to a `base: BaseNode` field.
macro_rules! delegate_base_node {
  () => {
    fn name(&self) -> &str {
      self.base.name()
    }

    fn set_name(&mut self, name: &str) {
      self.base.set_name(name);
    }

    fn input_port_names(&self) -> &[String] {
      self.base.input_port_names()
    }

    fn output_port_names(&self) -> &[String] {
      self.base.output_port_names()
    }

    fn has_input_port(&self, name: &str) -> bool {
      self.base.has_input_port(name)
    }

    fn has_output_port(&self, name: &str) -> bool {
      self.base.has_output_port(name)
    }
  };
}

pub(crate) use delegate_base_node;
