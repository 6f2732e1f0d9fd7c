//! Connections between node ports.

/// A directed connection from an output port to an input port.
///
/// Several edges may leave the same output port (the graph broadcasts) and
/// several may enter the same input port (the graph merges).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
  /// Name of the producing node.
  pub source_node: String,
  /// Output port on the producing node.
  pub source_port: String,
  /// Name of the consuming node.
  pub target_node: String,
  /// Input port on the consuming node.
  pub target_port: String,
}

impl Edge {
  /// Creates an edge.
  pub fn new(
    source_node: impl Into<String>,
    source_port: impl Into<String>,
    target_node: impl Into<String>,
    target_port: impl Into<String>,
  ) -> Self {
    Self {
      source_node: source_node.into(),
      source_port: source_port.into(),
      target_node: target_node.into(),
      target_port: target_port.into(),
    }
  }

  /// Name of the producing node.
  pub fn source_node(&self) -> &str {
    &self.source_node
  }

  /// Output port on the producing node.
  pub fn source_port(&self) -> &str {
    &self.source_port
  }

  /// Name of the consuming node.
  pub fn target_node(&self) -> &str {
    &self.target_node
  }

  /// Input port on the consuming node.
  pub fn target_port(&self) -> &str {
    &self.target_port
  }
}
