//! # Graph
//!
//! A [`Graph`] holds nodes and the edges between their ports, and runs them
//! by wiring streams together.
//!
//! ## Execution
//!
//! 1. Nodes are ordered topologically (sources first).
//! 2. Each node receives the streams connected to its input ports and
//!    returns its output streams.
//! 3. Every output stream is routed to the inputs its edges point at.
//!
//! ## Routing
//!
//! - **One edge**: the stream is handed to the target as is.
//! - **Several edges from one output** (fan-out): a broadcast task copies
//!   each message to every target. Every copy gets its own lineage anchor
//!   and the original anchor is acked, so the root stays open until all
//!   copies are settled.
//! - **Several edges into one input** (fan-in): the streams are merged.
//! - **No edge**: the stream is drained and its messages acked, so an
//!   unconsumed emission never holds a root open.
//!
//! A broadcast ends once every target has closed, which releases its
//! producer. Broadcast and drain tasks are tracked; [`Graph::wait_for_completion`]
//! returns once they have all ended, which happens when every node's outputs
//! have closed.
//!
//! ## Example
//!
//! ```rust,no_run
//! use stormweave::ack::AckTracker;
//! use stormweave::edge::Edge;
//! use stormweave::graph::Graph;
//!
//! # async fn run(source: Box<dyn stormweave::node::Node>, sink: Box<dyn stormweave::node::Node>)
//! # -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let (tracker, _settlements) = AckTracker::new(true);
//! let mut graph = Graph::new("pipeline", tracker);
//! graph.add_node("source".to_string(), source)?;
//! graph.add_node("sink".to_string(), sink)?;
//! graph.add_edge(Edge::new("source", "out", "sink", "in"))?;
//!
//! graph.execute().await?;
//! graph.wait_for_completion().await?;
//! # Ok(())
//! # }
//! ```

use crate::ack::AckTracker;
use crate::edge::Edge;
use crate::message::Message;
use crate::node::{InputStream, InputStreams, Node, OutputStream};
use crate::nodes::common::receiver_stream;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Error type for graph execution operations.
pub type GraphExecutionError = Box<dyn std::error::Error + Send + Sync>;

type ExecutionHandleVec = Arc<Mutex<Vec<JoinHandle<Result<(), GraphExecutionError>>>>>;

type PortKey = (String, String);

/// A graph of nodes connected port to port.
pub struct Graph {
  name: String,
  nodes: HashMap<String, Box<dyn Node>>,
  edges: Vec<Edge>,
  tracker: Arc<AckTracker>,
  channel_capacity: usize,
  execution_handles: ExecutionHandleVec,
  stop_signal: CancellationToken,
}

impl Graph {
  /// Creates an empty graph whose routing reports lineage to `tracker`.
  pub fn new(name: impl Into<String>, tracker: Arc<AckTracker>) -> Self {
    Self {
      name: name.into(),
      nodes: HashMap::new(),
      edges: Vec::new(),
      tracker,
      channel_capacity: 64,
      execution_handles: Arc::new(Mutex::new(Vec::new())),
      stop_signal: CancellationToken::new(),
    }
  }

  /// Sets the capacity of the channels created for fan-out.
  pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
    self.channel_capacity = capacity.max(1);
    self
  }

  /// Returns the graph's name.
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Returns all nodes.
  pub fn get_nodes(&self) -> Vec<&dyn Node> {
    self.nodes.values().map(|node| node.as_ref()).collect()
  }

  /// Gets a node by name.
  pub fn find_node_by_name(&self, name: &str) -> Option<&dyn Node> {
    self.nodes.get(name).map(|node| node.as_ref())
  }

  /// Adds a node.
  ///
  /// # Errors
  ///
  /// Returns an error if a node with the same name already exists.
  pub fn add_node(&mut self, name: String, node: Box<dyn Node>) -> Result<(), String> {
    if self.nodes.contains_key(&name) {
      return Err(format!("Node with name '{}' already exists", name));
    }
    self.nodes.insert(name, node);
    Ok(())
  }

  /// Returns all edges.
  pub fn get_edges(&self) -> Vec<&Edge> {
    self.edges.iter().collect()
  }

  /// Finds an edge by its endpoints.
  pub fn find_edge_by_nodes_and_ports(
    &self,
    source_node: &str,
    source_port: &str,
    target_node: &str,
    target_port: &str,
  ) -> Option<&Edge> {
    self.edges.iter().find(|e| {
      e.source_node() == source_node
        && e.source_port() == source_port
        && e.target_node() == target_node
        && e.target_port() == target_port
    })
  }

  /// Adds an edge.
  ///
  /// # Errors
  ///
  /// Returns an error if either node or port does not exist, or the same
  /// connection is already present.
  pub fn add_edge(&mut self, edge: Edge) -> Result<(), String> {
    let source = self
      .nodes
      .get(edge.source_node())
      .ok_or_else(|| format!("Source node '{}' does not exist", edge.source_node()))?;
    let target = self
      .nodes
      .get(edge.target_node())
      .ok_or_else(|| format!("Target node '{}' does not exist", edge.target_node()))?;

    if !source.has_output_port(edge.source_port()) {
      return Err(format!(
        "Source node '{}' does not have output port '{}'",
        edge.source_node(),
        edge.source_port()
      ));
    }
    if !target.has_input_port(edge.target_port()) {
      return Err(format!(
        "Target node '{}' does not have input port '{}'",
        edge.target_node(),
        edge.target_port()
      ));
    }

    if self
      .find_edge_by_nodes_and_ports(
        edge.source_node(),
        edge.source_port(),
        edge.target_node(),
        edge.target_port(),
      )
      .is_some()
    {
      return Err("Edge already exists".to_string());
    }

    self.edges.push(edge);
    Ok(())
  }

  /// Starts every node and wires their streams.
  ///
  /// # Errors
  ///
  /// Fails if the graph has a cycle or a node refuses to start.
  pub async fn execute(&self) -> Result<(), GraphExecutionError> {
    self.execution_handles.lock().await.clear();

    let nodes = self.get_nodes();
    let edges = self.get_edges();
    let order = topological_sort(&nodes, &edges)?;
    info!(graph = %self.name, nodes = order.len(), edges = edges.len(), "executing graph");

    let mut pending: HashMap<PortKey, Vec<InputStream>> = HashMap::new();

    for node_name in order {
      let node = self
        .nodes
        .get(&node_name)
        .ok_or_else(|| format!("Node '{}' not found", node_name))?;

      let mut inputs: InputStreams = HashMap::new();
      for port in node.input_port_names() {
        let Some(mut streams) = pending.remove(&(node_name.clone(), port.clone())) else {
          continue;
        };
        let stream: InputStream = if streams.len() == 1 {
          streams.remove(0)
        } else {
          Box::pin(futures::stream::select_all(streams))
        };
        inputs.insert(port.clone(), stream);
      }

      let outputs = node.execute(inputs).await?;

      for (port, stream) in outputs {
        let targets: Vec<PortKey> = edges
          .iter()
          .filter(|e| e.source_node() == node_name && e.source_port() == port)
          .map(|e| (e.target_node().to_string(), e.target_port().to_string()))
          .collect();

        match targets.len() {
          0 => self.spawn_drain(&node_name, &port, stream).await,
          1 => {
            if let Some(target) = targets.into_iter().next() {
              pending.entry(target).or_default().push(stream);
            }
          }
          _ => {
            let copies = self.spawn_broadcast(&node_name, &port, stream, targets.len()).await;
            for (target, copy) in targets.into_iter().zip(copies) {
              pending.entry(target).or_default().push(copy);
            }
          }
        }
      }
    }

    Ok(())
  }

  async fn spawn_drain(&self, node: &str, port: &str, mut stream: OutputStream) {
    let tracker = Arc::clone(&self.tracker);
    let stop_signal = self.stop_signal.clone();
    let label = format!("{}.{}", node, port);
    let handle = tokio::spawn(async move {
      let mut drained = 0u64;
      loop {
        tokio::select! {
          _ = stop_signal.cancelled() => break,
          item = stream.next() => match item {
            Some(message) => {
              tracker.ack_all(message.anchors());
              drained += 1;
            }
            None => break,
          },
        }
      }
      debug!(output = %label, drained, "drained unconnected output");
      Ok(())
    });
    self.execution_handles.lock().await.push(handle);
  }

  async fn spawn_broadcast(
    &self,
    node: &str,
    port: &str,
    mut stream: OutputStream,
    fanout: usize,
  ) -> Vec<InputStream> {
    let mut senders: Vec<Option<mpsc::Sender<Message>>> = Vec::with_capacity(fanout);
    let mut copies = Vec::with_capacity(fanout);
    for _ in 0..fanout {
      let (tx, rx) = mpsc::channel(self.channel_capacity);
      senders.push(Some(tx));
      copies.push(receiver_stream(rx));
    }

    let tracker = Arc::clone(&self.tracker);
    let stop_signal = self.stop_signal.clone();
    let label = format!("{}.{}", node, port);
    let handle = tokio::spawn(async move {
      loop {
        let message = tokio::select! {
          _ = stop_signal.cancelled() => break,
          item = stream.next() => match item {
            Some(message) => message,
            None => break,
          },
        };

        for (index, slot) in senders.iter_mut().enumerate() {
          let Some(tx) = slot else {
            continue;
          };
          let anchors = tracker.anchor(message.anchors());
          let copy = message.clone().with_anchors(anchors.clone());
          if tx.send(copy).await.is_err() {
            warn!(output = %label, target = index, "fan-out target closed");
            tracker.fail_all(&anchors);
            *slot = None;
          }
        }
        tracker.ack_all(message.anchors());
        if senders.iter().all(Option::is_none) {
          debug!(output = %label, "every fan-out target closed");
          break;
        }
      }
      Ok(())
    });
    self.execution_handles.lock().await.push(handle);
    copies
  }

  /// Stops routing: drain and broadcast tasks end and their streams are
  /// dropped, which closes the nodes feeding them.
  pub async fn stop(&self) -> Result<(), GraphExecutionError> {
    self.stop_signal.cancel();
    let handles = std::mem::take(&mut *self.execution_handles.lock().await);
    for handle in handles {
      let _ = handle.await;
    }
    info!(graph = %self.name, "graph stopped");
    Ok(())
  }

  /// Waits until every routed stream has ended.
  pub async fn wait_for_completion(&self) -> Result<(), GraphExecutionError> {
    let handles = std::mem::take(&mut *self.execution_handles.lock().await);
    for handle in handles {
      handle.await??;
    }
    Ok(())
  }
}

/// Orders nodes so every node comes after all of its upstream nodes
/// (Kahn's algorithm).
///
/// # Errors
///
/// Fails if the edges form a cycle or name an unknown node.
pub fn topological_sort(
  nodes: &[&dyn Node],
  edges: &[&Edge],
) -> Result<Vec<String>, GraphExecutionError> {
  let mut in_degree: HashMap<&str, usize> = HashMap::new();
  let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

  for node in nodes {
    in_degree.insert(node.name(), 0);
    adjacency.insert(node.name(), Vec::new());
  }

  for edge in edges {
    let targets = adjacency
      .get_mut(edge.source_node())
      .ok_or_else(|| format!("Unknown node '{}'", edge.source_node()))?;
    targets.push(edge.target_node());
    *in_degree
      .get_mut(edge.target_node())
      .ok_or_else(|| format!("Unknown node '{}'", edge.target_node()))? += 1;
  }

  // Seed in name order so the result is deterministic.
  let mut roots: Vec<&str> = in_degree
    .iter()
    .filter(|(_, degree)| **degree == 0)
    .map(|(name, _)| *name)
    .collect();
  roots.sort_unstable();
  let mut queue: VecDeque<&str> = roots.into();

  let mut result = Vec::with_capacity(nodes.len());
  while let Some(name) = queue.pop_front() {
    result.push(name.to_string());
    if let Some(neighbors) = adjacency.get(name) {
      for neighbor in neighbors {
        if let Some(degree) = in_degree.get_mut(neighbor) {
          *degree -= 1;
          if *degree == 0 {
            queue.push_back(*neighbor);
          }
        }
      }
    }
  }

  if result.len() != nodes.len() {
    return Err("Graph contains cycles".into());
  }

  Ok(result)
}
