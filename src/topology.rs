//! # Topology
//!
//! Wires the full pipeline into one [`Graph`]:
//!
//! ```text
//! source ─┬─> blobs
//!         ├─> sentiment ─┐
//!         └─> geography ─┴─> router ─> merge_0 .. merge_{N-1} ─> classify
//!
//! classify ─┬─ archive ─> tweets
//!           └─ topic ───┬─> topics
//!                       └─> trending ─> collector
//!
//! timer ─> tick of merge_*, tweets, topics, trending
//! ```
//!
//! Every external dependency comes in through [`Ports`], so the same wiring
//! runs against real services or the in-memory doubles in [`crate::source`]
//! and [`crate::sink`].
//!
//! The trending ranking leaves the graph through a channel; it must be read
//! (see [`Topology::trending_mut`]) or the classifier eventually backs up
//! behind it.

use crate::ack::AckTracker;
use crate::batch::BatchWriter;
use crate::classify::Classifier;
use crate::config::PipelineConfig;
use crate::edge::Edge;
use crate::enrich::{GeographyPort, SentimentPort};
use crate::error::PipelineError;
use crate::graph::{Graph, GraphExecutionError};
use crate::join::JoinPolicy;
use crate::message::{Message, streams};
use crate::node::Node;
use crate::nodes::collector_node::CollectorNode;
use crate::nodes::key_router_node::{KeyRouterNode, partition_port};
use crate::nodes::source_node::{SourceNode, SourceSettings};
use crate::nodes::timer_node::TimerNode;
use crate::partitioning::FieldKey;
use crate::sink::{BlobStore, Row};
use crate::source::SourceAdapter;
use crate::stage::{IN_PORT, Stage, StageNode, TICK_PORT};
use crate::stages::batch_sink_stage::BatchSinkStage;
use crate::stages::blob_writer_stage::BlobWriterStage;
use crate::stages::classify_stage::ClassifyStage;
use crate::stages::enrich_stage::{GeographyStage, SentimentStage};
use crate::stages::merge_stage::MergeStage;
use crate::stages::trending_stage::TrendingStage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Node names used by the topology.
pub mod names {
  /// Queue reader.
  pub const SOURCE: &str = "source";
  /// Raw payload archiver.
  pub const BLOBS: &str = "blobs";
  /// Sentiment enrichment.
  pub const SENTIMENT: &str = "sentiment";
  /// Geography enrichment.
  pub const GEOGRAPHY: &str = "geography";
  /// Partitions enrichments across merge instances.
  pub const ROUTER: &str = "router";
  /// Topic and profanity classification.
  pub const CLASSIFY: &str = "classify";
  /// Tweets table writer.
  pub const TWEETS: &str = "tweets";
  /// Topics table writer.
  pub const TOPICS: &str = "topics";
  /// Windowed topic ranking.
  pub const TRENDING: &str = "trending";
  /// Hands rankings to the caller.
  pub const COLLECTOR: &str = "collector";
  /// Tick source.
  pub const TIMER: &str = "timer";

  /// Name of merge instance `index`.
  pub fn merge(index: usize) -> String {
    format!("merge_{}", index)
  }
}

/// The external systems a pipeline talks to.
pub struct Ports {
  /// Inbound queue.
  pub source: Arc<dyn SourceAdapter>,
  /// Sentiment lookup.
  pub sentiment: Arc<dyn SentimentPort>,
  /// Geography lookup.
  pub geography: Arc<dyn GeographyPort>,
  /// Raw payload store.
  pub blobs: Arc<dyn BlobStore>,
  /// Tweets (archive) table.
  pub tweets: Arc<dyn BatchWriter<Row>>,
  /// Topics table.
  pub topics: Arc<dyn BatchWriter<Row>>,
  /// Topic and swear-word classifier.
  pub classifier: Arc<Classifier>,
}

/// A wired pipeline, ready to start.
pub struct Topology {
  graph: Graph,
  tracker: Arc<AckTracker>,
  trending: mpsc::Receiver<Message>,
  cancel: CancellationToken,
}

impl Topology {
  /// Validates `config` and wires the pipeline around `ports`.
  ///
  /// # Errors
  ///
  /// Fails on an invalid configuration or if the graph cannot be wired.
  pub fn build(config: &PipelineConfig, ports: Ports) -> Result<Self, PipelineError> {
    config.validate()?;

    let (tracker, settlements) = AckTracker::new(config.enable_ack);
    let cancel = CancellationToken::new();
    let capacity = config.channel_capacity;
    let mut graph = Graph::new("stormweave", Arc::clone(&tracker)).with_channel_capacity(capacity);

    add(
      &mut graph,
      names::SOURCE,
      Box::new(
        SourceNode::new(
          names::SOURCE,
          ports.source,
          Arc::clone(&tracker),
          settlements,
          SourceSettings::from(config),
          cancel.clone(),
        )
        .with_channel_capacity(capacity),
      ),
    )?;
    add(
      &mut graph,
      names::TIMER,
      Box::new(TimerNode::new(names::TIMER, config.tick_interval(), cancel.clone())),
    )?;

    add_stage(&mut graph, names::BLOBS, BlobWriterStage::new(ports.blobs), &tracker, capacity)?;
    add_stage(
      &mut graph,
      names::SENTIMENT,
      SentimentStage::new(ports.sentiment),
      &tracker,
      capacity,
    )?;
    add_stage(
      &mut graph,
      names::GEOGRAPHY,
      GeographyStage::new(ports.geography),
      &tracker,
      capacity,
    )?;
    add(
      &mut graph,
      names::ROUTER,
      Box::new(
        KeyRouterNode::new(names::ROUTER, Arc::new(FieldKey(0)), config.join_parallelism)
          .with_channel_capacity(capacity),
      ),
    )?;

    let policy = JoinPolicy {
      ttl: config.join_ttl(),
      capacity: config.join_capacity,
    };
    for index in 0..config.join_parallelism {
      let name = names::merge(index);
      add_stage(&mut graph, &name, MergeStage::new(name.clone(), policy), &tracker, capacity)?;
    }

    add_stage(
      &mut graph,
      names::CLASSIFY,
      ClassifyStage::new(ports.classifier),
      &tracker,
      capacity,
    )?;
    add_stage(
      &mut graph,
      names::TWEETS,
      BatchSinkStage::archive(names::TWEETS, ports.tweets, config.batch_threshold),
      &tracker,
      capacity,
    )?;
    add_stage(
      &mut graph,
      names::TOPICS,
      BatchSinkStage::topics(names::TOPICS, ports.topics, config.batch_threshold),
      &tracker,
      capacity,
    )?;
    let trending = TrendingStage::new(config.window_slots, config.trending_top_n)
      .map_err(|e| PipelineError::Graph(e.to_string()))?;
    add_stage(&mut graph, names::TRENDING, trending, &tracker, capacity)?;

    let (collector, trending) = CollectorNode::channel(names::COLLECTOR, capacity, Arc::clone(&tracker));
    add(&mut graph, names::COLLECTOR, Box::new(collector))?;

    let mut edges = vec![
      Edge::new(names::SOURCE, "out", names::BLOBS, IN_PORT),
      Edge::new(names::SOURCE, "out", names::SENTIMENT, IN_PORT),
      Edge::new(names::SOURCE, "out", names::GEOGRAPHY, IN_PORT),
      Edge::new(names::SENTIMENT, streams::SENTIMENT, names::ROUTER, "in"),
      Edge::new(names::GEOGRAPHY, streams::GEOGRAPHY, names::ROUTER, "in"),
      Edge::new(names::CLASSIFY, streams::ARCHIVE, names::TWEETS, IN_PORT),
      Edge::new(names::CLASSIFY, streams::TOPIC, names::TOPICS, IN_PORT),
      Edge::new(names::CLASSIFY, streams::TOPIC, names::TRENDING, IN_PORT),
      Edge::new(names::TRENDING, streams::TRENDING, names::COLLECTOR, "in"),
      Edge::new(names::TIMER, "out", names::TWEETS, TICK_PORT),
      Edge::new(names::TIMER, "out", names::TOPICS, TICK_PORT),
      Edge::new(names::TIMER, "out", names::TRENDING, TICK_PORT),
    ];
    for index in 0..config.join_parallelism {
      let merge = names::merge(index);
      edges.push(Edge::new(names::ROUTER, partition_port(index), merge.clone(), IN_PORT));
      edges.push(Edge::new(merge.clone(), streams::JOINED, names::CLASSIFY, IN_PORT));
      edges.push(Edge::new(names::TIMER, "out", merge, TICK_PORT));
    }
    for edge in edges {
      graph.add_edge(edge).map_err(PipelineError::Graph)?;
    }

    info!(
      merges = config.join_parallelism,
      ack = config.enable_ack,
      tick_secs = config.tick_interval_secs,
      "topology built"
    );
    Ok(Self {
      graph,
      tracker,
      trending,
      cancel,
    })
  }

  /// Starts every node.
  pub async fn start(&self) -> Result<(), GraphExecutionError> {
    self.graph.execute().await
  }

  /// The trending rankings, one [`TrendingRecord`](crate::records::TrendingRecord)
  /// message per entry. Ends once the pipeline has finished.
  pub fn trending_mut(&mut self) -> &mut mpsc::Receiver<Message> {
    &mut self.trending
  }

  /// Takes the trending receiver, e.g. to read it from another task. Later
  /// calls to [`Topology::trending_mut`] see an ended channel.
  pub fn take_trending(&mut self) -> mpsc::Receiver<Message> {
    let (_, ended) = mpsc::channel(1);
    std::mem::replace(&mut self.trending, ended)
  }

  /// The lineage tracker shared by every node.
  pub fn tracker(&self) -> &Arc<AckTracker> {
    &self.tracker
  }

  /// The underlying graph.
  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  /// Waits for the pipeline to finish on its own, which happens once the
  /// source is closed and every delivery has been settled.
  pub async fn wait_for_completion(&self) -> Result<(), GraphExecutionError> {
    self.graph.wait_for_completion().await
  }

  /// Stops reading from the source and ticking, then stops routing.
  /// Deliveries still in flight are left to the queue's redelivery.
  pub async fn shutdown(&self) -> Result<(), GraphExecutionError> {
    info!(pending_roots = self.tracker.pending_roots(), "shutting down");
    self.cancel.cancel();
    self.graph.stop().await
  }
}

fn add(graph: &mut Graph, name: &str, node: Box<dyn Node>) -> Result<(), PipelineError> {
  graph.add_node(name.to_string(), node).map_err(PipelineError::Graph)
}

fn add_stage<S: Stage>(
  graph: &mut Graph,
  name: &str,
  stage: S,
  tracker: &Arc<AckTracker>,
  capacity: usize,
) -> Result<(), PipelineError> {
  let node = StageNode::new(name, stage, Arc::clone(tracker)).with_channel_capacity(capacity);
  add(graph, name, Box::new(node))
}
