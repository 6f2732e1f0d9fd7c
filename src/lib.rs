//! # StormWeave
//!
//! At-least-once stream processing for short social-media messages.
//!
//! StormWeave pulls messages from a queue, fans them out to enrichment stages,
//! rejoins the enriched halves by message id, classifies the joined record into
//! topics, keeps a sliding-window trending count per topic and batches the
//! results into durable sinks.
//!
//! ## Key Pieces
//!
//! - **Nodes and graphs**: every stage is a [`node::Node`] wired into a
//!   [`graph::Graph`] by [`edge::Edge`]s. Output ports with several consumers
//!   are broadcast, input ports with several producers are merged.
//! - **Lineage tracking**: the [`ack::AckTracker`] follows every message a
//!   delivery fans out into and settles the delivery with the queue only once
//!   all of them are settled.
//! - **Windowed counting**: [`window::WindowedCounter`] keeps a rolling count
//!   over a fixed ring of slots rotated by an external tick.
//! - **Fan-in join**: [`join::JoinBuffer`] merges the two enrichment halves of a
//!   message exactly once.
//! - **Batching**: [`batch::BatchSink`] accumulates records and writes them as a
//!   unit on a size threshold or a tick.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stormweave::config::PipelineConfig;
//! use stormweave::topology::{Ports, Topology};
//!
//! # async fn run(ports: Ports) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let config = PipelineConfig::default();
//! let mut topology = Topology::build(&config, ports)?;
//! topology.start().await?;
//! while let Some(entry) = topology.trending_mut().recv().await {
//!   println!("{:?}", entry);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

/// Lineage tracking and ack/fail settlement.
pub mod ack;
/// Size- and tick-triggered batching sink.
pub mod batch;
/// Tokenizing topic and swear-word classifier.
pub mod classify;
/// Pipeline configuration.
pub mod config;
/// Connections between node ports.
pub mod edge;
/// Enrichment port contracts.
pub mod enrich;
/// Error types.
pub mod error;
/// Graph structure and execution.
pub mod graph;
/// Keyed fan-in join buffer.
pub mod join;
/// Message envelope, field values and lineage handles.
pub mod message;
/// Prometheus-compatible metrics.
pub mod metrics;
/// Core node trait and stream types.
pub mod node;
/// Built-in nodes: source, timer, router and collector.
pub mod nodes;
/// Key partitioning for parallel stateful stages.
pub mod partitioning;
/// Parsing of the structured message payload.
pub mod payload;
/// Inter-stage stream contracts.
pub mod records;
/// Descending row-key scheme for the column-family sink.
pub mod row_key;
/// Durable sinks: row batches and blobs.
pub mod sink;
/// Source adapter contract and in-memory queue.
pub mod source;
/// Stage capability and its node adapter.
pub mod stage;
/// Concrete pipeline stages.
pub mod stages;
/// Tracing subscriber setup.
pub mod telemetry;
/// Full pipeline wiring.
pub mod topology;
/// Slot-based sliding-window counter.
pub mod window;

#[cfg(test)]
mod batch_test;
#[cfg(test)]
mod join_test;
#[cfg(test)]
mod records_test;
#[cfg(test)]
mod stage_test;
#[cfg(test)]
mod window_test;
