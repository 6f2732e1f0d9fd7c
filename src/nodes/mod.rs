//! # Built-in Nodes
//!
//! Nodes that are not stages: they produce messages from outside the graph,
//! route them, or hand them out of it.
//!
//! - [`source_node::SourceNode`]: pulls deliveries from a queue
//! - [`timer_node::TimerNode`]: emits periodic ticks
//! - [`key_router_node::KeyRouterNode`]: partitions by key
//! - [`collector_node::CollectorNode`]: forwards to an external channel
//!
//! Stage logic runs in [`StageNode`](crate::stage::StageNode).

pub mod collector_node;
pub mod common;
pub mod key_router_node;
pub mod source_node;
pub mod timer_node;
