//! # Pipeline Stages
//!
//! The [`Stage`](crate::stage::Stage) implementations the social-media
//! pipeline is built from, in flow order:
//!
//! - [`blob_writer_stage`]: archives raw payloads
//! - [`enrich_stage`]: sentiment and geography lookups
//! - [`merge_stage`]: joins both enrichments per message
//! - [`classify_stage`]: topics and profanity count
//! - [`trending_stage`]: windowed topic ranking
//! - [`batch_sink_stage`]: batched table writes

pub mod batch_sink_stage;
pub mod blob_writer_stage;
pub mod classify_stage;
pub mod enrich_stage;
pub mod merge_stage;
pub mod trending_stage;
