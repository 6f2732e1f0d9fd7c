//! # Error Types
//!
//! One error enum per concern. Construction-time problems ([`ConfigError`],
//! [`WindowError`]) are fatal; everything raised while a message is in flight
//! ([`StageError`], [`EnrichError`], [`SinkError`]) resolves to a degraded
//! record or an ack/fail settlement and never stops the process.

use std::path::PathBuf;
use thiserror::Error;

/// Invalid or unreadable pipeline configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
  /// A value is out of its allowed range.
  #[error("invalid configuration: {0}")]
  Invalid(String),
  /// The configuration file could not be read.
  #[error("failed to read configuration file {path}: {source}")]
  Io {
    /// File that was being read.
    path: PathBuf,
    /// Underlying I/O error.
    #[source]
    source: std::io::Error,
  },
  /// The configuration document is not valid JSON for the schema.
  #[error("failed to parse configuration: {0}")]
  Parse(#[from] serde_json::Error),
}

/// Invalid sliding-window construction parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
  /// Windows need at least two slots so the head and tail never coincide.
  #[error("window length must be at least 2, got {0}")]
  InvalidLength(usize),
  /// A slot counter needs at least one slot.
  #[error("slot counter needs at least one slot")]
  NoSlots,
}

/// Errors raised by a source adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
  /// The source will not deliver any more messages.
  #[error("source closed")]
  Closed,
  /// The transport failed; the caller should back off and retry.
  #[error("transport error: {0}")]
  Transport(String),
}

/// Errors raised by an enrichment lookup. Always recovered locally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrichError {
  /// The lookup service could not be reached or declined to answer.
  #[error("enrichment unavailable: {0}")]
  Unavailable(String),
  /// The lookup did not answer in time.
  #[error("enrichment timed out")]
  Timeout,
  /// The lookup answered with something that could not be interpreted.
  #[error("bad enrichment response: {0}")]
  BadResponse(String),
}

/// Errors raised by a durable sink.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
  /// The write did not complete. It may have been partially applied.
  #[error("sink write failed: {0}")]
  Write(String),
}

/// A message could not be processed by a stage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
  /// A required field is absent.
  #[error("stream '{stream}' has no field at index {index}")]
  MissingField {
    /// Stream the message arrived on.
    stream: String,
    /// Position of the missing field.
    index: usize,
  },
  /// A field holds a value of the wrong type.
  #[error("field {index} on stream '{stream}' is not {expected}")]
  FieldType {
    /// Stream the message arrived on.
    stream: String,
    /// Position of the offending field.
    index: usize,
    /// Name of the type the stage expected.
    expected: &'static str,
  },
  /// The structured payload could not be parsed.
  #[error("malformed payload: {0}")]
  MalformedPayload(String),
  /// The stage does not consume this stream.
  #[error("unexpected stream '{0}'")]
  UnexpectedStream(String),
}

/// Errors raised while assembling a pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
  /// The configuration was rejected.
  #[error(transparent)]
  Config(#[from] ConfigError),
  /// The graph could not be wired.
  #[error("graph wiring failed: {0}")]
  Graph(String),
}
