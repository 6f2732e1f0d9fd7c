//! # Pipeline Configuration
//!
//! Every tunable of the pipeline lives in [`PipelineConfig`]. Values missing
//! from a configuration document fall back to [`Default`], and
//! [`PipelineConfig::validate`] is run by every loader so an invalid pipeline
//! is rejected before any node starts.
//!
//! ```rust
//! use stormweave::config::PipelineConfig;
//!
//! let config = PipelineConfig::from_json_str(r#"{ "window_slots": 12 }"#).unwrap();
//! assert_eq!(config.window_slots, 12);
//! assert_eq!(config.batch_threshold, 500);
//! ```

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Configuration for a full pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  /// Track lineage and settle deliveries with the source. When false the
  /// source acknowledges on receipt and failures are only reported.
  pub enable_ack: bool,
  /// Maximum number of source deliveries awaiting settlement.
  pub max_pending: usize,
  /// How long a single source receive may wait for a message.
  pub receive_timeout_secs: u64,
  /// Pause after an empty receive.
  pub idle_backoff_ms: u64,
  /// Pause between polls while the pending ceiling is exceeded.
  pub pending_backoff_ms: u64,
  /// Period of the tick that rotates windows and flushes batches.
  pub tick_interval_secs: u64,
  /// Number of slots in the trending window.
  pub window_slots: usize,
  /// Number of entries emitted per trending snapshot.
  pub trending_top_n: usize,
  /// Queue length above which a batch sink flushes immediately.
  pub batch_threshold: usize,
  /// Age after which an incomplete join record is evicted.
  pub join_ttl_secs: Option<u64>,
  /// Maximum number of incomplete join records per merge instance.
  pub join_capacity: Option<usize>,
  /// Number of parallel merge instances.
  pub join_parallelism: usize,
  /// Capacity of every inter-node channel.
  pub channel_capacity: usize,
  /// Drop (and acknowledge) deliveries whose language is not English.
  pub english_only: bool,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      enable_ack: true,
      max_pending: 100,
      receive_timeout_secs: 5,
      idle_backoff_ms: 1000,
      pending_backoff_ms: 50,
      tick_interval_secs: 300,
      window_slots: 5,
      trending_top_n: 50,
      batch_threshold: 500,
      join_ttl_secs: None,
      join_capacity: None,
      join_parallelism: 1,
      channel_capacity: 64,
      english_only: true,
    }
  }
}

impl PipelineConfig {
  /// Parses a JSON document, filling missing fields with defaults, and validates it.
  pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
    let config: Self = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
  }

  /// Reads and parses a JSON configuration file.
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_json_str(&contents)
  }

  /// Checks every value against its allowed range.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.max_pending == 0 {
      return Err(ConfigError::Invalid("max_pending must be > 0".to_string()));
    }
    if self.tick_interval_secs == 0 {
      return Err(ConfigError::Invalid(
        "tick_interval_secs must be > 0".to_string(),
      ));
    }
    if self.window_slots < 2 {
      return Err(ConfigError::Invalid(format!(
        "window_slots must be >= 2, got {}",
        self.window_slots
      )));
    }
    if self.trending_top_n == 0 {
      return Err(ConfigError::Invalid(
        "trending_top_n must be > 0".to_string(),
      ));
    }
    if self.join_parallelism == 0 {
      return Err(ConfigError::Invalid(
        "join_parallelism must be > 0".to_string(),
      ));
    }
    if self.channel_capacity == 0 {
      return Err(ConfigError::Invalid(
        "channel_capacity must be > 0".to_string(),
      ));
    }
    if self.join_capacity == Some(0) {
      return Err(ConfigError::Invalid(
        "join_capacity must be > 0 when set".to_string(),
      ));
    }
    if self.join_ttl_secs == Some(0) {
      return Err(ConfigError::Invalid(
        "join_ttl_secs must be > 0 when set".to_string(),
      ));
    }
    Ok(())
  }

  /// Tick period as a [`Duration`].
  pub fn tick_interval(&self) -> Duration {
    Duration::from_secs(self.tick_interval_secs)
  }

  /// Source receive timeout as a [`Duration`].
  pub fn receive_timeout(&self) -> Duration {
    Duration::from_secs(self.receive_timeout_secs)
  }

  /// Empty-receive backoff as a [`Duration`].
  pub fn idle_backoff(&self) -> Duration {
    Duration::from_millis(self.idle_backoff_ms)
  }

  /// Pending-ceiling backoff as a [`Duration`].
  pub fn pending_backoff(&self) -> Duration {
    Duration::from_millis(self.pending_backoff_ms)
  }

  /// Join record time-to-live, if eviction by age is enabled.
  pub fn join_ttl(&self) -> Option<Duration> {
    self.join_ttl_secs.map(Duration::from_secs)
  }
}
