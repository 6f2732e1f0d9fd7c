//! # Enrichment Ports
//!
//! Enrichment stages call out to external lookups through two ports:
//! [`SentimentPort`] labels a payload, [`GeographyPort`] resolves where it was
//! sent from. A port error never fails the message; the stage falls back to
//! [`UNKNOWN_LABEL`] or empty geography and carries on.
//!
//! Closures implement both ports directly, which is how tests and local runs
//! plug in fixed answers. [`TextSentiment`] and [`CoordinateGeography`] adapt
//! lower-level services (a polarity scorer over the message text, a reverse
//! geocoder over its coordinates) to the payload-level ports.

use crate::error::EnrichError;
use crate::payload::Payload;
use crate::records::{Geography, Place};
use async_trait::async_trait;

/// Label used when sentiment cannot be determined.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Sentiment polarity as scored by a polarity service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
  /// Score 0.
  Negative,
  /// Score 2.
  Neutral,
  /// Score 4.
  Positive,
  /// Any other score.
  Unknown,
}

impl Polarity {
  /// Maps a polarity score to its polarity.
  pub fn from_score(score: i64) -> Self {
    match score {
      0 => Polarity::Negative,
      2 => Polarity::Neutral,
      4 => Polarity::Positive,
      _ => Polarity::Unknown,
    }
  }

  /// Label emitted on the sentiment stream.
  pub fn label(&self) -> &'static str {
    match self {
      Polarity::Negative => "Negative",
      Polarity::Neutral => "Neutral",
      Polarity::Positive => "Positive",
      Polarity::Unknown => UNKNOWN_LABEL,
    }
  }
}

/// Labels the sentiment of a payload.
#[async_trait]
pub trait SentimentPort: Send + Sync {
  /// Returns the sentiment label for `payload`.
  async fn lookup(&self, payload: &str) -> Result<String, EnrichError>;
}

/// Resolves the geography of a payload.
#[async_trait]
pub trait GeographyPort: Send + Sync {
  /// Returns the geography for `payload`.
  async fn lookup(&self, payload: &str) -> Result<Geography, EnrichError>;
}

#[async_trait]
impl<F> SentimentPort for F
where
  F: Fn(&str) -> Result<String, EnrichError> + Send + Sync,
{
  async fn lookup(&self, payload: &str) -> Result<String, EnrichError> {
    self(payload)
  }
}

#[async_trait]
impl<F> GeographyPort for F
where
  F: Fn(&str) -> Result<Geography, EnrichError> + Send + Sync,
{
  async fn lookup(&self, payload: &str) -> Result<Geography, EnrichError> {
    self(payload)
  }
}

/// Scores the polarity of a text.
#[async_trait]
pub trait PolarityScorer: Send + Sync {
  /// Returns the raw polarity score for `text`.
  async fn score(&self, text: &str) -> Result<i64, EnrichError>;
}

/// Resolves place names for `"latitude,longitude"` coordinates.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
  /// Returns the place at `coordinates`.
  async fn resolve(&self, coordinates: &str) -> Result<Place, EnrichError>;
}

/// [`SentimentPort`] that scores the payload text with a [`PolarityScorer`].
pub struct TextSentiment<S> {
  scorer: S,
}

impl<S: PolarityScorer> TextSentiment<S> {
  /// Wraps a scorer.
  pub fn new(scorer: S) -> Self {
    Self { scorer }
  }
}

#[async_trait]
impl<S: PolarityScorer> SentimentPort for TextSentiment<S> {
  async fn lookup(&self, payload: &str) -> Result<String, EnrichError> {
    let parsed = Payload::parse(payload).map_err(|e| EnrichError::BadResponse(e.to_string()))?;
    let text = parsed
      .text()
      .map_err(|e| EnrichError::BadResponse(e.to_string()))?;
    let score = self.scorer.score(text).await?;
    Ok(Polarity::from_score(score).label().to_string())
  }
}

/// [`GeographyPort`] that reverse-geocodes the payload coordinates.
///
/// A payload without coordinates resolves to empty geography without
/// calling the geocoder.
pub struct CoordinateGeography<G> {
  geocoder: G,
}

impl<G: ReverseGeocoder> CoordinateGeography<G> {
  /// Wraps a geocoder.
  pub fn new(geocoder: G) -> Self {
    Self { geocoder }
  }
}

#[async_trait]
impl<G: ReverseGeocoder> GeographyPort for CoordinateGeography<G> {
  async fn lookup(&self, payload: &str) -> Result<Geography, EnrichError> {
    let parsed = Payload::parse(payload).map_err(|e| EnrichError::BadResponse(e.to_string()))?;
    let Some(coordinates) = parsed.coordinates() else {
      return Ok(Geography::default());
    };
    let place = self.geocoder.resolve(&coordinates).await?;
    Ok(Geography {
      coordinates: Some(coordinates),
      place,
    })
  }
}
