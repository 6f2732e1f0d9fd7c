//! # Message Payload
//!
//! Messages carry their original structured document as a JSON string. Stages
//! that need more than the id parse it into a [`Payload`]. Every field is
//! optional at parse time; accessors that a stage cannot do without return a
//! [`StageError::MalformedPayload`] instead.

use crate::error::StageError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value as Json;

/// Formats tried, in order, for timestamps without an explicit offset.
const NAIVE_FORMATS: &[&str] = &[
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%d %H:%M:%S%.f",
  "%m/%d/%Y %H:%M:%S",
  "%m/%d/%Y %I:%M:%S %p",
];

/// Twitter's own timestamp layout, e.g. `Wed Mar 04 10:00:00 +0000 2015`.
const TWITTER_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Latitude and longitude as carried by the payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Coordinates {
  /// Latitude, as a number or string.
  pub latitude: Option<Json>,
  /// Longitude, as a number or string.
  pub longitude: Option<Json>,
}

/// Author of the message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Creator {
  /// Profile id.
  pub id: Option<Json>,
  /// Profile creation timestamp.
  pub created_at: Option<Json>,
  /// Screen name.
  pub screen_name: Option<String>,
  /// Follower count.
  pub followers_count: Option<Json>,
  /// Friend count.
  pub friends_count: Option<Json>,
  /// Status count.
  pub statuses_count: Option<Json>,
}

/// The structured document carried by a message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Payload {
  /// Message id.
  pub id: Option<i64>,
  /// Message text.
  pub text: Option<String>,
  /// Creation timestamp.
  pub created_at: Option<String>,
  /// Language code, e.g. `"en"`.
  pub language: Option<String>,
  /// Position the message was sent from.
  pub coordinates: Option<Coordinates>,
  /// Hashtags without the leading `#`.
  #[serde(default)]
  pub hashtags: Vec<Json>,
  /// Whether the message is a retweet.
  pub is_retweet: Option<Json>,
  /// Whether the message was retweeted.
  pub retweeted: Option<Json>,
  /// Number of retweets.
  pub retweet_count: Option<Json>,
  /// Client the message was sent from.
  pub source: Option<Json>,
  /// Author of the message.
  pub creator: Option<Creator>,
}

impl Payload {
  /// Parses a JSON payload.
  pub fn parse(raw: &str) -> Result<Self, StageError> {
    serde_json::from_str(raw).map_err(|e| StageError::MalformedPayload(e.to_string()))
  }

  /// The message text.
  pub fn text(&self) -> Result<&str, StageError> {
    self
      .text
      .as_deref()
      .ok_or_else(|| StageError::MalformedPayload("missing Text".to_string()))
  }

  /// The creation timestamp, as carried.
  pub fn created_at_raw(&self) -> Result<&str, StageError> {
    self
      .created_at
      .as_deref()
      .ok_or_else(|| StageError::MalformedPayload("missing CreatedAt".to_string()))
  }

  /// The creation timestamp in UTC.
  pub fn created_at(&self) -> Result<DateTime<Utc>, StageError> {
    parse_timestamp(self.created_at_raw()?)
  }

  /// Whether the language is English, given either as the producer's
  /// `"English"` or as the ISO code `"en"`. Absent language is not English.
  pub fn is_english(&self) -> bool {
    self
      .language
      .as_deref()
      .is_some_and(|l| l.eq_ignore_ascii_case("english") || l.eq_ignore_ascii_case("en"))
  }

  /// `"latitude,longitude"` when both halves are present.
  pub fn coordinates(&self) -> Option<String> {
    let coordinates = self.coordinates.as_ref()?;
    let latitude = json_text(coordinates.latitude.as_ref()?)?;
    let longitude = json_text(coordinates.longitude.as_ref()?)?;
    Some(format!("{},{}", latitude, longitude))
  }

  /// Hashtags as text, in payload order.
  pub fn hashtags(&self) -> Vec<String> {
    self.hashtags.iter().filter_map(json_text).collect()
  }
}

/// Renders a scalar JSON value as plain text. Objects, arrays and null have no text.
pub fn json_text(value: &Json) -> Option<String> {
  match value {
    Json::String(s) => Some(s.clone()),
    Json::Number(n) => Some(n.to_string()),
    Json::Bool(b) => Some(if *b { "True" } else { "False" }.to_string()),
    _ => None,
  }
}

/// Parses a timestamp in any of the layouts seen in payloads. Timestamps
/// without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StageError> {
  let raw = raw.trim();
  if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
    return Ok(ts.with_timezone(&Utc));
  }
  if let Ok(ts) = DateTime::parse_from_str(raw, TWITTER_FORMAT) {
    return Ok(ts.with_timezone(&Utc));
  }
  NAIVE_FORMATS
    .iter()
    .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
    .map(|naive| naive.and_utc())
    .ok_or_else(|| StageError::MalformedPayload(format!("unrecognized timestamp '{}'", raw)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{Datelike, Timelike};

  const SAMPLE: &str = r#"{
    "Id": 1,
    "Text": "hello #storm",
    "CreatedAt": "2015-03-04T10:00:00Z",
    "Language": "en",
    "Coordinates": { "Latitude": 1.5, "Longitude": "2" },
    "Hashtags": ["storm"],
    "IsRetweet": false,
    "RetweetCount": 3,
    "Creator": { "Id": 9, "ScreenName": "alice" }
  }"#;

  #[test]
  fn test_parse_sample() {
    let payload = Payload::parse(SAMPLE).unwrap();
    assert_eq!(payload.text().unwrap(), "hello #storm");
    assert!(payload.is_english());
    assert_eq!(payload.coordinates().as_deref(), Some("1.5,2"));
    assert_eq!(payload.hashtags(), vec!["storm".to_string()]);
    assert_eq!(payload.created_at().unwrap().year(), 2015);
    assert_eq!(
      payload.creator.unwrap().screen_name.as_deref(),
      Some("alice")
    );
  }

  #[test]
  fn test_language_name_and_code_are_english() {
    for language in ["English", "en", "EN"] {
      let payload = Payload::parse(&format!(r#"{{"Id":1,"Text":"hi","Language":"{}"}}"#, language)).unwrap();
      assert!(payload.is_english(), "{language}");
    }
    for language in ["French", "fr", "", "eng"] {
      let payload = Payload::parse(&format!(r#"{{"Id":1,"Text":"hi","Language":"{}"}}"#, language)).unwrap();
      assert!(!payload.is_english(), "{language}");
    }
  }

  #[test]
  fn test_missing_fields_are_errors_only_when_asked() {
    let payload = Payload::parse("{}").unwrap();
    assert!(payload.text().is_err());
    assert!(payload.created_at().is_err());
    assert!(!payload.is_english());
    assert_eq!(payload.coordinates(), None);
  }

  #[test]
  fn test_non_json_rejected() {
    assert!(matches!(
      Payload::parse("hello #storm"),
      Err(StageError::MalformedPayload(_))
    ));
  }

  #[test]
  fn test_timestamp_layouts() {
    let twitter = parse_timestamp("Wed Mar 04 10:00:00 +0000 2015").unwrap();
    assert_eq!((twitter.month(), twitter.day(), twitter.hour()), (3, 4, 10));
    let naive = parse_timestamp("2015-03-04T10:00:00").unwrap();
    assert_eq!(naive, twitter);
    let us = parse_timestamp("03/04/2015 10:00:00").unwrap();
    assert_eq!(us, twitter);
    assert!(parse_timestamp("yesterday").is_err());
  }
}
