//! # Stream Contracts
//!
//! Each stream carries messages with a fixed field order. The record types
//! here are the typed view of those fields: [`StreamRecord::into_fields`]
//! lays a record out in stream order and [`StreamRecord::from_fields`] reads
//! it back, rejecting messages whose fields are missing or mistyped.
//!
//! | Stream      | Fields                                                                                    |
//! |-------------|-------------------------------------------------------------------------------------------|
//! | `default`   | id, payload                                                                               |
//! | `sentiment` | id, payload, label                                                                        |
//! | `geography` | id, coordinates, admin district, admin district 2, country/region, locality, postal code |
//! | `joined`    | id, coordinates, payload, geography (5), label                                            |
//! | `archive`   | id, created date, coordinates, payload, geography (5), sentiment, swear word count        |
//! | `topic`     | id, created date, coordinates, topic, geography (5), sentiment, vulgar                    |
//! | `trending`  | rank, key, count                                                                          |

use crate::error::StageError;
use crate::message::{Anchor, Fields, Message, Value, streams};

/// A typed record with a fixed field layout on one stream.
pub trait StreamRecord: Sized {
  /// Stream the record is emitted on.
  const STREAM: &'static str;

  /// Lays the record out in stream order.
  fn into_fields(self) -> Fields;

  /// Reads the record from stream-ordered fields.
  fn from_fields(fields: &[Value]) -> Result<Self, StageError>;

  /// Reads the record from a message.
  fn from_message(message: &Message) -> Result<Self, StageError> {
    Self::from_fields(message.fields())
  }

  /// Builds an unanchored message on the record's stream.
  fn into_message(self) -> Message {
    Message::new(Self::STREAM, self.into_fields())
  }

  /// Builds a message on the record's stream carrying `anchors`.
  fn into_anchored(self, anchors: Vec<Anchor>) -> Message {
    Message::anchored(Self::STREAM, self.into_fields(), anchors)
  }
}

struct FieldReader<'a> {
  stream: &'static str,
  fields: &'a [Value],
}

impl<'a> FieldReader<'a> {
  fn new(stream: &'static str, fields: &'a [Value]) -> Self {
    Self { stream, fields }
  }

  fn value(&self, index: usize) -> Result<&'a Value, StageError> {
    self.fields.get(index).ok_or_else(|| StageError::MissingField {
      stream: self.stream.to_string(),
      index,
    })
  }

  fn type_error(&self, index: usize, expected: &'static str) -> StageError {
    StageError::FieldType {
      stream: self.stream.to_string(),
      index,
      expected,
    }
  }

  fn int(&self, index: usize) -> Result<i64, StageError> {
    self
      .value(index)?
      .as_i64()
      .ok_or_else(|| self.type_error(index, "an integer"))
  }

  fn string(&self, index: usize) -> Result<String, StageError> {
    self
      .value(index)?
      .as_str()
      .map(str::to_string)
      .ok_or_else(|| self.type_error(index, "a string"))
  }

  fn opt_string(&self, index: usize) -> Result<Option<String>, StageError> {
    match self.value(index)? {
      Value::Null => Ok(None),
      Value::Str(s) => Ok(Some(s.clone())),
      _ => Err(self.type_error(index, "a string or null")),
    }
  }

  fn boolean(&self, index: usize) -> Result<bool, StageError> {
    self
      .value(index)?
      .as_bool()
      .ok_or_else(|| self.type_error(index, "a boolean"))
  }

  /// The five place fields, starting at `index`.
  fn place(&self, index: usize) -> Result<Place, StageError> {
    Ok(Place {
      admin_district: self.opt_string(index)?,
      admin_district2: self.opt_string(index + 1)?,
      country_region: self.opt_string(index + 2)?,
      locality: self.opt_string(index + 3)?,
      postal_code: self.opt_string(index + 4)?,
    })
  }
}

/// Administrative place names resolved for a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Place {
  /// First-level administrative district.
  pub admin_district: Option<String>,
  /// Second-level administrative district.
  pub admin_district2: Option<String>,
  /// Country or region.
  pub country_region: Option<String>,
  /// Locality or city.
  pub locality: Option<String>,
  /// Postal code.
  pub postal_code: Option<String>,
}

impl Place {
  fn push_fields(self, fields: &mut Fields) {
    fields.push(self.admin_district.into());
    fields.push(self.admin_district2.into());
    fields.push(self.country_region.into());
    fields.push(self.locality.into());
    fields.push(self.postal_code.into());
  }
}

/// Coordinates and place names resolved for a message. All fields are
/// absent when the lookup failed or the message carried no coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Geography {
  /// `"latitude,longitude"`, as carried by the payload.
  pub coordinates: Option<String>,
  /// Place names.
  pub place: Place,
}

/// A raw delivery from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRecord {
  /// Message id.
  pub id: i64,
  /// Serialized payload.
  pub payload: String,
}

impl StreamRecord for InboundRecord {
  const STREAM: &'static str = streams::DEFAULT;

  fn into_fields(self) -> Fields {
    vec![Value::Int(self.id), Value::Str(self.payload)]
  }

  fn from_fields(fields: &[Value]) -> Result<Self, StageError> {
    let r = FieldReader::new(Self::STREAM, fields);
    Ok(Self {
      id: r.int(0)?,
      payload: r.string(1)?,
    })
  }
}

/// A message labelled with its sentiment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentimentRecord {
  /// Message id.
  pub id: i64,
  /// Serialized payload.
  pub payload: String,
  /// Sentiment label.
  pub label: String,
}

impl StreamRecord for SentimentRecord {
  const STREAM: &'static str = streams::SENTIMENT;

  fn into_fields(self) -> Fields {
    vec![
      Value::Int(self.id),
      Value::Str(self.payload),
      Value::Str(self.label),
    ]
  }

  fn from_fields(fields: &[Value]) -> Result<Self, StageError> {
    let r = FieldReader::new(Self::STREAM, fields);
    Ok(Self {
      id: r.int(0)?,
      payload: r.string(1)?,
      label: r.string(2)?,
    })
  }
}

/// A message's resolved geography.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeographyRecord {
  /// Message id.
  pub id: i64,
  /// Resolved geography.
  pub geography: Geography,
}

impl StreamRecord for GeographyRecord {
  const STREAM: &'static str = streams::GEOGRAPHY;

  fn into_fields(self) -> Fields {
    let mut fields = vec![Value::Int(self.id), self.geography.coordinates.into()];
    self.geography.place.push_fields(&mut fields);
    fields
  }

  fn from_fields(fields: &[Value]) -> Result<Self, StageError> {
    let r = FieldReader::new(Self::STREAM, fields);
    Ok(Self {
      id: r.int(0)?,
      geography: Geography {
        coordinates: r.opt_string(1)?,
        place: r.place(2)?,
      },
    })
  }
}

/// Sentiment and geography joined for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedRecord {
  /// Message id.
  pub id: i64,
  /// Serialized payload.
  pub payload: String,
  /// Resolved geography.
  pub geography: Geography,
  /// Sentiment label.
  pub label: String,
}

impl StreamRecord for JoinedRecord {
  const STREAM: &'static str = streams::JOINED;

  fn into_fields(self) -> Fields {
    let mut fields = vec![
      Value::Int(self.id),
      self.geography.coordinates.into(),
      Value::Str(self.payload),
    ];
    self.geography.place.push_fields(&mut fields);
    fields.push(Value::Str(self.label));
    fields
  }

  fn from_fields(fields: &[Value]) -> Result<Self, StageError> {
    let r = FieldReader::new(Self::STREAM, fields);
    Ok(Self {
      id: r.int(0)?,
      geography: Geography {
        coordinates: r.opt_string(1)?,
        place: r.place(3)?,
      },
      payload: r.string(2)?,
      label: r.string(8)?,
    })
  }
}

/// A fully classified message bound for the archive table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRecord {
  /// Message id.
  pub id: i64,
  /// Creation timestamp, as carried by the payload.
  pub created_date: String,
  /// Serialized payload.
  pub payload: String,
  /// Resolved geography.
  pub geography: Geography,
  /// Sentiment label.
  pub sentiment: String,
  /// Number of dictionary words found.
  pub swear_word_count: i64,
}

impl StreamRecord for ArchiveRecord {
  const STREAM: &'static str = streams::ARCHIVE;

  fn into_fields(self) -> Fields {
    let mut fields = vec![
      Value::Int(self.id),
      Value::Str(self.created_date),
      self.geography.coordinates.into(),
      Value::Str(self.payload),
    ];
    self.geography.place.push_fields(&mut fields);
    fields.push(Value::Str(self.sentiment));
    fields.push(Value::Int(self.swear_word_count));
    fields
  }

  fn from_fields(fields: &[Value]) -> Result<Self, StageError> {
    let r = FieldReader::new(Self::STREAM, fields);
    Ok(Self {
      id: r.int(0)?,
      created_date: r.string(1)?,
      geography: Geography {
        coordinates: r.opt_string(2)?,
        place: r.place(4)?,
      },
      payload: r.string(3)?,
      sentiment: r.string(9)?,
      swear_word_count: r.int(10)?,
    })
  }
}

/// One topic extracted from a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRecord {
  /// Message id.
  pub id: i64,
  /// Creation timestamp, as carried by the payload.
  pub created_date: String,
  /// The topic word or word pair.
  pub topic: String,
  /// Resolved geography.
  pub geography: Geography,
  /// Sentiment label.
  pub sentiment: String,
  /// Whether the message contained any dictionary word.
  pub vulgar: bool,
}

impl StreamRecord for TopicRecord {
  const STREAM: &'static str = streams::TOPIC;

  fn into_fields(self) -> Fields {
    let mut fields = vec![
      Value::Int(self.id),
      Value::Str(self.created_date),
      self.geography.coordinates.into(),
      Value::Str(self.topic),
    ];
    self.geography.place.push_fields(&mut fields);
    fields.push(Value::Str(self.sentiment));
    fields.push(Value::Bool(self.vulgar));
    fields
  }

  fn from_fields(fields: &[Value]) -> Result<Self, StageError> {
    let r = FieldReader::new(Self::STREAM, fields);
    Ok(Self {
      id: r.int(0)?,
      created_date: r.string(1)?,
      geography: Geography {
        coordinates: r.opt_string(2)?,
        place: r.place(4)?,
      },
      topic: r.string(3)?,
      sentiment: r.string(9)?,
      vulgar: r.boolean(10)?,
    })
  }
}

/// One ranked entry of a trending snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrendingRecord {
  /// 1-based rank.
  pub rank: i64,
  /// The trending key.
  pub key: String,
  /// Count over the window.
  pub count: i64,
}

impl StreamRecord for TrendingRecord {
  const STREAM: &'static str = streams::TRENDING;

  fn into_fields(self) -> Fields {
    vec![
      Value::Int(self.rank),
      Value::Str(self.key),
      Value::Int(self.count),
    ]
  }

  fn from_fields(fields: &[Value]) -> Result<Self, StageError> {
    let r = FieldReader::new(Self::STREAM, fields);
    Ok(Self {
      rank: r.int(0)?,
      key: r.string(1)?,
      count: r.int(2)?,
    })
  }
}

/// Reads the integer id in field 0, whatever the stream.
pub fn record_id(message: &Message) -> Option<i64> {
  message.field(0).and_then(Value::as_i64)
}
