//! Tests for stream field layouts.

use crate::error::StageError;
use crate::message::{Message, Value, streams};
use crate::records::{
  Geography, GeographyRecord, InboundRecord, JoinedRecord, Place, SentimentRecord, StreamRecord,
  TopicRecord, record_id,
};

fn geography() -> Geography {
  Geography {
    coordinates: Some("1,2".to_string()),
    place: Place {
      locality: Some("X".to_string()),
      ..Place::default()
    },
  }
}

#[test]
fn test_joined_field_order() {
  let fields = JoinedRecord {
    id: 1,
    payload: "hello #storm".to_string(),
    geography: geography(),
    label: "positive".to_string(),
  }
  .into_fields();

  assert_eq!(fields.len(), 9);
  assert_eq!(fields[0], Value::Int(1));
  assert_eq!(fields[1], Value::from("1,2"));
  assert_eq!(fields[2], Value::from("hello #storm"));
  assert_eq!(fields[3], Value::Null);
  assert_eq!(fields[6], Value::from("X"));
  assert_eq!(fields[8], Value::from("positive"));
}

#[test]
fn test_geography_with_null_fields_reads_back() {
  let message = GeographyRecord {
    id: 4,
    geography: Geography::default(),
  }
  .into_message();
  assert_eq!(message.stream(), streams::GEOGRAPHY);
  let record = GeographyRecord::from_message(&message).unwrap();
  assert_eq!(record.geography, Geography::default());
}

#[test]
fn test_missing_field_rejected() {
  let message = Message::new(streams::SENTIMENT, vec![Value::Int(1), Value::from("p")]);
  assert_eq!(
    SentimentRecord::from_message(&message).unwrap_err(),
    StageError::MissingField {
      stream: streams::SENTIMENT.to_string(),
      index: 2,
    }
  );
}

#[test]
fn test_mistyped_field_rejected() {
  let fields = vec![Value::from("not an id"), Value::from("payload")];
  assert!(matches!(
    InboundRecord::from_fields(&fields),
    Err(StageError::FieldType { index: 0, .. })
  ));
}

#[test]
fn test_topic_vulgar_flag_is_boolean() {
  let record = TopicRecord {
    id: 9,
    created_date: "2015-03-04".to_string(),
    topic: "storm".to_string(),
    geography: geography(),
    sentiment: "Positive".to_string(),
    vulgar: true,
  };
  let fields = record.clone().into_fields();
  assert_eq!(fields[10], Value::Bool(true));
  assert_eq!(TopicRecord::from_fields(&fields).unwrap(), record);
}

#[test]
fn test_record_id_reads_field_zero() {
  let message = InboundRecord {
    id: 42,
    payload: "{}".to_string(),
  }
  .into_message();
  assert_eq!(record_id(&message), Some(42));
  assert_eq!(record_id(&Message::tick()), None);
}
