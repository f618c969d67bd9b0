// src/event.rs
//! Historical event records as stored under `events/<day key>` and the
//! tolerant decoder that turns a raw store snapshot into [`Event`]s.
//!
//! A malformed child never aborts the snapshot: it is skipped, counted and
//! reported back as a [`DecodeError`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::text::normalize_field;
use crate::year::{HistoricalYear, YearError};

/// One "on this day" event. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    /// Short headline shown in the chat bubble.
    pub title: String,
    /// Topic/category label (`event_title` in the store).
    pub event_title: String,
    /// Year as stored; see [`Event::parsed_year`].
    pub year: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popularity_rank: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl Event {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        event_title: impl Into<String>,
        year: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            event_title: event_title.into(),
            year: year.into(),
            popularity_rank: None,
            description: None,
            link: None,
        }
    }

    pub fn with_rank(mut self, rank: f64) -> Self {
        self.popularity_rank = Some(rank);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn parsed_year(&self) -> Result<HistoricalYear, YearError> {
        self.year.parse()
    }
}

/// Store field names.
pub mod fields {
    pub const ID: &str = "event_id";
    pub const EVENT_TITLE: &str = "event_title";
    pub const YEAR: &str = "event_year";
    pub const TITLE: &str = "title";
    pub const POP_RANK: &str = "event_pop_rank";
    pub const DESCRIPTION: &str = "description";
    pub const LINK: &str = "link";
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("record `{key}` is not an object")]
    NotAnObject { key: String },
    #[error("record `{key}` is missing field `{field}`")]
    MissingField { key: String, field: &'static str },
    #[error("record `{key}` field `{field}` has the wrong type (expected {expected})")]
    WrongType {
        key: String,
        field: &'static str,
        expected: &'static str,
    },
}

impl DecodeError {
    pub fn key(&self) -> &str {
        match self {
            DecodeError::NotAnObject { key }
            | DecodeError::MissingField { key, .. }
            | DecodeError::WrongType { key, .. } => key,
        }
    }
}

/// Decode one child record. `key` is the child's store key, used as the id
/// when the record has no `event_id`.
pub fn decode_record(key: &str, value: &Value) -> Result<Event, DecodeError> {
    let obj = value.as_object().ok_or_else(|| DecodeError::NotAnObject {
        key: key.to_string(),
    })?;

    // event_id was written as both a number and a string over time
    let id = match obj.get(fields::ID) {
        None | Some(Value::Null) => key.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(_) => {
            return Err(DecodeError::WrongType {
                key: key.to_string(),
                field: fields::ID,
                expected: "string or integer",
            })
        }
    };

    let title = required_str(obj, key, fields::TITLE)?;
    let event_title = required_str(obj, key, fields::EVENT_TITLE)?;
    let year = required_str(obj, key, fields::YEAR)?;

    let popularity_rank = match obj.get(fields::POP_RANK) {
        None | Some(Value::Null) => None,
        Some(v) => Some(v.as_f64().filter(|r| r.is_finite()).ok_or_else(|| {
            DecodeError::WrongType {
                key: key.to_string(),
                field: fields::POP_RANK,
                expected: "finite number",
            }
        })?),
    };

    Ok(Event {
        id,
        title: normalize_field(&title),
        event_title: normalize_field(&event_title),
        year: year.trim().to_string(),
        popularity_rank,
        description: optional_str(obj, key, fields::DESCRIPTION)?
            .map(|d| normalize_field(&d))
            .filter(|d| !d.is_empty()),
        link: optional_str(obj, key, fields::LINK)?
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty()),
    })
}

fn required_str(obj: &Map<String, Value>, key: &str, field: &'static str) -> Result<String, DecodeError> {
    optional_str(obj, key, field)?.ok_or_else(|| DecodeError::MissingField {
        key: key.to_string(),
        field,
    })
}

fn optional_str(
    obj: &Map<String, Value>,
    key: &str,
    field: &'static str,
) -> Result<Option<String>, DecodeError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(DecodeError::WrongType {
            key: key.to_string(),
            field,
            expected: "string",
        }),
    }
}

/// Result of decoding a whole `events/<day>` snapshot.
#[derive(Debug, Default)]
pub struct DecodedSnapshot {
    pub events: Vec<Event>,
    pub skipped: Vec<DecodeError>,
}

/// Decode every child of a snapshot, in snapshot order.
///
/// The store returns either an object keyed by child key or, for
/// integer-like keys, an array with `null` holes. `null` as the whole
/// snapshot means the day has no events.
pub fn decode_snapshot(snapshot: &Value) -> DecodedSnapshot {
    let children: Vec<(String, &Value)> = match snapshot {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        Value::Null => Vec::new(),
        other => vec![("<root>".to_string(), other)],
    };

    let mut out = DecodedSnapshot::default();
    for (key, value) in children {
        match decode_record(&key, value) {
            Ok(ev) => out.events.push(ev),
            Err(e) => {
                tracing::warn!(target: "feed", error = %e, "skipping malformed event record");
                out.skipped.push(e);
            }
        }
    }
    out
}
