//! Interpretation of one framed line of a search stream.
//!
//! Records look like `data: {json}`. The payload is classified by the fields
//! it carries, checked in this order: `error`, `done`, `title`. A field only
//! counts when it is "set" (not null, false, zero or an empty string).

use serde_json::Value;

use crate::api::SearchResult;

/// Prefix that marks a data record.
pub const DATA_PREFIX: &str = "data: ";

/// A tagged event produced from a data record. Consumed once, never retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Result(SearchResult),
    Done,
    Error { message: String },
}

impl StreamEvent {
    /// Done and Error end the session.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Result(_))
    }
}

/// Classification of a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedRecord {
    Event(StreamEvent),
    /// Blank line, comment, non-data line, or a payload with no known field.
    Ignorable,
    /// Data record whose payload could not be read; skipped by the ingestor.
    Malformed { reason: String },
}

/// Classifies `line`. Pure: the same line always yields the same record.
#[must_use]
pub fn parse_record(line: &str) -> ParsedRecord {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return ParsedRecord::Ignorable;
    };

    let value: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(error) => {
            return ParsedRecord::Malformed {
                reason: format!("invalid JSON: {error}"),
            };
        }
    };

    let Value::Object(fields) = &value else {
        return ParsedRecord::Ignorable;
    };

    if let Some(error) = fields.get("error").filter(|v| is_set(v)) {
        let message = match error {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        return ParsedRecord::Event(StreamEvent::Error { message });
    }

    if fields.get("done").is_some_and(is_set) {
        return ParsedRecord::Event(StreamEvent::Done);
    }

    if fields.get("title").is_some_and(is_set) {
        return match serde_json::from_value::<SearchResult>(value) {
            Ok(result) => ParsedRecord::Event(StreamEvent::Result(result)),
            Err(error) => ParsedRecord::Malformed {
                reason: format!("unreadable result record: {error}"),
            },
        };
    }

    ParsedRecord::Ignorable
}

fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
