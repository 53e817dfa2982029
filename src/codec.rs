//! Message codec and validation
//!
//! Wire envelopes are JSON objects of the shape
//! `{"type": "<kind>", "timestamp": "<ISO-8601>", ...}`. Decoding enforces
//! the minimal shape contract and an optional caller-supplied validator;
//! kind-specific fields are carried through untouched.

use crate::error::DecodeError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Message kinds synthesized by the server itself; they never arrive over
/// the wire.
pub mod kind {
    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
    pub const ERROR: &str = "error";
}

/// Validator predicate run against the parsed payload after the structural
/// decode succeeded.
pub type Validator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// A decoded message: routing discriminant, timestamp and whatever
/// kind-specific fields came with it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Envelope {
    /// Create an envelope of the given kind, timestamped now.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            timestamp: Utc::now(),
            fields: Map::new(),
        }
    }

    /// Attach a kind-specific field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Outbound error envelope: `{"type":"error","timestamp",...,"message"}`.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(kind::ERROR).with_field("message", message.into())
    }

    /// Serialize to the wire representation.
    pub fn to_wire(&self) -> String {
        // Envelope contains only JSON-representable data, so serialization
        // cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Parses raw frames into [`Envelope`]s, enforcing the shape contract and
/// the configured validator.
#[derive(Clone, Default)]
pub struct MessageCodec {
    validator: Option<Validator>,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self { validator: None }
    }

    pub fn with_validator(validator: Option<Validator>) -> Self {
        Self { validator }
    }

    /// Decode a raw frame.
    ///
    /// Fails with [`DecodeError::MalformedPayload`] for unparseable bytes
    /// and [`DecodeError::MissingKind`] when the parsed value has no string
    /// `type` field (non-object payloads included). A missing or
    /// unparseable timestamp defaults to receipt time.
    pub fn decode(&self, payload: &[u8]) -> Result<Envelope, DecodeError> {
        let value: Value =
            serde_json::from_slice(payload).map_err(|_| DecodeError::MalformedPayload)?;

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingKind)?
            .to_owned();

        if let Some(validator) = &self.validator {
            if !validator(&value) {
                return Err(DecodeError::ValidationRejected);
            }
        }

        let timestamp = value
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|parsed| parsed.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        let mut fields = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        fields.remove("type");
        fields.remove("timestamp");

        Ok(Envelope {
            kind,
            timestamp,
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn decode_valid_envelope() {
        let codec = MessageCodec::new();
        let envelope = codec
            .decode(br#"{"type":"chat","timestamp":"2026-08-28T12:00:00Z","body":"hi"}"#)
            .unwrap();

        assert_eq!(envelope.kind, "chat");
        assert_eq!(envelope.timestamp.to_rfc3339(), "2026-08-28T12:00:00+00:00");
        assert_eq!(envelope.fields.get("body").unwrap(), "hi");
        assert!(!envelope.fields.contains_key("type"));
    }

    #[test]
    fn decode_non_json_is_malformed() {
        let codec = MessageCodec::new();
        assert_eq!(
            codec.decode(b"not json at all").unwrap_err(),
            DecodeError::MalformedPayload
        );
    }

    #[test]
    fn decode_empty_object_is_missing_kind() {
        let codec = MessageCodec::new();
        assert_eq!(codec.decode(b"{}").unwrap_err(), DecodeError::MissingKind);
    }

    #[test]
    fn decode_non_object_is_missing_kind() {
        let codec = MessageCodec::new();
        assert_eq!(codec.decode(b"42").unwrap_err(), DecodeError::MissingKind);
        assert_eq!(codec.decode(b"[1,2]").unwrap_err(), DecodeError::MissingKind);
        assert_eq!(codec.decode(b"null").unwrap_err(), DecodeError::MissingKind);
    }

    #[test]
    fn decode_defaults_missing_timestamp() {
        let codec = MessageCodec::new();
        let before = Utc::now();
        let envelope = codec.decode(br#"{"type":"chat"}"#).unwrap();
        assert!(envelope.timestamp >= before && envelope.timestamp <= Utc::now());
    }

    #[test]
    fn decode_defaults_unparseable_timestamp() {
        let codec = MessageCodec::new();
        let before = Utc::now();
        let envelope = codec
            .decode(br#"{"type":"chat","timestamp":"yesterday-ish"}"#)
            .unwrap();
        assert!(envelope.timestamp >= before && envelope.timestamp <= Utc::now());
    }

    #[test]
    fn validator_rejection() {
        let codec = MessageCodec::with_validator(Some(Arc::new(|value| {
            value.get("body").is_some()
        })));

        assert_eq!(
            codec.decode(br#"{"type":"chat"}"#).unwrap_err(),
            DecodeError::ValidationRejected
        );
        assert!(codec.decode(br#"{"type":"chat","body":"ok"}"#).is_ok());
    }

    #[test]
    fn error_envelope_wire_shape() {
        let wire = Envelope::error("Invalid JSON format").to_wire();
        let value: serde_json::Value = serde_json::from_str(&wire).unwrap();

        assert_eq!(value["type"], "error");
        assert_eq!(value["message"], "Invalid JSON format");
        assert!(value["timestamp"].is_string());
    }
}
