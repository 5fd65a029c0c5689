use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// A closed set of event payloads belonging to one aggregate type.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **append-only**
/// - identified on the wire by a stable type string (e.g. `"group.member.added"`)
///
/// Implementations are enums serialized with serde's adjacent tagging
/// (`#[serde(tag = "type", content = "data")]`) where every variant is renamed to
/// its event type and wraps a payload struct. [`encode`] and [`decode`] rely on
/// that shape.
pub trait EventFamily: Serialize + DeserializeOwned + Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Aggregate type every event of this family is appended to.
    const AGGREGATE_TYPE: &'static str;

    /// Every event type of the family.
    const EVENT_TYPES: &'static [&'static str];

    /// Stable event type of this value.
    fn event_type(&self) -> &'static str;

    fn handles(event_type: &str) -> bool {
        Self::EVENT_TYPES.contains(&event_type)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("payload serialization failed for '{event_type}': {message}")]
    Serialize { event_type: String, message: String },

    #[error("payload of '{event_type}' could not be decoded: {message}")]
    Deserialize { event_type: String, message: String },
}

/// Payload of `event` as stored (the variant's `data`).
pub fn encode<E: EventFamily>(event: &E) -> Result<JsonValue, CodecError> {
    let event_type = event.event_type();
    let mut value = serde_json::to_value(event).map_err(|e| CodecError::Serialize {
        event_type: event_type.to_string(),
        message: e.to_string(),
    })?;

    match value.get_mut("data") {
        Some(data) => Ok(data.take()),
        None => Err(CodecError::Serialize {
            event_type: event_type.to_string(),
            message: "family is not adjacently tagged".to_string(),
        }),
    }
}

/// Rebuild a typed event from its stored form.
///
/// Returns `Ok(None)` for event types the family does not know; callers treat
/// those as irrelevant rather than as corruption.
pub fn decode<E: EventFamily>(event_type: &str, payload: &JsonValue) -> Result<Option<E>, CodecError> {
    if !E::handles(event_type) {
        return Ok(None);
    }

    let tagged = serde_json::json!({ "type": event_type, "data": payload });
    serde_json::from_value(tagged)
        .map(Some)
        .map_err(|e| CodecError::Deserialize {
            event_type: event_type.to_string(),
            message: e.to_string(),
        })
}
