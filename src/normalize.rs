//! Response normalization.
//!
//! The Agencii backend has returned the session identifier and the reply text
//! under different keys over time. [`normalize`] maps every item onto one
//! canonical record:
//!
//! | Canonical | Candidate keys, first present wins |
//! |---|---|
//! | `sessionId` | `sessionId`, `chatId`, `id`, `chat_id` |
//! | `text` | `text`, `response`, `content`, `message` |
//!
//! `response` is always emitted with the same value as `text`. A key counts as
//! present whenever it exists in the object, whatever its value (`""`, `null`,
//! `false` included). All other backend fields are dropped.

use serde::{ser::SerializeMap, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::errors::Result;

/// Candidate keys for the session identifier, in priority order.
pub const SESSION_ID_KEYS: [&str; 4] = ["sessionId", "chatId", "id", "chat_id"];

/// Candidate keys for the reply text, in priority order.
pub const TEXT_KEYS: [&str; 4] = ["text", "response", "content", "message"];

/// Canonical output field for the session identifier.
pub const SESSION_ID_FIELD: &str = "sessionId";
/// Canonical output field for the reply text.
pub const TEXT_FIELD: &str = "text";
/// Backward-compatible alias of [`TEXT_FIELD`].
pub const RESPONSE_ALIAS: &str = "response";

/// A response item mapped onto the canonical schema.
///
/// The text is stored once; `response` is derived from it, so the two can
/// never disagree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedItem {
    text: Option<Value>,
    session_id: Option<Value>,
}

impl NormalizedItem {
    pub fn new(text: Option<Value>, session_id: Option<Value>) -> Self {
        Self { text, session_id }
    }

    pub fn text(&self) -> Option<&Value> {
        self.text.as_ref()
    }

    /// Alias of [`NormalizedItem::text`].
    pub fn response(&self) -> Option<&Value> {
        self.text.as_ref()
    }

    pub fn session_id(&self) -> Option<&Value> {
        self.session_id.as_ref()
    }

    /// Reply text when the backend sent it as a string.
    pub fn text_str(&self) -> Option<&str> {
        self.text.as_ref().and_then(Value::as_str)
    }

    /// Session identifier when the backend sent it as a string.
    pub fn session_id_str(&self) -> Option<&str> {
        self.session_id.as_ref().and_then(Value::as_str)
    }

    /// Canonical JSON object: `text`, `response`, `sessionId`, absent fields omitted.
    pub fn to_json(&self) -> Map<String, Value> {
        let mut out = Map::new();
        if let Some(text) = &self.text {
            out.insert(TEXT_FIELD.to_string(), text.clone());
            out.insert(RESPONSE_ALIAS.to_string(), text.clone());
        }
        if let Some(id) = &self.session_id {
            out.insert(SESSION_ID_FIELD.to_string(), id.clone());
        }
        out
    }
}

impl Serialize for NormalizedItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = 2 * usize::from(self.text.is_some()) + usize::from(self.session_id.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        if let Some(text) = &self.text {
            map.serialize_entry(TEXT_FIELD, text)?;
            map.serialize_entry(RESPONSE_ALIAS, text)?;
        }
        if let Some(id) = &self.session_id {
            map.serialize_entry(SESSION_ID_FIELD, id)?;
        }
        map.end()
    }
}

/// First value whose key is present in `object`, following `keys` order.
pub fn resolve_first<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| object.get(*key))
}

/// Normalize a single object.
pub fn normalize_object(object: &Map<String, Value>) -> NormalizedItem {
    NormalizedItem {
        text: resolve_first(object, &TEXT_KEYS).cloned(),
        session_id: resolve_first(object, &SESSION_ID_KEYS).cloned(),
    }
}

/// Normalize a single item. Non-object items have no fields to resolve and
/// normalize to an empty record.
pub fn normalize_item(item: &Value) -> NormalizedItem {
    match item {
        Value::Object(object) => normalize_object(object),
        _ => NormalizedItem::default(),
    }
}

/// Normalize a batch. One output per input, in input order.
pub fn normalize(items: &[Value]) -> Vec<NormalizedItem> {
    items.iter().map(normalize_item).collect()
}

/// Split one response body into items: an array yields one item per element,
/// anything else is a single item.
pub fn split_batch(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        other => vec![other],
    }
}

/// Decode a response body and normalize every item in it. An empty body is a
/// single item with no fields.
pub fn normalize_body(body: &[u8]) -> Result<Vec<NormalizedItem>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(vec![NormalizedItem::default()]);
    }
    let value: Value = serde_json::from_slice(body)?;
    Ok(normalize(&split_batch(value)))
}

/// Whether `value` is an object containing every key in `fields`.
pub fn has_fields(value: &Value, fields: &[&str]) -> bool {
    match value {
        Value::Object(object) => fields.iter().all(|f| object.contains_key(*f)),
        _ => false,
    }
}
