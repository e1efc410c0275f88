//! Raw wire records (serde deserialization)
//!
//! The backend's JSON frames are loosely typed: the module id may arrive under
//! three different names and text payloads under three more. Everything is
//! captured as optional [`serde_json::Value`]s here and resolved in
//! [`super::decode`].

use serde::Deserialize;
use serde_json::Value;

/// Encoding tag for gzip-compressed, base64-encoded stream chunks
pub const GZIP_BASE64: &str = "gzip_base64";

/// A single frame from the analysis event stream.
///
/// Uses `#[serde(default)]` to handle missing fields gracefully.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct WireMessage {
    #[serde(rename = "type")]
    pub kind: Option<String>,

    // Module id aliases, in precedence order
    pub module: Option<Value>,
    #[serde(rename = "moduleId")]
    pub module_id_camel: Option<Value>,
    pub module_id: Option<Value>,

    // Payload aliases
    pub message: Option<Value>,
    pub data: Option<Value>,
    pub error: Option<Value>,

    pub status: Option<Value>,
    pub summary: Option<Value>,
    pub encoding: Option<Value>,
}

/// Text content of a loosely typed field.
///
/// Empty strings and `null` count as absent. Non-string scalars are rendered
/// as their JSON text.
pub(crate) fn text_of(value: &Option<Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

/// First present, non-empty text among `fields`
pub(crate) fn first_text(fields: &[&Option<Value>]) -> Option<String> {
    fields.iter().find_map(|f| text_of(f))
}

/// String content of a field that must be a string to count.
pub(crate) fn str_of(value: &Option<Value>) -> Option<&str> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s.as_str()),
        _ => None,
    }
}

impl WireMessage {
    /// Resolve the module id from its legacy field names (first match wins).
    pub fn module_id(&self) -> Option<&str> {
        [&self.module, &self.module_id_camel, &self.module_id]
            .into_iter()
            .find_map(str_of)
    }

    pub fn is_gzip_base64(&self) -> bool {
        str_of(&self.encoding) == Some(GZIP_BASE64)
    }
}
