//! Decoding of the analysis event stream
//!
//! One raw text frame decodes into zero or one [`Event`]. The decoder is the
//! only place that knows about the wire format's inconsistencies (module id
//! aliases, payload aliases, compressed chunks); everything downstream sees a
//! resolved [`ModuleId`] and typed payloads.
//!
//! ```text
//! frame ──► decode() ──► Event::Module { module, event }
//!                    ├─► Event::SystemLog / GlobalInit / GlobalEnd
//!                    └─► None (dropped) | Err (malformed, logged by caller)
//! ```

pub mod decompress;
mod wire;

pub use wire::GZIP_BASE64;

use crate::error::{Error, Result};
use crate::types::Metrics;
use wire::{first_text, str_of, WireMessage};

/// Identifier of an analysis module, resolved from the wire
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload of a `STREAM` event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    /// Raw text, appended as-is
    Plain(String),
    /// Base64-encoded gzip data that must be inflated first
    GzipBase64(String),
}

/// An event scoped to one module
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleEvent {
    Init,
    Log { text: String },
    Error { text: String },
    Stream(StreamChunk),
    End {
        status: Option<String>,
        summary: Option<String>,
    },
    Metrics(Metrics),
}

impl ModuleEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ModuleEvent::Init => "INIT",
            ModuleEvent::Log { .. } => "LOG",
            ModuleEvent::Error { .. } => "ERROR",
            ModuleEvent::Stream(_) => "STREAM",
            ModuleEvent::End { .. } => "END",
            ModuleEvent::Metrics(_) => "METRICS",
        }
    }
}

/// A decoded stream event
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Free-text status line not attributable to a module
    SystemLog { text: String },
    /// A new run started; all modules are cleared
    GlobalInit,
    /// The run finished with the reported status
    GlobalEnd { status: Option<String> },
    /// Event for a single module
    Module { module: ModuleId, event: ModuleEvent },
}

/// Decode one raw frame.
///
/// Returns `Ok(None)` for frames that are valid but carry nothing to apply
/// (unknown types, module-less events other than `LOG`/`INIT`), and `Err` for
/// malformed frames. Neither case should stop the stream.
pub fn decode(raw: &str) -> Result<Option<Event>> {
    let msg: WireMessage = serde_json::from_str(raw)?;

    let kind = msg
        .kind
        .clone()
        .ok_or_else(|| Error::Decode("frame has no type tag".to_string()))?;

    let module = msg.module_id().map(ModuleId::new);

    let event = match (kind.as_str(), module) {
        ("GLOBAL_INIT", _) | ("INIT", None) => Some(Event::GlobalInit),
        ("GLOBAL_END", _) => Some(Event::GlobalEnd {
            status: str_of(&msg.status).map(str::to_string),
        }),
        ("LOG", None) => Some(Event::SystemLog {
            text: first_text(&[&msg.message, &msg.data]).unwrap_or_default(),
        }),
        ("ERROR" | "STREAM" | "END" | "METRICS", None) => {
            tracing::debug!(kind = %kind, "Dropping module event without module id");
            None
        }
        (kind_str, Some(module)) => {
            decode_module_event(kind_str, &msg)?.map(|event| Event::Module { module, event })
        }
        (other, None) => {
            tracing::debug!(kind = %other, "Ignoring unknown event type");
            None
        }
    };

    Ok(event)
}

fn decode_module_event(kind: &str, msg: &WireMessage) -> Result<Option<ModuleEvent>> {
    let event = match kind {
        "INIT" => ModuleEvent::Init,
        "LOG" => ModuleEvent::Log {
            text: first_text(&[&msg.data, &msg.message, &msg.error]).unwrap_or_default(),
        },
        "ERROR" => ModuleEvent::Error {
            text: first_text(&[&msg.data, &msg.message, &msg.error]).unwrap_or_default(),
        },
        "STREAM" if msg.is_gzip_base64() => match str_of(&msg.data) {
            Some(data) => ModuleEvent::Stream(StreamChunk::GzipBase64(data.to_string())),
            None => {
                tracing::debug!("Dropping compressed STREAM event without data");
                return Ok(None);
            }
        },
        "STREAM" => ModuleEvent::Stream(StreamChunk::Plain(
            first_text(&[&msg.data, &msg.message]).unwrap_or_default(),
        )),
        "END" => ModuleEvent::End {
            status: str_of(&msg.status).map(str::to_string),
            summary: str_of(&msg.summary).map(str::to_string),
        },
        "METRICS" => {
            let payload = msg
                .data
                .clone()
                .ok_or_else(|| Error::Decode("METRICS event has no data".to_string()))?;
            let metrics: Metrics = serde_json::from_value(payload)
                .map_err(|e| Error::Decode(format!("invalid METRICS payload: {}", e)))?;
            ModuleEvent::Metrics(metrics)
        }
        other => {
            tracing::debug!(kind = %other, "Ignoring unknown module event type");
            return Ok(None);
        }
    };
    Ok(Some(event))
}
