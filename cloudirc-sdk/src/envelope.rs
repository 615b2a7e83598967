//! Envelope decoding: raw pushed bytes into typed [`Event`]s.

use serde::Deserialize;

use crate::error::DecodeError;
use crate::event::Event;

/// Decode one pushed message.
///
/// Unknown fields are ignored and missing optional fields stay absent. The
/// input bytes are copied into [`Event::raw`] so kind-specific payloads can be
/// decoded again later.
pub fn decode(raw: &[u8]) -> Result<Event, DecodeError> {
    let mut event: Event = serde_json::from_slice(raw)?;
    event.raw = raw.to_vec();
    Ok(event)
}

/// Payload of an `oob_include` event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OobInclude {
    /// Backlog reference, usually a path relative to the API host.
    pub url: String,
}

impl Event {
    /// Re-decode the raw bytes as an `oob_include` payload.
    pub fn oob_include(&self) -> Option<OobInclude> {
        serde_json::from_slice(&self.raw).ok()
    }
}
