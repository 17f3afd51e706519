//! Console-line transport between the page's script context and the host.
//!
//! Each action crosses the boundary as one tagged line,
//! `[WORKFLOW_ACTION] {"type":"click",...}`. Lines without the tag are page
//! noise; tagged lines that fail to decode are logged and dropped.

use cdp_adapter::SurfaceEvent;
use serde_json::Value;
use tracing::{debug, warn};
use workflow_core_types::{ActionKind, CapturedAction};

use crate::buffer::ActionBuffer;
use crate::errors::CaptureError;
use crate::metrics;

/// Prefix marking console lines that carry a captured action.
pub const ACTION_TAG: &str = "[WORKFLOW_ACTION]";

/// Result of feeding one console line to the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ingest {
    Appended(ActionKind),
    Ignored,
    Malformed(String),
}

/// Renders `action` as a single tagged line.
pub fn encode_line(tag: &str, action: &CapturedAction) -> String {
    match serde_json::to_string(action) {
        Ok(json) => format!("{tag} {json}"),
        // Serialising plain strings and integers cannot fail.
        Err(_) => format!("{tag} {{}}"),
    }
}

/// Decodes a console line. `Ok(None)` means the line is not tagged.
pub fn decode_line(tag: &str, line: &str) -> Result<Option<CapturedAction>, CaptureError> {
    let Some(rest) = line.trim_start().strip_prefix(tag) else {
        return Ok(None);
    };
    let payload: Value = serde_json::from_str(rest.trim())
        .map_err(|err| CaptureError::Malformed(err.to_string()))?;
    if !payload.is_object() {
        return Err(CaptureError::Malformed(format!(
            "expected object payload, got {payload}"
        )));
    }
    Ok(Some(CapturedAction::from_json(payload)?))
}

/// Feeds decoded actions into the session buffer.
#[derive(Clone, Debug)]
pub struct CaptureTransport {
    tag: String,
    buffer: ActionBuffer,
}

impl CaptureTransport {
    pub fn new(tag: impl Into<String>, buffer: ActionBuffer) -> Self {
        Self {
            tag: tag.into(),
            buffer,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn buffer(&self) -> &ActionBuffer {
        &self.buffer
    }

    pub fn ingest(&self, line: &str) -> Ingest {
        match decode_line(&self.tag, line) {
            Ok(Some(action)) => {
                let kind = action.kind();
                debug!(target: "action-capture", %action, "captured action");
                metrics::record_captured(kind);
                self.buffer.append(action);
                Ingest::Appended(kind)
            }
            Ok(None) => Ingest::Ignored,
            Err(err) => {
                warn!(target: "action-capture", error = %err, line, "dropping malformed action line");
                metrics::record_malformed();
                Ingest::Malformed(err.to_string())
            }
        }
    }

    /// Handles a surface event; only console messages are relevant.
    pub fn handle_event(&self, event: &SurfaceEvent) -> Ingest {
        match event {
            SurfaceEvent::ConsoleMessage { text, .. } => self.ingest(text),
            _ => Ingest::Ignored,
        }
    }

    /// Accounts for console events lost to a lagging receiver.
    pub fn record_lag(&self, skipped: u64) {
        warn!(target: "action-capture", skipped, "capture receiver lagged; events lost");
        metrics::record_dropped(skipped);
    }
}
