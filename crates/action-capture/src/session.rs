//! Recording session lifecycle.

use std::collections::HashMap;
use std::time::Instant;

use tracing::info;
use workflow_core_types::{ActionPayload, CapturedAction, SessionId};

use crate::buffer::ActionBuffer;
use crate::transport::CaptureTransport;

/// State of one recording, from mode entry to stop.
#[derive(Debug)]
pub struct RecordingSession {
    id: SessionId,
    start_url: String,
    started: Instant,
    transport: CaptureTransport,
    collapse_fills: bool,
}

/// Result of a finished recording.
#[derive(Clone, Debug, PartialEq)]
pub struct FinishedRecording {
    pub session: SessionId,
    pub start_url: String,
    pub actions: Vec<CapturedAction>,
    /// Seconds between start and finish.
    pub duration: f64,
}

impl RecordingSession {
    /// Starts a session; the buffer is cleared.
    pub fn start(start_url: impl Into<String>, transport: CaptureTransport, collapse_fills: bool) -> Self {
        transport.buffer().clear();
        let session = Self {
            id: SessionId::new(),
            start_url: start_url.into(),
            started: Instant::now(),
            transport,
            collapse_fills,
        };
        info!(
            target: "action-capture",
            session = %session.id,
            start_url = %session.start_url,
            "recording session started"
        );
        session
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn start_url(&self) -> &str {
        &self.start_url
    }

    pub fn transport(&self) -> &CaptureTransport {
        &self.transport
    }

    pub fn buffer(&self) -> &ActionBuffer {
        self.transport.buffer()
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Drains the buffered actions for hand-off.
    pub fn drain(&self) -> Vec<CapturedAction> {
        let actions = self.buffer().drain();
        if self.collapse_fills {
            collapse_fills(actions)
        } else {
            actions
        }
    }

    /// Ends the session, draining whatever is still buffered.
    pub fn finish(self) -> FinishedRecording {
        let actions = self.drain();
        let duration = self.elapsed_secs();
        info!(
            target: "action-capture",
            session = %self.id,
            remaining = actions.len(),
            duration,
            "recording session finished"
        );
        FinishedRecording {
            session: self.id,
            start_url: self.start_url,
            actions,
            duration,
        }
    }
}

/// Keeps the last fill per selector at the position of that selector's first
/// fill.
pub fn collapse_fills(actions: Vec<CapturedAction>) -> Vec<CapturedAction> {
    let mut slot_of: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<CapturedAction> = Vec::with_capacity(actions.len());
    for action in actions {
        if let ActionPayload::Fill { selector, .. } = &action.payload {
            if let Some(&slot) = slot_of.get(selector) {
                out[slot] = action;
                continue;
            }
            slot_of.insert(selector.clone(), out.len());
        }
        out.push(action);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ACTION_TAG;

    #[test]
    fn start_clears_leftovers_and_finish_drains() {
        let buffer = ActionBuffer::new();
        buffer.append(CapturedAction::click("#stale", None, 1));
        let session = RecordingSession::start(
            "https://example.com",
            CaptureTransport::new(ACTION_TAG, buffer.clone()),
            false,
        );
        assert!(buffer.is_empty());

        buffer.append(CapturedAction::click("#submit", None, 2));
        let finished = session.finish();
        assert_eq!(finished.start_url, "https://example.com");
        assert_eq!(finished.actions.len(), 1);
        assert!(finished.duration >= 0.0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn collapses_fills_per_selector() {
        let actions = vec![
            CapturedAction::fill("#q", "r", 1),
            CapturedAction::click("#go", None, 2),
            CapturedAction::fill("#q", "rust", 3),
            CapturedAction::fill("#other", "x", 4),
        ];
        let collapsed = collapse_fills(actions);
        let rendered: Vec<String> = collapsed.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec!["fill #q (4 chars)", "click #go", "fill #other (1 chars)"]
        );
        assert_eq!(collapsed[0].timestamp, 3);
    }
}
