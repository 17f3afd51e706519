//! Action capture
//!
//! Everything between a user event inside the interactive surface and an
//! ordered action list on the host:
//! - Capture listener state machine and its injection script
//! - Tagged console-line transport
//! - Action buffer and recording session lifecycle
//! - Simulated surfaces for browserless runs

pub mod buffer;
pub mod errors;
pub mod listener;
pub mod metrics;
pub mod script;
pub mod session;
pub mod simulated;
pub mod transport;

pub use buffer::ActionBuffer;
pub use errors::CaptureError;
pub use listener::{CaptureListener, SCROLL_DEBOUNCE};
pub use script::{capture_script, is_capture_script, ScriptOptions, LISTENER_GUARD};
pub use session::{collapse_fills, FinishedRecording, RecordingSession};
pub use simulated::{FailurePlan, SimulatedBrowser, SimulatedOptions, SimulatedSurface, BLANK_URL};
pub use transport::{decode_line, encode_line, CaptureTransport, Ingest, ACTION_TAG};
