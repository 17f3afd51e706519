//! Shell error type.

use action_capture::CaptureError;
use cdp_adapter::AdapterError;
use thiserror::Error;
use workflow_core_types::ModeState;

#[derive(Debug, Error)]
pub enum ShellError {
    /// A surface the transition depends on does not exist yet.
    #[error("{0} surface not initialized")]
    Uninitialized(&'static str),

    #[error("cannot switch to {to} while in {from} mode")]
    ModeConflict { from: ModeState, to: ModeState },

    #[error(transparent)]
    Surface(#[from] AdapterError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("automation server channel closed")]
    ChannelClosed,

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ShellResult<T> = Result<T, ShellError>;
