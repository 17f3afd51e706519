use action_locator::LocatorError;
use cdp_adapter::AdapterError;
use thiserror::Error;
use workflow_core_types::CoreError;

/// Errors raised while capturing actions.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("malformed action line: {0}")]
    Malformed(String),
    #[error(transparent)]
    Action(#[from] CoreError),
    #[error(transparent)]
    Locator(#[from] LocatorError),
    #[error(transparent)]
    Surface(#[from] AdapterError),
}

impl CaptureError {
    /// Transport-level errors are dropped, never propagated to the session.
    pub fn is_transport(&self) -> bool {
        matches!(self, CaptureError::Malformed(_) | CaptureError::Action(_))
    }
}
