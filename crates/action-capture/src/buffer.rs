//! Host-owned ordered queue of captured actions.

use std::sync::Arc;

use parking_lot::Mutex;
use workflow_core_types::CapturedAction;

/// Shared action queue of the current recording session.
///
/// Clones share the same storage. Appends keep arrival order; timestamps
/// that would go backwards are raised to the previous one so the sequence
/// stays non-decreasing.
#[derive(Clone, Debug, Default)]
pub struct ActionBuffer {
    inner: Arc<Mutex<Vec<CapturedAction>>>,
}

impl ActionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn append(&self, mut action: CapturedAction) {
        let mut guard = self.inner.lock();
        if let Some(last) = guard.last() {
            action.timestamp = action.timestamp.max(last.timestamp);
        }
        guard.push(action);
    }

    /// Returns every buffered action and leaves the buffer empty.
    pub fn drain(&self) -> Vec<CapturedAction> {
        std::mem::take(&mut *self.inner.lock())
    }

    /// Puts previously drained actions back ahead of the current contents.
    pub fn restore(&self, actions: Vec<CapturedAction>) {
        if actions.is_empty() {
            return;
        }
        let mut guard = self.inner.lock();
        let newer = std::mem::replace(&mut *guard, actions);
        guard.extend(newer);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<CapturedAction> {
        self.inner.lock().clone()
    }
}
