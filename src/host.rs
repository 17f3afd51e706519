//! Host window model.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use workflow_core_types::Bounds;

/// Window hosting the chat panel, the screenshot view and the interactive
/// surface.
pub trait HostWindow: Send + Sync {
    /// Content area of the window.
    fn bounds(&self) -> Bounds;

    /// Screenshot view and interactive surface are never shown together.
    fn set_screenshot_visible(&self, visible: bool);
}

/// Region given to the interactive surface: the right half.
pub fn interactive_bounds(host: &dyn HostWindow) -> Bounds {
    let content = host.bounds();
    Bounds::right_half(content.width, content.height)
}

/// In-process host window state.
#[derive(Debug)]
pub struct HostWindowState {
    bounds: RwLock<Bounds>,
    screenshot_visible: AtomicBool,
}

impl HostWindowState {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            bounds: RwLock::new(Bounds::new(0, 0, width, height)),
            screenshot_visible: AtomicBool::new(true),
        }
    }

    pub fn resize(&self, width: u32, height: u32) {
        *self.bounds.write() = Bounds::new(0, 0, width, height);
    }

    pub fn screenshot_visible(&self) -> bool {
        self.screenshot_visible.load(Ordering::SeqCst)
    }
}

impl HostWindow for HostWindowState {
    fn bounds(&self) -> Bounds {
        *self.bounds.read()
    }

    fn set_screenshot_visible(&self, visible: bool) {
        self.screenshot_visible.store(visible, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interactive_region_is_right_half() {
        let host = HostWindowState::new(1600, 1000);
        assert_eq!(interactive_bounds(&host), Bounds::new(800, 0, 800, 1000));
        host.resize(1281, 800);
        assert_eq!(interactive_bounds(&host), Bounds::new(640, 0, 640, 800));
    }
}
