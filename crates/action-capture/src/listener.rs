//! In-page capture listener.
//!
//! The same state machine runs in two places: compiled into the injection
//! script for real pages (see [`crate::script`]) and natively against a
//! [`DomTree`] for simulated surfaces. Both emit identical action records.

use std::time::{Duration, Instant};

use action_locator::{element_context, selector_for, DomTree, NodeId};
use workflow_core_types::{CapturedAction, ScrollOffset};

/// Default debounce window for scroll events.
pub const SCROLL_DEBOUNCE: Duration = Duration::from_millis(300);

/// Controls that emit fill actions on input.
const FILL_CONTROLS: &[&str] = &["input", "textarea"];

#[derive(Debug)]
pub struct CaptureListener {
    attached: bool,
    debounce: Duration,
    last_scroll: ScrollOffset,
    pending_scroll: Option<(ScrollOffset, Instant)>,
    page_actions: Vec<CapturedAction>,
}

impl Default for CaptureListener {
    fn default() -> Self {
        Self::new(SCROLL_DEBOUNCE)
    }
}

impl CaptureListener {
    pub fn new(debounce: Duration) -> Self {
        Self {
            attached: false,
            debounce,
            last_scroll: ScrollOffset::ORIGIN,
            pending_scroll: None,
            page_actions: Vec::new(),
        }
    }

    /// Attaches the observers. Returns `false` when already attached.
    pub fn attach(&mut self) -> bool {
        if self.attached {
            return false;
        }
        self.attached = true;
        true
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Page-local list of every action emitted so far.
    pub fn page_actions(&self) -> &[CapturedAction] {
        &self.page_actions
    }

    pub fn last_scroll(&self) -> ScrollOffset {
        self.last_scroll
    }

    /// Click at document scroll `offset`. A pending scroll position that was
    /// never recorded is emitted first.
    pub fn on_click(
        &mut self,
        tree: &DomTree,
        target: NodeId,
        offset: ScrollOffset,
        timestamp: u64,
    ) -> Vec<CapturedAction> {
        if !self.attached {
            return Vec::new();
        }
        let mut emitted = Vec::with_capacity(2);
        if !offset.is_origin() && offset != self.last_scroll {
            self.last_scroll = offset;
            self.pending_scroll = None;
            emitted.push(CapturedAction::scroll(offset, timestamp));
        }
        emitted.push(CapturedAction::click(
            selector_for(tree, target),
            Some(element_context(tree, target)),
            timestamp,
        ));
        self.record(emitted)
    }

    /// Input on `target`; only text inputs and text areas produce a fill.
    pub fn on_input(
        &mut self,
        tree: &DomTree,
        target: NodeId,
        timestamp: u64,
    ) -> Option<CapturedAction> {
        if !self.attached {
            return None;
        }
        let tag = tree.tag(target)?;
        if !FILL_CONTROLS.contains(&tag) {
            return None;
        }
        let value = tree.value(target).unwrap_or_default().to_string();
        let action = CapturedAction::fill(selector_for(tree, target), value, timestamp);
        self.record(vec![action]).pop()
    }

    /// Scroll event; restarts the debounce window.
    pub fn on_scroll(&mut self, offset: ScrollOffset, now: Instant) {
        if self.attached {
            self.pending_scroll = Some((offset, now + self.debounce));
        }
    }

    /// Deadline of the pending scroll, if any.
    pub fn scroll_deadline(&self) -> Option<Instant> {
        self.pending_scroll.map(|(_, deadline)| deadline)
    }

    /// Emits the settled scroll once its debounce window has elapsed.
    pub fn poll(&mut self, now: Instant, timestamp: u64) -> Option<CapturedAction> {
        let (offset, deadline) = self.pending_scroll?;
        if now < deadline {
            return None;
        }
        self.pending_scroll = None;
        if offset == self.last_scroll {
            return None;
        }
        self.last_scroll = offset;
        self.record(vec![CapturedAction::scroll(offset, timestamp)])
            .pop()
    }

    fn record(&mut self, actions: Vec<CapturedAction>) -> Vec<CapturedAction> {
        self.page_actions.extend(actions.iter().cloned());
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_locator::ElementSpec;
    use workflow_core_types::ActionKind;

    fn page() -> (DomTree, NodeId, NodeId, NodeId) {
        let mut tree = DomTree::new();
        let body = tree.body();
        let button = tree
            .append(body, ElementSpec::new("button").id("submit").text("Send"))
            .unwrap();
        let email = tree
            .append(body, ElementSpec::new("input").id("email"))
            .unwrap();
        let select = tree
            .append(body, ElementSpec::new("select").attr("name", "country"))
            .unwrap();
        (tree, button, email, select)
    }

    fn attached() -> CaptureListener {
        let mut listener = CaptureListener::default();
        assert!(listener.attach());
        listener
    }

    #[test]
    fn scrolled_click_emits_scroll_first_once() {
        let (tree, button, _, _) = page();
        let mut listener = attached();

        let first = listener.on_click(&tree, button, ScrollOffset::new(0, 400), 1);
        let kinds: Vec<ActionKind> = first.iter().map(CapturedAction::kind).collect();
        assert_eq!(kinds, vec![ActionKind::Scroll, ActionKind::Click]);
        assert_eq!(first[0].scroll_offset(), Some(ScrollOffset::new(0, 400)));
        assert_eq!(first[1].selector(), Some("#submit"));

        let second = listener.on_click(&tree, button, ScrollOffset::new(0, 400), 2);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].kind(), ActionKind::Click);
        assert_eq!(listener.page_actions().len(), 3);
    }

    #[test]
    fn click_at_origin_has_no_scroll() {
        let (tree, button, _, _) = page();
        let mut listener = attached();
        let emitted = listener.on_click(&tree, button, ScrollOffset::ORIGIN, 1);
        assert_eq!(emitted.len(), 1);
        assert_eq!(
            emitted[0].context.as_ref().and_then(|ctx| ctx.text.as_deref()),
            Some("Send")
        );
    }

    #[test]
    fn input_only_fills_text_controls() {
        let (mut tree, _, email, select) = page();
        tree.set_value(email, "a@b.com").unwrap();
        let mut listener = attached();

        let fill = listener.on_input(&tree, email, 5).unwrap();
        assert_eq!(fill.selector(), Some("#email"));
        assert_eq!(fill.value().as_deref(), Some("a@b.com"));
        assert!(listener.on_input(&tree, select, 6).is_none());
    }

    #[test]
    fn scroll_is_debounced_to_final_offset() {
        let mut listener = attached();
        let start = Instant::now();
        listener.on_scroll(ScrollOffset::new(0, 100), start);
        listener.on_scroll(ScrollOffset::new(0, 250), start + Duration::from_millis(100));
        assert!(listener.poll(start + Duration::from_millis(300), 1).is_none());

        let settled = listener
            .poll(start + Duration::from_millis(400), 2)
            .unwrap();
        assert_eq!(settled.scroll_offset(), Some(ScrollOffset::new(0, 250)));
        assert!(listener.poll(start + Duration::from_secs(2), 3).is_none());
    }

    #[test]
    fn settled_scroll_suppresses_click_scroll() {
        let (tree, button, _, _) = page();
        let mut listener = attached();
        let start = Instant::now();
        listener.on_scroll(ScrollOffset::new(0, 400), start);
        listener.poll(start + SCROLL_DEBOUNCE, 1).unwrap();

        let emitted = listener.on_click(&tree, button, ScrollOffset::new(0, 400), 2);
        assert_eq!(emitted.len(), 1);
    }

    #[test]
    fn detached_listener_is_silent_and_attach_is_guarded() {
        let (tree, button, _, _) = page();
        let mut listener = CaptureListener::default();
        assert!(listener.on_click(&tree, button, ScrollOffset::ORIGIN, 1).is_empty());
        assert!(listener.attach());
        assert!(!listener.attach());
    }
}
