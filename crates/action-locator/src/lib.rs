//! Selector engine
//!
//! Derives replayable CSS locators for DOM elements and the advisory click
//! context recorded alongside them:
//! - `#id`, `[name]`, `data-*`, ARIA and filtered-class strategies
//! - One-level structural fallback
//! - Element context (text, sibling position, ARIA, link target)
//! - DOM snapshots of live pages for diagnosis

pub mod context;
pub mod dom;
pub mod errors;
pub mod selector;
pub mod snapshot;

pub use context::{element_context, truncate_chars, MAX_CONTEXT_TEXT};
pub use dom::{DomNode, DomTree, ElementSpec, NodeId};
pub use errors::LocatorError;
pub use selector::{
    escape_attribute_value, is_hashed_class, selector_for, stable_classes, UNKNOWN_SELECTOR,
};
pub use snapshot::{
    count_matches_script, diagnose, dump_script, parse_match_counts, DomSnapshot, SelectorReport,
    SnapshotNode,
};
