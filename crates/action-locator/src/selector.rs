//! Selector derivation.
//!
//! Priority, first match wins: `#id`, `[name]` on form controls, test-id or
//! first `data-*` attribute, `aria-label`, `tag[role]`, `tag.class` with
//! generated classes filtered out, then a one-level structural path. The
//! result is not guaranteed to be unique.

use crate::dom::{DomTree, NodeId};

/// Classes of this length or longer are never used.
pub const MAX_CLASS_LEN: usize = 30;

/// Length of a leading capitalised alphanumeric run treated as generated.
const CAPITALISED_RUN: usize = 16;

/// Length of a leading lowercase-hex run treated as generated.
const HEX_RUN: usize = 8;

const TEST_ID_ATTR: &str = "data-testid";

/// Elements exposing a `name` property.
const NAMED_CONTROLS: &[&str] = &[
    "button", "fieldset", "form", "iframe", "input", "map", "meta", "object", "output", "select",
    "slot", "textarea",
];

/// Returned for nodes that are not part of the tree.
pub const UNKNOWN_SELECTOR: &str = "unknown";

/// Derives a CSS locator for `node`. Pure function of the tree.
pub fn selector_for(tree: &DomTree, node: NodeId) -> String {
    let Some(tag) = tree.tag(node) else {
        return UNKNOWN_SELECTOR.to_string();
    };

    if let Some(id) = non_empty(tree.attribute(node, "id")) {
        return format!("#{id}");
    }

    if NAMED_CONTROLS.contains(&tag) {
        if let Some(name) = non_empty(tree.attribute(node, "name")) {
            return attribute_selector("name", name);
        }
    }

    if let Some(selector) = data_selector(tree, node) {
        return selector;
    }

    if let Some(label) = non_empty(tree.attribute(node, "aria-label")) {
        return attribute_selector("aria-label", label);
    }
    if let Some(role) = non_empty(tree.attribute(node, "role")) {
        return format!("{tag}{}", attribute_selector("role", role));
    }

    let classes = stable_classes(tree.attribute(node, "class").unwrap_or_default());
    if !classes.is_empty() {
        return format!("{tag}.{}", classes.join("."));
    }

    structural_selector(tree, node, tag)
}

/// Whether a class name looks framework-generated.
pub fn is_hashed_class(class: &str) -> bool {
    let mut chars = class.chars();
    let capitalised = match chars.next() {
        Some(first) if first.is_ascii_uppercase() => {
            1 + chars.take_while(|c| c.is_ascii_alphanumeric()).count()
        }
        _ => 0,
    };
    if capitalised >= CAPITALISED_RUN {
        return true;
    }
    class
        .chars()
        .take_while(|c| matches!(c, '0'..='9' | 'a'..='f'))
        .count()
        >= HEX_RUN
}

/// Classes from a `class` attribute value that are safe to select on.
pub fn stable_classes(class_attr: &str) -> Vec<&str> {
    class_attr
        .split_ascii_whitespace()
        .filter(|class| class.chars().count() < MAX_CLASS_LEN && !is_hashed_class(class))
        .collect()
}

fn data_selector(tree: &DomTree, node: NodeId) -> Option<String> {
    if let Some(test_id) = non_empty(tree.attribute(node, TEST_ID_ATTR)) {
        return Some(attribute_selector(TEST_ID_ATTR, test_id));
    }
    tree.attributes(node)
        .iter()
        .find(|(name, _)| name.len() > "data-".len() && name.starts_with("data-"))
        .map(|(name, value)| attribute_selector(name, value))
}

/// One level up: `#parentId > tag`, else `parentTag > tag`, with an
/// `nth-of-type` qualifier when same-tag siblings exist.
fn structural_selector(tree: &DomTree, node: NodeId, tag: &str) -> String {
    let Some(parent) = tree.parent(node) else {
        return tag.to_string();
    };
    if tree.is_body(parent) {
        return tag.to_string();
    }

    let same_tag: Vec<NodeId> = tree
        .children(parent)
        .iter()
        .copied()
        .filter(|sibling| tree.tag(*sibling) == Some(tag))
        .collect();
    let child = match same_tag.iter().position(|sibling| *sibling == node) {
        Some(pos) if same_tag.len() > 1 => format!("{tag}:nth-of-type({})", pos + 1),
        _ => tag.to_string(),
    };

    match non_empty(tree.attribute(parent, "id")) {
        Some(parent_id) => format!("#{parent_id} > {child}"),
        None => {
            let parent_tag = tree.tag(parent).unwrap_or(UNKNOWN_SELECTOR);
            format!("{parent_tag} > {child}")
        }
    }
}

fn attribute_selector(name: &str, value: &str) -> String {
    format!("[{name}=\"{}\"]", escape_attribute_value(value))
}

/// Escapes a value for use inside a double-quoted attribute selector.
pub fn escape_attribute_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::ElementSpec;

    fn single(spec: ElementSpec) -> (DomTree, NodeId) {
        let mut tree = DomTree::new();
        let node = tree.append(tree.body(), spec).unwrap();
        (tree, node)
    }

    #[test]
    fn id_wins_over_everything() {
        let (tree, node) = single(
            ElementSpec::new("input")
                .id("email")
                .attr("name", "mail")
                .attr("data-testid", "email-field")
                .attr("aria-label", "Email")
                .class("form-control"),
        );
        assert_eq!(selector_for(&tree, node), "#email");
    }

    #[test]
    fn empty_id_falls_through() {
        let (tree, node) = single(ElementSpec::new("input").id("").attr("name", "q"));
        assert_eq!(selector_for(&tree, node), "[name=\"q\"]");
    }

    #[test]
    fn name_only_applies_to_form_controls() {
        let (tree, node) = single(ElementSpec::new("div").attr("name", "x").class("card"));
        assert_eq!(selector_for(&tree, node), "div.card");
    }

    #[test]
    fn prefers_test_id_then_first_data_attribute() {
        let (tree, node) = single(
            ElementSpec::new("button")
                .attr("data-track", "cta")
                .attr("data-testid", "buy"),
        );
        assert_eq!(selector_for(&tree, node), "[data-testid=\"buy\"]");

        let (tree, node) = single(
            ElementSpec::new("div")
                .attr("data-item-id", "42")
                .attr("data-kind", "row"),
        );
        assert_eq!(selector_for(&tree, node), "[data-item-id=\"42\"]");
    }

    #[test]
    fn aria_label_then_role() {
        let (tree, node) = single(ElementSpec::new("a").attr("aria-label", "Say \"hi\""));
        assert_eq!(selector_for(&tree, node), "[aria-label=\"Say \\\"hi\\\"\"]");

        let (tree, node) = single(ElementSpec::new("div").attr("role", "button"));
        assert_eq!(selector_for(&tree, node), "div[role=\"button\"]");
    }

    #[test]
    fn filters_hashed_classes() {
        let (tree, node) = single(ElementSpec::new("button").class("Ab3xQzT9mKpLsYh2 btn"));
        assert_eq!(selector_for(&tree, node), "button.btn");

        assert!(is_hashed_class("EKtkFWMYpwzMKOYr0GYm"));
        assert!(is_hashed_class("3f9a0c1bextra"));
        assert!(!is_hashed_class("Header"));
        assert!(!is_hashed_class("cafe"));
        assert_eq!(
            stable_classes("a-very-long-utility-class-name-here ok"),
            vec!["ok"]
        );
    }

    #[test]
    fn structural_fallback_uses_parent_id() {
        let mut tree = DomTree::new();
        let list = tree.append(tree.body(), ElementSpec::new("ul").id("menu")).unwrap();
        tree.append(list, ElementSpec::new("li")).unwrap();
        let second = tree.append(list, ElementSpec::new("li")).unwrap();
        assert_eq!(selector_for(&tree, second), "#menu > li:nth-of-type(2)");
    }

    #[test]
    fn structural_fallback_climbs_one_level_only() {
        let mut tree = DomTree::new();
        let outer = tree.append(tree.body(), ElementSpec::new("section").id("main")).unwrap();
        let wrapper = tree.append(outer, ElementSpec::new("div")).unwrap();
        tree.append(wrapper, ElementSpec::new("p")).unwrap();
        let span = tree.append(wrapper, ElementSpec::new("span")).unwrap();
        assert_eq!(selector_for(&tree, span), "div > span");
    }

    #[test]
    fn direct_body_child_is_bare_tag() {
        let (tree, node) = single(ElementSpec::new("span").class("Ab3xQzT9mKpLsYh2"));
        assert_eq!(selector_for(&tree, node), "span");
    }

    #[test]
    fn unknown_node() {
        let tree = DomTree::new();
        assert_eq!(selector_for(&tree, NodeId(99)), UNKNOWN_SELECTOR);
    }
}
