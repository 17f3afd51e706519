//! Advisory click context: visible text, sibling position, ARIA and link
//! target.

use workflow_core_types::ActionContext;

use crate::dom::{DomTree, NodeId};

/// Maximum number of characters kept from the element text.
pub const MAX_CONTEXT_TEXT: usize = 100;

const LINK_TAGS: &[&str] = &["a", "area", "base", "link"];

pub fn element_context(tree: &DomTree, node: NodeId) -> ActionContext {
    let mut context = ActionContext::default();
    if tree.node(node).is_none() {
        return context;
    }

    let text = tree.text_content(node);
    let text = text.trim();
    if !text.is_empty() {
        context.text = Some(truncate_chars(text, MAX_CONTEXT_TEXT));
    }

    if let Some(parent) = tree.parent(node) {
        let siblings = tree.children(parent);
        if let Some(index) = siblings.iter().position(|sibling| *sibling == node) {
            if index > 0 && siblings.len() > 1 {
                context.index = Some(index);
                context.total_siblings = Some(siblings.len());
            }
        }
    }

    context.aria_label = non_empty(tree.attribute(node, "aria-label"));
    context.role = non_empty(tree.attribute(node, "role"));

    if tree.tag(node).is_some_and(|tag| LINK_TAGS.contains(&tag)) {
        context.href = tree
            .attribute(node, "href")
            .map(|href| resolve_href(tree, href));
    }

    context
}

/// Absolute form of `href` against the document URL, when one is known.
fn resolve_href(tree: &DomTree, href: &str) -> String {
    tree.base_url()
        .and_then(|base| base.join(href).ok())
        .map(|url| url.to_string())
        .unwrap_or_else(|| href.to_string())
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::ElementSpec;
    use url::Url;

    #[test]
    fn records_sibling_position_after_first() {
        let mut tree = DomTree::new();
        let list = tree.append(tree.body(), ElementSpec::new("ul")).unwrap();
        let first = tree.append(list, ElementSpec::new("li").text("One")).unwrap();
        let third = {
            tree.append(list, ElementSpec::new("li").text("Two")).unwrap();
            tree.append(list, ElementSpec::new("li").text("  Three ")).unwrap()
        };

        let ctx = element_context(&tree, first);
        assert_eq!(ctx.index, None);
        assert_eq!(ctx.text.as_deref(), Some("One"));

        let ctx = element_context(&tree, third);
        assert_eq!(ctx.index, Some(2));
        assert_eq!(ctx.total_siblings, Some(3));
        assert_eq!(ctx.text.as_deref(), Some("Three"));
    }

    #[test]
    fn truncates_text_by_code_points() {
        let long: String = "é".repeat(150);
        let mut tree = DomTree::new();
        let node = tree
            .append(tree.body(), ElementSpec::new("p").text(long))
            .unwrap();
        let ctx = element_context(&tree, node);
        assert_eq!(ctx.text.unwrap().chars().count(), MAX_CONTEXT_TEXT);
    }

    #[test]
    fn resolves_link_targets() {
        let base = Url::parse("https://example.com/docs/").unwrap();
        let mut tree = DomTree::new().with_base_url(base);
        let link = tree
            .append(
                tree.body(),
                ElementSpec::new("a")
                    .attr("href", "guide.html")
                    .attr("role", "link")
                    .attr("aria-label", "Guide"),
            )
            .unwrap();

        let ctx = element_context(&tree, link);
        assert_eq!(ctx.href.as_deref(), Some("https://example.com/docs/guide.html"));
        assert_eq!(ctx.role.as_deref(), Some("link"));
        assert_eq!(ctx.aria_label.as_deref(), Some("Guide"));
    }

    #[test]
    fn href_ignored_on_non_links() {
        let mut tree = DomTree::new();
        let div = tree
            .append(tree.body(), ElementSpec::new("div").attr("href", "/x"))
            .unwrap();
        assert!(element_context(&tree, div).is_empty());
    }
}
