//! Owned DOM model the selector engine operates on.
//!
//! The tree is an arena: nodes are addressed by [`NodeId`] and hold their
//! parent and ordered children. Only elements are modelled; text is kept as
//! the element's own text run so `text_content` can be rebuilt in document
//! order.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::LocatorError;

/// Index of a node inside a [`DomTree`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NodeId(pub usize);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DomNode {
    pub tag: String,
    /// Attributes in source order.
    pub attributes: Vec<(String, String)>,
    /// Text directly owned by this element, emitted before its children.
    pub text: String,
    /// Live `value` property for form controls; falls back to the attribute.
    pub value: Option<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Element description used when appending to a tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ElementSpec {
    tag: String,
    attributes: Vec<(String, String)>,
    text: String,
}

impl ElementSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into().to_ascii_lowercase();
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
        self
    }

    pub fn id(self, id: impl Into<String>) -> Self {
        self.attr("id", id)
    }

    pub fn class(self, classes: impl Into<String>) -> Self {
        self.attr("class", classes)
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomTree {
    nodes: Vec<DomNode>,
    root: NodeId,
    body: NodeId,
    base_url: Option<Url>,
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DomTree {
    /// Empty document: `<html><body></body></html>`.
    pub fn new() -> Self {
        let html = DomNode {
            tag: "html".into(),
            children: vec![NodeId(1)],
            ..Default::default()
        };
        let body = DomNode {
            tag: "body".into(),
            parent: Some(NodeId(0)),
            ..Default::default()
        };
        Self {
            nodes: vec![html, body],
            root: NodeId(0),
            body: NodeId(1),
            base_url: None,
        }
    }

    /// Document URL used to resolve relative links.
    pub fn with_base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&DomNode> {
        self.nodes.get(id.0)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut DomNode, LocatorError> {
        self.nodes
            .get_mut(id.0)
            .ok_or(LocatorError::UnknownNode(id.0))
    }

    /// Appends `spec` as the last child of `parent`.
    pub fn append(&mut self, parent: NodeId, spec: ElementSpec) -> Result<NodeId, LocatorError> {
        let tag = spec.tag.trim().to_ascii_lowercase();
        if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(LocatorError::InvalidTag(spec.tag));
        }
        let id = NodeId(self.nodes.len());
        self.node_mut(parent)?.children.push(id);
        self.nodes.push(DomNode {
            tag,
            attributes: spec.attributes,
            text: spec.text,
            value: None,
            parent: Some(parent),
            children: Vec::new(),
        });
        Ok(id)
    }

    pub fn set_attribute(
        &mut self,
        id: NodeId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), LocatorError> {
        let name = name.into().to_ascii_lowercase();
        let value = value.into();
        let node = self.node_mut(id)?;
        match node.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => node.attributes.push((name, value)),
        }
        Ok(())
    }

    pub fn set_value(&mut self, id: NodeId, value: impl Into<String>) -> Result<(), LocatorError> {
        self.node_mut(id)?.value = Some(value.into());
        Ok(())
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|node| node.tag.as_str())
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id)?
            .attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn attributes(&self, id: NodeId) -> &[(String, String)] {
        self.node(id)
            .map(|node| node.attributes.as_slice())
            .unwrap_or(&[])
    }

    /// Current value of a form control.
    pub fn value(&self, id: NodeId) -> Option<&str> {
        let node = self.node(id)?;
        node.value
            .as_deref()
            .or_else(|| self.attribute(id, "value"))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_body(&self, id: NodeId) -> bool {
        id == self.body
    }

    /// Text of the element and its descendants in document order.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        if let Some(node) = self.node(id) {
            out.push_str(&node.text);
            for child in &node.children {
                self.collect_text(*child, out);
            }
        }
    }

    /// Descendants of `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// First element (document order) whose `id` attribute equals `value`.
    pub fn find_by_id(&self, value: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|node| self.attribute(*node, "id") == Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_builds_parent_links() {
        let mut tree = DomTree::new();
        let form = tree.append(tree.body(), ElementSpec::new("FORM")).unwrap();
        let input = tree
            .append(form, ElementSpec::new("input").attr("Name", "q"))
            .unwrap();

        assert_eq!(tree.tag(form), Some("form"));
        assert_eq!(tree.parent(input), Some(form));
        assert_eq!(tree.children(form), &[input]);
        assert_eq!(tree.attribute(input, "name"), Some("q"));
    }

    #[test]
    fn text_content_follows_document_order() {
        let mut tree = DomTree::new();
        let p = tree
            .append(tree.body(), ElementSpec::new("p").text("Hello "))
            .unwrap();
        tree.append(p, ElementSpec::new("b").text("big")).unwrap();
        tree.append(p, ElementSpec::new("i").text(" world")).unwrap();

        assert_eq!(tree.text_content(p), "Hello big world");
        assert_eq!(tree.descendants(tree.body()).len(), 3);
    }

    #[test]
    fn rejects_unknown_parent_and_bad_tag() {
        let mut tree = DomTree::new();
        assert_eq!(
            tree.append(NodeId(42), ElementSpec::new("div")),
            Err(LocatorError::UnknownNode(42))
        );
        assert!(matches!(
            tree.append(tree.body(), ElementSpec::new("")),
            Err(LocatorError::InvalidTag(_))
        ));
    }

    #[test]
    fn live_value_overrides_attribute() {
        let mut tree = DomTree::new();
        let input = tree
            .append(tree.body(), ElementSpec::new("input").attr("value", "seed"))
            .unwrap();
        assert_eq!(tree.value(input), Some("seed"));
        tree.set_value(input, "typed").unwrap();
        assert_eq!(tree.value(input), Some("typed"));
    }
}
