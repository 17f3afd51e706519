//! Live-page DOM snapshots for selector diagnosis.
//!
//! [`dump_script`] serialises `document.body` into a flat node list that
//! [`DomSnapshot::into_tree`] rebuilds as a [`DomTree`]. Selectors computed on
//! the tree can then be checked against the live page with
//! [`count_matches_script`].

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::dom::{DomTree, ElementSpec, NodeId};
use crate::errors::LocatorError;
use crate::selector::selector_for;

/// Upper bound on serialised nodes per snapshot.
pub const SNAPSHOT_NODE_LIMIT: usize = 5000;

/// Elements reported by the diagnosis.
pub const INTERACTIVE_QUERY: &str =
    "a,button,input,select,textarea,[role=\"button\"],[onclick]";

/// Expression returning the JSON-encoded [`DomSnapshot`] of the current page.
pub fn dump_script() -> String {
    format!(
        r#"(() => {{
  const limit = {limit};
  const interactive = {query};
  const nodes = [];
  const walk = (el, parent) => {{
    if (nodes.length >= limit) return;
    const id = nodes.length;
    let text = '';
    for (const child of el.childNodes) {{
      if (child.nodeType === 3) text += child.textContent;
    }}
    nodes.push({{
      tag: el.tagName.toLowerCase(),
      attrs: Array.from(el.attributes).map((a) => [a.name, a.value]),
      text,
      value: typeof el.value === 'string' ? el.value : null,
      parent,
      interactive: parent !== null && el.matches(interactive),
    }});
    for (const child of el.children) walk(child, id);
  }};
  walk(document.body, null);
  return JSON.stringify({{ url: location.href, nodes }});
}})()"#,
        limit = SNAPSHOT_NODE_LIMIT,
        query = serde_json::Value::String(INTERACTIVE_QUERY.to_string()),
    )
}

/// Expression returning a JSON array with the live match count of each
/// selector, `-1` for selectors the page rejects.
pub fn count_matches_script(selectors: &[String]) -> String {
    let encoded = serde_json::to_string(selectors).unwrap_or_else(|_| "[]".to_string());
    format!(
        "(() => JSON.stringify({encoded}.map((s) => {{ try {{ return document.querySelectorAll(s).length; }} catch (e) {{ return -1; }} }})))()"
    )
}

pub fn parse_match_counts(raw: &str) -> Result<Vec<Option<usize>>, LocatorError> {
    let counts: Vec<i64> =
        serde_json::from_str(raw).map_err(|err| LocatorError::InvalidSnapshot(err.to_string()))?;
    Ok(counts
        .into_iter()
        .map(|count| usize::try_from(count).ok())
        .collect())
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub tag: String,
    #[serde(default)]
    pub attrs: Vec<(String, String)>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub parent: Option<usize>,
    #[serde(default)]
    pub interactive: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DomSnapshot {
    #[serde(default)]
    pub url: String,
    pub nodes: Vec<SnapshotNode>,
}

impl DomSnapshot {
    pub fn from_json(raw: &str) -> Result<Self, LocatorError> {
        serde_json::from_str(raw).map_err(|err| LocatorError::InvalidSnapshot(err.to_string()))
    }

    /// Rebuilds the tree. Node 0 is the body; every other node must name an
    /// earlier node as parent. Elements with unusable tags are skipped along
    /// with their subtree. Returns the tree and its interactive elements.
    pub fn into_tree(self) -> Result<(DomTree, Vec<NodeId>), LocatorError> {
        let mut tree = DomTree::new();
        if let Ok(url) = Url::parse(&self.url) {
            tree = tree.with_base_url(url);
        }

        let mut mapped: Vec<Option<NodeId>> = Vec::with_capacity(self.nodes.len());
        let mut interactive = Vec::new();
        for (index, node) in self.nodes.into_iter().enumerate() {
            let Some(parent_index) = node.parent else {
                if index != 0 {
                    return Err(LocatorError::InvalidSnapshot(format!(
                        "node {index} has no parent"
                    )));
                }
                mapped.push(Some(tree.body()));
                continue;
            };
            if parent_index >= index {
                return Err(LocatorError::InvalidSnapshot(format!(
                    "node {index} references later parent {parent_index}"
                )));
            }
            let Some(parent) = mapped[parent_index] else {
                mapped.push(None);
                continue;
            };

            let spec = node
                .attrs
                .into_iter()
                .fold(ElementSpec::new(node.tag.clone()), |spec, (name, value)| {
                    spec.attr(name, value)
                })
                .text(node.text);
            match tree.append(parent, spec) {
                Ok(id) => {
                    if let Some(value) = node.value {
                        tree.set_value(id, value)?;
                    }
                    if node.interactive {
                        interactive.push(id);
                    }
                    mapped.push(Some(id));
                }
                Err(err) => {
                    debug!(target: "action-locator", tag = %node.tag, %err, "skipping snapshot node");
                    mapped.push(None);
                }
            }
        }
        Ok((tree, interactive))
    }
}

/// Diagnosis line for one interactive element.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorReport {
    pub tag: String,
    pub selector: String,
    /// Live match count; `None` until checked or when the page rejected it.
    pub matches: Option<usize>,
}

impl SelectorReport {
    pub fn is_unique(&self) -> bool {
        self.matches == Some(1)
    }
}

/// Runs the selector engine over `targets`.
pub fn diagnose(tree: &DomTree, targets: &[NodeId]) -> Vec<SelectorReport> {
    targets
        .iter()
        .map(|node| SelectorReport {
            tag: tree.tag(*node).unwrap_or_default().to_string(),
            selector: selector_for(tree, *node),
            matches: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> DomSnapshot {
        serde_json::from_value(json!({
            "url": "https://example.com/search",
            "nodes": [
                {"tag": "body", "parent": null},
                {"tag": "form", "attrs": [["id", "search"]], "parent": 0},
                {"tag": "input", "attrs": [["name", "q"]], "value": "rust", "parent": 1, "interactive": true},
                {"tag": "bad:tag", "parent": 1},
                {"tag": "button", "parent": 3, "interactive": true},
                {"tag": "button", "attrs": [["class", "Ab3xQzT9mKpLsYh2"]], "text": "Go", "parent": 1, "interactive": true}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn rebuilds_tree_and_skips_invalid_subtrees() {
        let (tree, interactive) = sample().into_tree().unwrap();
        assert_eq!(interactive.len(), 2);
        assert_eq!(tree.value(interactive[0]), Some("rust"));
        assert_eq!(tree.base_url().map(|u| u.as_str()), Some("https://example.com/search"));

        let reports = diagnose(&tree, &interactive);
        assert_eq!(reports[0].selector, "[name=\"q\"]");
        assert_eq!(reports[1].selector, "#search > button");
    }

    #[test]
    fn rejects_forward_parent_references() {
        let snapshot: DomSnapshot = serde_json::from_value(json!({
            "nodes": [{"tag": "body"}, {"tag": "div", "parent": 2}]
        }))
        .unwrap();
        assert!(matches!(snapshot.into_tree(), Err(LocatorError::InvalidSnapshot(_))));
    }

    #[test]
    fn match_counts_mark_rejected_selectors() {
        let counts = parse_match_counts("[1, 0, -1, 3]").unwrap();
        assert_eq!(counts, vec![Some(1), Some(0), None, Some(3)]);

        let script = count_matches_script(&["#a".to_string(), "[name=\"q\"]".to_string()]);
        assert!(script.contains(r##"["#a","[name=\"q\"]"]"##));
        assert!(dump_script().contains("document.body"));
    }
}
