//! Query and traversal over a view tree
//!
//! Depth-first searches by id or attribute, point containment tests, and a
//! generic traversal with pluggable per-node formatting. Searches return
//! the first match in document order; the `_or_raise` variants turn a miss
//! into a `ViewNotFound` carrying the attribute, the searched value and the
//! search root.

use crate::error::{DroidError, Result};
use crate::tree::{NodeId, ViewTree};
use regex::Regex;

/// Matcher for attribute searches: an exact value, or a regular expression
/// that must match the whole attribute value.
#[derive(Debug, Clone, Copy)]
pub enum AttrMatch<'a> {
    Exact(&'a str),
    Pattern(&'a Regex),
}

impl AttrMatch<'_> {
    fn matches(&self, value: &str) -> bool {
        match self {
            AttrMatch::Exact(expected) => value == *expected,
            AttrMatch::Pattern(re) => re
                .find(value)
                .is_some_and(|m| m.start() == 0 && m.end() == value.len()),
        }
    }

    fn describe(&self) -> String {
        match self {
            AttrMatch::Exact(expected) => (*expected).to_string(),
            AttrMatch::Pattern(re) => re.as_str().to_string(),
        }
    }
}

/// Nodes of a subtree in depth-first document order.
fn dfs_order(tree: &ViewTree, root: NodeId) -> Vec<NodeId> {
    let mut order = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        order.push(id);
        for &child in tree.node(id).children().iter().rev() {
            stack.push(child);
        }
    }
    order
}

fn id_matches(tree: &ViewTree, id: NodeId, searched: &str) -> bool {
    tree.node(id).unique_id() == searched || tree.resource_id(id) == Some(searched)
}

/// Find a node by canonical or synthesized unique id below `root`.
pub fn find_by_id(tree: &ViewTree, root: NodeId, searched: &str) -> Option<NodeId> {
    find_by_id_with(tree, root, searched, |_, _| true)
}

/// Like [`find_by_id`], with a predicate that may reject a structural
/// match; the search then continues.
pub fn find_by_id_with<F>(tree: &ViewTree, root: NodeId, searched: &str, predicate: F) -> Option<NodeId>
where
    F: Fn(&ViewTree, NodeId) -> bool,
{
    dfs_order(tree, root)
        .into_iter()
        .find(|&id| id_matches(tree, id, searched) && predicate(tree, id))
}

pub fn find_by_id_or_raise(tree: &ViewTree, root: NodeId, searched: &str) -> Result<NodeId> {
    find_by_id(tree, root, searched).ok_or_else(|| DroidError::ViewNotFound {
        attribute: tree.era().names().id.to_string(),
        value: searched.to_string(),
        root: tree.node(root).unique_id().to_string(),
    })
}

/// Find the first node in document order whose attribute matches.
pub fn find_by_attribute(
    tree: &ViewTree,
    root: NodeId,
    name: &str,
    matcher: AttrMatch<'_>,
) -> Option<NodeId> {
    dfs_order(tree, root).into_iter().find(|&id| {
        tree.node(id)
            .attr(name)
            .is_some_and(|value| matcher.matches(value))
    })
}

pub fn find_by_attribute_or_raise(
    tree: &ViewTree,
    root: NodeId,
    name: &str,
    matcher: AttrMatch<'_>,
) -> Result<NodeId> {
    find_by_attribute(tree, root, name, matcher).ok_or_else(|| DroidError::ViewNotFound {
        attribute: name.to_string(),
        value: matcher.describe(),
        root: tree.node(root).unique_id().to_string(),
    })
}

/// Find by the era-appropriate text attribute.
pub fn find_with_text(tree: &ViewTree, root: NodeId, matcher: AttrMatch<'_>) -> Option<NodeId> {
    find_by_attribute(tree, root, tree.era().names().text, matcher)
}

pub fn find_with_text_or_raise(
    tree: &ViewTree,
    root: NodeId,
    matcher: AttrMatch<'_>,
) -> Result<NodeId> {
    find_by_attribute_or_raise(tree, root, tree.era().names().text, matcher)
}

/// Find by the era-appropriate content-description attribute.
pub fn find_with_content_description(
    tree: &ViewTree,
    root: NodeId,
    matcher: AttrMatch<'_>,
) -> Option<NodeId> {
    find_by_attribute(tree, root, tree.era().names().content_description, matcher)
}

pub fn find_with_content_description_or_raise(
    tree: &ViewTree,
    root: NodeId,
    matcher: AttrMatch<'_>,
) -> Result<NodeId> {
    find_by_attribute_or_raise(tree, root, tree.era().names().content_description, matcher)
}

/// All nodes whose resolved bounds contain the point, in document order.
pub fn views_containing_point(tree: &ViewTree, point: (i32, i32)) -> Vec<NodeId> {
    views_containing_point_with(tree, point, |_, _| true)
}

/// Like [`views_containing_point`], restricted by a filter.
pub fn views_containing_point_with<F>(tree: &ViewTree, point: (i32, i32), filter: F) -> Vec<NodeId>
where
    F: Fn(&ViewTree, NodeId) -> bool,
{
    tree.ids()
        .filter(|&id| {
            tree.node(id)
                .bounds()
                .is_some_and(|b| b.contains(point.0, point.1))
                && filter(tree, id)
        })
        .collect()
}

/// Per-node formatter for [`traverse`]; returning `None` suppresses the
/// node's line without halting the traversal.
pub type NodeFormatter = fn(&ViewTree, NodeId) -> Option<String>;

/// Render a subtree, one line per node, indentation growing per depth
/// level.
pub fn traverse(tree: &ViewTree, root: NodeId, formatter: NodeFormatter) -> String {
    let mut out = String::new();
    traverse_into(tree, root, 0, formatter, &mut out);
    out
}

fn traverse_into(
    tree: &ViewTree,
    id: NodeId,
    depth: usize,
    formatter: NodeFormatter,
    out: &mut String,
) {
    if let Some(line) = formatter(tree, id) {
        out.push_str(&"   ".repeat(depth));
        out.push_str(&line);
        out.push('\n');
    }
    for &child in tree.node(id).children() {
        traverse_into(tree, child, depth + 1, formatter, out);
    }
}

fn base_line(tree: &ViewTree, id: NodeId) -> String {
    format!(
        "{} {} {}",
        tree.class_name(id).unwrap_or("<no class>"),
        tree.resource_id(id).filter(|v| !v.is_empty()).unwrap_or("NO_ID"),
        tree.text(id).unwrap_or("")
    )
}

/// class, id and text
pub fn format_class_id_text(tree: &ViewTree, id: NodeId) -> Option<String> {
    Some(base_line(tree, id))
}

/// class, id, text and the synthesized unique id
pub fn format_with_unique_id(tree: &ViewTree, id: NodeId) -> Option<String> {
    Some(format!("{} {}", base_line(tree, id), tree.node(id).unique_id()))
}

/// class, id, text and content description
pub fn format_with_content_description(tree: &ViewTree, id: NodeId) -> Option<String> {
    Some(format!(
        "{} {}",
        base_line(tree, id),
        tree.content_description(id).unwrap_or("")
    ))
}

/// class, id, text and the center of the resolved bounds
pub fn format_with_center(tree: &ViewTree, id: NodeId) -> Option<String> {
    let center = tree
        .center(id)
        .map(|(x, y)| format!("({}, {})", x, y))
        .unwrap_or_default();
    Some(format!("{} {}", base_line(tree, id), center))
}

/// class, id, text, position and size
pub fn format_with_position_size(tree: &ViewTree, id: NodeId) -> Option<String> {
    let geometry = tree
        .node(id)
        .bounds()
        .map(|b| format!("({}, {}) {}x{}", b.left, b.top, b.width(), b.height()))
        .unwrap_or_default();
    Some(format!("{} {}", base_line(tree, id), geometry))
}
