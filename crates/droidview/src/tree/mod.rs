//! View tree model
//!
//! All nodes of one dump live in a single arena vector owned by the tree,
//! in document order; parent and child links are indices into it. A tree is
//! rebuilt completely on every dump and a new dump invalidates every
//! previously handed out [`NodeId`].

pub mod compare;

use crate::config::Era;
use crate::error::{DroidError, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Index of a node in its tree's arena. Only valid for the tree that
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// Axis-aligned bounding box in screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn center(&self) -> (i32, i32) {
        (
            self.left + self.width() / 2,
            self.top + self.height() / 2,
        )
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }
}

/// View visibility as reported by the line-oriented dump. The XML dump only
/// contains visible nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Invisible,
    Gone,
}

impl Visibility {
    fn parse(value: &str) -> Visibility {
        match value {
            "VISIBLE" | "0" => Visibility::Visible,
            "INVISIBLE" | "4" => Visibility::Invisible,
            "GONE" | "8" => Visibility::Gone,
            _ => Visibility::Visible,
        }
    }
}

/// Which dump mechanism produced a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    ViewServer,
    UiAutomator,
}

/// One UI element
#[derive(Debug, Clone)]
pub struct ViewNode {
    attributes: HashMap<String, String>,
    unique_id: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    bounds: Option<Bounds>,
}

impl ViewNode {
    /// Raw attribute access; semantics of the keys depend on the backend.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }

    /// Dump-local unique id: the device-reported resource id when present
    /// and unique, else a synthesized `id/no_id/<n>`.
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Absolute screen bounds, once coordinate resolution has run.
    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    pub(crate) fn set_bounds(&mut self, bounds: Bounds) {
        self.bounds = Some(bounds);
    }
}

/// A fully linked view hierarchy from one dump
#[derive(Debug, Clone)]
pub struct ViewTree {
    nodes: Vec<ViewNode>,
    root: NodeId,
    by_id: HashMap<String, NodeId>,
    backend: Backend,
    era: Era,
}

impl ViewTree {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn era(&self) -> Era {
        self.era
    }

    pub fn node(&self, id: NodeId) -> &ViewNode {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut ViewNode {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in document order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn by_unique_id(&self, unique_id: &str) -> Option<NodeId> {
        self.by_id.get(unique_id).copied()
    }

    pub fn id_map(&self) -> &HashMap<String, NodeId> {
        &self.by_id
    }

    pub fn class_name(&self, id: NodeId) -> Option<&str> {
        self.node(id).attr("class")
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.node(id).attr(self.era.names().text)
    }

    pub fn content_description(&self, id: NodeId) -> Option<&str> {
        self.node(id).attr(self.era.names().content_description)
    }

    /// Device-reported id attribute, if any.
    pub fn resource_id(&self, id: NodeId) -> Option<&str> {
        self.node(id).attr(self.era.names().id)
    }

    pub fn visibility(&self, id: NodeId) -> Visibility {
        match self.era.names().visibility {
            Some(attr) => self
                .node(id)
                .attr(attr)
                .map(Visibility::parse)
                .unwrap_or(Visibility::Visible),
            // only visible nodes appear in the XML dump
            None => Visibility::Visible,
        }
    }

    fn numeric_attr(&self, id: NodeId, name: Option<&str>) -> i32 {
        name.and_then(|n| self.node(id).attr(n))
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// Reported left offset relative to the parent; zero when the node is
    /// not visible. Meaningless for the XML backend, whose bounds are
    /// already absolute.
    pub fn local_x(&self, id: NodeId) -> i32 {
        if self.visibility(id) != Visibility::Visible {
            return 0;
        }
        self.numeric_attr(id, self.era.names().left)
    }

    /// Reported top offset relative to the parent; zero when the node is
    /// not visible.
    pub fn local_y(&self, id: NodeId) -> i32 {
        if self.visibility(id) != Visibility::Visible {
            return 0;
        }
        self.numeric_attr(id, self.era.names().top)
    }

    /// Reported size of the node.
    pub fn size(&self, id: NodeId) -> (i32, i32) {
        if let Some(bounds) = self.node(id).bounds() {
            if self.backend == Backend::UiAutomator {
                return (bounds.width(), bounds.height());
            }
        }
        (
            self.numeric_attr(id, self.era.names().width),
            self.numeric_attr(id, self.era.names().height),
        )
    }

    pub fn center(&self, id: NodeId) -> Option<(i32, i32)> {
        self.node(id).bounds().map(|b| b.center())
    }

    /// Nested JSON export of the whole hierarchy.
    pub fn to_json(&self) -> Value {
        self.node_json(self.root)
    }

    fn node_json(&self, id: NodeId) -> Value {
        let node = self.node(id);
        json!({
            "uniqueId": node.unique_id(),
            "attributes": node.attributes(),
            "bounds": node.bounds(),
            "children": node
                .children()
                .iter()
                .map(|&child| self.node_json(child))
                .collect::<Vec<_>>(),
        })
    }
}

/// Incremental construction of a [`ViewTree`] by the dump parsers.
///
/// Owns unique-id assignment so both backends expose the same id scheme.
pub(crate) struct TreeBuilder {
    nodes: Vec<ViewNode>,
    by_id: HashMap<String, NodeId>,
    backend: Backend,
    era: Era,
    no_id_counter: usize,
}

impl TreeBuilder {
    pub(crate) fn new(backend: Backend, era: Era) -> Self {
        Self {
            nodes: Vec::new(),
            by_id: HashMap::new(),
            backend,
            era,
            no_id_counter: 0,
        }
    }

    fn alloc_no_id(&mut self) -> String {
        loop {
            let candidate = format!("id/no_id/{}", self.no_id_counter);
            self.no_id_counter += 1;
            if !self.by_id.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    fn smallest_unused_no_id(&self) -> String {
        let mut m = 0;
        loop {
            let candidate = format!("id/no_id/{}", m);
            if !self.by_id.contains_key(&candidate) {
                return candidate;
            }
            m += 1;
        }
    }

    pub(crate) fn push_node(
        &mut self,
        parent: Option<NodeId>,
        attributes: HashMap<String, String>,
        bounds: Option<Bounds>,
    ) -> Result<NodeId> {
        if parent.is_none() && !self.nodes.is_empty() {
            return Err(DroidError::parse(
                "dump contains more than one root",
                attributes
                    .get("class")
                    .cloned()
                    .unwrap_or_else(|| "<unknown>".to_string()),
            ));
        }
        let raw_id = attributes
            .get(self.era.names().id)
            .filter(|v| !v.is_empty() && v.as_str() != "NO_ID")
            .cloned();
        let unique_id = match raw_id {
            Some(real) if !self.by_id.contains_key(&real) => real,
            // duplicate real id: keep the raw value in the attribute map,
            // give the node the smallest unused synthetic id
            Some(_) => self.smallest_unused_no_id(),
            None => self.alloc_no_id(),
        };
        let id = NodeId(self.nodes.len());
        self.nodes.push(ViewNode {
            attributes,
            unique_id: unique_id.clone(),
            parent,
            children: Vec::new(),
            bounds,
        });
        self.by_id.insert(unique_id, id);
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(id);
        }
        Ok(id)
    }

    pub(crate) fn finish(self) -> Result<ViewTree> {
        if self.nodes.is_empty() {
            return Err(DroidError::parse("dump contains no nodes", ""));
        }
        Ok(ViewTree {
            nodes: self.nodes,
            root: NodeId(0),
            by_id: self.by_id,
            backend: self.backend,
            era: self.era,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_builder_links_parent_and_children() {
        let mut builder = TreeBuilder::new(Backend::ViewServer, Era::IceCreamSandwich);
        let root = builder.push_node(None, attrs(&[("class", "FrameLayout")]), None).unwrap();
        let a = builder
            .push_node(Some(root), attrs(&[("class", "TextView")]), None)
            .unwrap();
        let tree = builder.finish().unwrap();
        assert_eq!(tree.root(), root);
        assert_eq!(tree.node(root).children(), &[a]);
        assert_eq!(tree.node(a).parent(), Some(root));
    }

    #[test]
    fn test_unique_id_synthesis_and_real_ids() {
        let mut builder = TreeBuilder::new(Backend::ViewServer, Era::IceCreamSandwich);
        let root = builder.push_node(None, attrs(&[("mID", "NO_ID")]), None).unwrap();
        let a = builder
            .push_node(Some(root), attrs(&[("mID", "id/content")]), None)
            .unwrap();
        let b = builder.push_node(Some(root), attrs(&[]), None).unwrap();
        let tree = builder.finish().unwrap();
        assert_eq!(tree.node(root).unique_id(), "id/no_id/0");
        assert_eq!(tree.node(a).unique_id(), "id/content");
        assert_eq!(tree.node(b).unique_id(), "id/no_id/1");
        // node count equals id-map size; ids unique within the dump
        assert_eq!(tree.len(), tree.id_map().len());
    }

    #[test]
    fn test_duplicate_real_id_rewritten_to_smallest_unused() {
        let mut builder = TreeBuilder::new(Backend::ViewServer, Era::IceCreamSandwich);
        let root = builder.push_node(None, attrs(&[("mID", "id/dup")]), None).unwrap();
        let a = builder
            .push_node(Some(root), attrs(&[("mID", "id/dup")]), None)
            .unwrap();
        let tree = builder.finish().unwrap();
        assert_eq!(tree.node(root).unique_id(), "id/dup");
        assert_eq!(tree.node(a).unique_id(), "id/no_id/0");
        // the raw id survives in the attribute map
        assert_eq!(tree.node(a).attr("mID"), Some("id/dup"));
    }

    #[test]
    fn test_second_root_rejected() {
        let mut builder = TreeBuilder::new(Backend::ViewServer, Era::IceCreamSandwich);
        builder.push_node(None, attrs(&[]), None).unwrap();
        let err = builder.push_node(None, attrs(&[]), None).unwrap_err();
        assert!(matches!(err, DroidError::Parse { .. }));
    }

    #[test]
    fn test_local_position_gated_by_visibility() {
        let mut builder = TreeBuilder::new(Backend::ViewServer, Era::IceCreamSandwich);
        let root = builder
            .push_node(
                None,
                attrs(&[
                    ("layout:mLeft", "5"),
                    ("layout:mTop", "10"),
                    ("getVisibility()", "VISIBLE"),
                ]),
                None,
            )
            .unwrap();
        let gone = builder
            .push_node(
                Some(root),
                attrs(&[
                    ("layout:mLeft", "7"),
                    ("layout:mTop", "9"),
                    ("getVisibility()", "GONE"),
                ]),
                None,
            )
            .unwrap();
        let tree = builder.finish().unwrap();
        assert_eq!((tree.local_x(root), tree.local_y(root)), (5, 10));
        assert_eq!((tree.local_x(gone), tree.local_y(gone)), (0, 0));
        assert_eq!(tree.visibility(gone), Visibility::Gone);
    }

    #[test]
    fn test_bounds_geometry() {
        let bounds = Bounds::new(10, 20, 110, 220);
        assert_eq!(bounds.width(), 100);
        assert_eq!(bounds.height(), 200);
        assert_eq!(bounds.center(), (60, 120));
        assert!(bounds.contains(10, 20));
        assert!(bounds.contains(109, 219));
        assert!(!bounds.contains(110, 220));
    }

    #[test]
    fn test_to_json_shape() {
        let mut builder = TreeBuilder::new(Backend::UiAutomator, Era::JellyBean);
        let root = builder
            .push_node(None, attrs(&[("class", "android.widget.FrameLayout")]), Some(Bounds::new(0, 0, 100, 100)))
            .unwrap();
        builder
            .push_node(Some(root), attrs(&[("class", "android.widget.TextView")]), None)
            .unwrap();
        let tree = builder.finish().unwrap();
        let value = tree.to_json();
        assert_eq!(value["attributes"]["class"], "android.widget.FrameLayout");
        assert_eq!(value["children"].as_array().unwrap().len(), 1);
        assert_eq!(value["bounds"]["right"], 100);
    }
}
