//! DOM tree data structures.
//!
//! The document is an arena of nodes addressed by [`NodeId`]. Parent links
//! are plain ids, so traversal never needs shared ownership. Besides the tree
//! itself the document carries the host-side state the anchoring code talks
//! to: the live selection and the last scroll-into-view request.

use mg_core::MarginaliaError;
use mg_core::MarginaliaResult;
use std::cmp::Ordering;
use std::collections::HashMap;

/// ID used to address nodes in the DOM arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Element payload: lowercase tag name plus attributes in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    classes: Vec<String>,
}

impl Element {
    pub fn new(tag: impl Into<String>, attrs: Vec<(String, String)>) -> Self {
        let classes = attrs
            .iter()
            .find(|(name, _)| name == "class")
            .map(|(_, value)| {
                value
                    .split_ascii_whitespace()
                    .map(ToOwned::to_owned)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Self {
            tag: tag.into().to_ascii_lowercase(),
            attrs,
            classes,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Non-empty `id` attribute, if any.
    pub fn id(&self) -> Option<&str> {
        self.attr("id").filter(|value| !value.is_empty())
    }

    /// Class names in attribute order; duplicates are preserved.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes.iter().any(|class| class == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

/// A position inside the tree. Inside text nodes `offset` counts chars,
/// everywhere else it counts child positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryPoint {
    pub node: NodeId,
    pub offset: usize,
}

impl BoundaryPoint {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: BoundaryPoint,
    pub end: BoundaryPoint,
}

impl Range {
    pub fn new(start: BoundaryPoint, end: BoundaryPoint) -> Self {
        Self { start, end }
    }
}

/// Live selection. `anchor` is where the user started, `focus` where they
/// stopped; a backward selection has its focus before its anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub anchor: BoundaryPoint,
    pub focus: BoundaryPoint,
}

impl Selection {
    pub fn new(anchor: BoundaryPoint, focus: BoundaryPoint) -> Self {
        Self { anchor, focus }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    pub fn to_range(&self) -> Range {
        Range::new(self.anchor, self.focus)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScrollBlock {
    #[default]
    Start,
    Center,
    End,
    Nearest,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScrollBehavior {
    #[default]
    Auto,
    Smooth,
    Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollOptions {
    pub block: ScrollBlock,
    pub behavior: ScrollBehavior,
}

/// Recorded scroll-into-view side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollRequest {
    pub node: NodeId,
    pub options: ScrollOptions,
}

/// Document model: node arena plus host-side selection state.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    class_index: HashMap<String, usize>,
    selection: Option<Selection>,
    scroll_request: Option<ScrollRequest>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Document,
            }],
            class_index: HashMap::new(),
            selection: None,
            scroll_request: None,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn append_element(
        &mut self,
        parent: NodeId,
        tag: &str,
        attrs: Vec<(String, String)>,
    ) -> MarginaliaResult<NodeId> {
        let element = Element::new(tag, attrs);
        let mut seen: Vec<&str> = Vec::new();
        for class in element.classes() {
            if seen.contains(&class.as_str()) {
                continue;
            }
            seen.push(class);
            *self.class_index.entry(class.clone()).or_insert(0) += 1;
        }
        self.append_node(parent, NodeKind::Element(element))
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> MarginaliaResult<NodeId> {
        self.append_node(parent, NodeKind::Text(text.to_owned()))
    }

    fn append_node(&mut self, parent: NodeId, kind: NodeKind) -> MarginaliaResult<NodeId> {
        match self.nodes.get(parent.0).map(|node| &node.kind) {
            None => {
                return Err(MarginaliaError::new(
                    "dom.parent_unknown",
                    format!("node {} does not exist", parent.0),
                ));
            }
            Some(NodeKind::Text(_)) => {
                return Err(MarginaliaError::new(
                    "dom.parent_is_text",
                    format!("text node {} cannot have children", parent.0),
                ));
            }
            Some(_) => {}
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: Some(parent),
            children: Vec::new(),
            kind,
        });
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    /// Unlinks `node` and its subtree from the tree. Ids stay allocated but
    /// the subtree is no longer reachable from the root.
    pub fn detach(&mut self, node: NodeId) -> MarginaliaResult<()> {
        let Some(parent) = self.parent(node) else {
            return Err(MarginaliaError::new(
                "dom.detach_root",
                format!("node {} has no parent to detach from", node.0),
            ));
        };

        let mut subtree = vec![node];
        subtree.extend(self.descendants(node));
        for id in subtree {
            let NodeKind::Element(element) = &self.nodes[id.0].kind else {
                continue;
            };
            let mut seen: Vec<&str> = Vec::new();
            for class in element.classes() {
                if seen.contains(&class.as_str()) {
                    continue;
                }
                seen.push(class);
                if let Some(count) = self.class_index.get_mut(class) {
                    *count = count.saturating_sub(1);
                }
            }
        }

        self.nodes[parent.0].children.retain(|child| *child != node);
        self.nodes[node.0].parent = None;
        Ok(())
    }

    pub fn kind(&self, node: NodeId) -> Option<&NodeKind> {
        self.nodes.get(node.0).map(|node| &node.kind)
    }

    pub fn element(&self, node: NodeId) -> Option<&Element> {
        match self.kind(node) {
            Some(NodeKind::Element(element)) => Some(element),
            _ => None,
        }
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        match self.kind(node) {
            Some(NodeKind::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn is_text(&self, node: NodeId) -> bool {
        self.text(node).is_some()
    }

    /// `tag` for elements, `#text` and `#document` otherwise.
    pub fn node_name(&self, node: NodeId) -> &str {
        match self.kind(node) {
            Some(NodeKind::Element(element)) => element.tag.as_str(),
            Some(NodeKind::Text(_)) => "#text",
            Some(NodeKind::Document) | None => "#document",
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0).and_then(|node| node.parent)
    }

    /// Closest ancestor that is an element.
    pub fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.parent(node).filter(|parent| self.element(*parent).is_some())
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(node.0)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    pub fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        self.children(node)
            .iter()
            .copied()
            .filter(|child| self.element(*child).is_some())
            .collect()
    }

    /// Position of `node` among all of its parent's child nodes.
    pub fn child_index(&self, node: NodeId) -> Option<usize> {
        let parent = self.parent(node)?;
        self.children(parent).iter().position(|child| *child == node)
    }

    /// 1-based position among element siblings (`nth-child` numbering).
    pub fn element_index(&self, node: NodeId) -> Option<usize> {
        let parent = self.parent(node)?;
        self.element_children(parent)
            .iter()
            .position(|child| *child == node)
            .map(|index| index + 1)
    }

    /// The single element directly under the root (normally `<html>`).
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root())
            .iter()
            .copied()
            .find(|child| self.element(*child).is_some())
    }

    /// Root-to-node chain, `node` last. Stops early for detached subtrees.
    pub fn ancestors_inclusive(&self, node: NodeId) -> Vec<NodeId> {
        let mut chain = vec![node];
        let mut cursor = self.parent(node);
        while let Some(current) = cursor {
            chain.push(current);
            cursor = self.parent(current);
        }
        chain.reverse();
        chain
    }

    pub fn is_attached(&self, node: NodeId) -> bool {
        self.ancestors_inclusive(node).first() == Some(&self.root())
    }

    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Descendants of `node` in document order, `node` excluded.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    /// All attached elements in document order.
    pub fn elements(&self) -> Vec<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .filter(|node| self.element(*node).is_some())
            .collect()
    }

    pub fn text_content(&self, node: NodeId) -> String {
        if let Some(text) = self.text(node) {
            return text.to_owned();
        }

        let mut out = String::new();
        for descendant in self.descendants(node) {
            if let Some(text) = self.text(descendant) {
                out.push_str(text);
            }
        }
        out
    }

    /// Number of elements carrying `class`.
    pub fn class_count(&self, class: &str) -> usize {
        self.class_index.get(class).copied().unwrap_or(0)
    }

    /// Largest valid offset for a boundary point inside `node`.
    pub fn max_offset(&self, node: NodeId) -> usize {
        match self.text(node) {
            Some(text) => text.chars().count(),
            None => self.children(node).len(),
        }
    }

    pub fn is_valid_point(&self, point: BoundaryPoint) -> bool {
        self.kind(point.node).is_some()
            && self.is_attached(point.node)
            && point.offset <= self.max_offset(point.node)
    }

    pub fn compare_points(&self, left: BoundaryPoint, right: BoundaryPoint) -> Ordering {
        self.point_key(left).cmp(&self.point_key(right))
    }

    fn point_key(&self, point: BoundaryPoint) -> Vec<usize> {
        let chain = self.ancestors_inclusive(point.node);
        let mut key = Vec::with_capacity(chain.len() + 1);
        for node in chain.iter().skip(1) {
            key.push(self.child_index(*node).unwrap_or(0));
        }
        key.push(point.offset);
        key
    }

    /// Text covered by `range`, or `None` if either boundary is invalid.
    /// Boundaries given in reverse document order are swapped.
    pub fn range_text(&self, range: &Range) -> Option<String> {
        if !self.is_valid_point(range.start) || !self.is_valid_point(range.end) {
            return None;
        }

        let (start, end) = match self.compare_points(range.start, range.end) {
            Ordering::Greater => (range.end, range.start),
            _ => (range.start, range.end),
        };
        let start_key = self.point_key(start);
        let end_key = self.point_key(end);

        let mut out = String::new();
        for node in self.descendants(self.root()) {
            let Some(text) = self.text(node) else {
                continue;
            };
            let len = text.chars().count();
            let from = if start.node == node {
                start.offset
            } else if start_key <= self.point_key(BoundaryPoint::new(node, 0)) {
                0
            } else {
                len
            };
            let to = if end.node == node {
                end.offset
            } else if self.point_key(BoundaryPoint::new(node, len)) <= end_key {
                len
            } else {
                0
            };
            if from < to {
                out.extend(text.chars().skip(from).take(to - from));
            }
        }

        Some(out)
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = Some(selection);
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    pub fn scroll_into_view(&mut self, node: NodeId, options: ScrollOptions) {
        self.scroll_request = Some(ScrollRequest { node, options });
    }

    pub fn scroll_request(&self) -> Option<&ScrollRequest> {
        self.scroll_request.as_ref()
    }
}
