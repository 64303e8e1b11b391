use mg_dom::BoundaryPoint;
use mg_dom::Document;
use mg_dom::NodeId;

/// A live selection endpoint, split by what it points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePoint {
    /// Inside a text node. `node` is the element holding that text node and
    /// `parent_offset` is the text node's index among the element's children.
    Text {
        node: NodeId,
        char_offset: usize,
        parent_offset: usize,
    },
    /// Between the children of `node`.
    Structural { node: NodeId, offset: usize },
}

impl NodePoint {
    /// `None` when the point sits in a text node without a parent element.
    pub fn describe(doc: &Document, point: BoundaryPoint) -> Option<Self> {
        if !doc.is_text(point.node) {
            doc.kind(point.node)?;
            return Some(Self::Structural {
                node: point.node,
                offset: point.offset,
            });
        }

        let node = doc.parent_element(point.node)?;
        let parent_offset = doc.child_index(point.node)?;
        Some(Self::Text {
            node,
            char_offset: point.offset,
            parent_offset,
        })
    }

    /// The node the structural path is computed for.
    pub fn container(&self) -> NodeId {
        match self {
            Self::Text { node, .. } | Self::Structural { node, .. } => *node,
        }
    }

    pub fn offset(&self) -> usize {
        match self {
            Self::Text { char_offset, .. } => *char_offset,
            Self::Structural { offset, .. } => *offset,
        }
    }

    pub fn parent_offset(&self) -> Option<usize> {
        match self {
            Self::Text { parent_offset, .. } => Some(*parent_offset),
            Self::Structural { .. } => None,
        }
    }
}
