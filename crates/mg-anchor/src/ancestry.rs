//! Common ancestors and positional paths.

use mg_core::MarginaliaError;
use mg_dom::Document;
use mg_dom::NodeId;
use std::fmt;
use std::str::FromStr;

/// Deepest node containing both `a` and `b`, or `None` when they live in
/// different trees. For attached nodes the root and the document element are
/// always shared.
pub fn common_parent(doc: &Document, a: NodeId, b: NodeId) -> Option<NodeId> {
    if a == b {
        return Some(a);
    }

    let chain_a = doc.ancestors_inclusive(a);
    let chain_b = doc.ancestors_inclusive(b);
    let mut common = None;
    for (left, right) in chain_a.iter().zip(chain_b.iter()) {
        if left != right {
            break;
        }
        common = Some(*left);
    }
    common
}

/// Purely positional path: 1-based element positions, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuralPath(Vec<usize>);

impl StructuralPath {
    pub fn steps(&self) -> &[usize] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Walks the path down from `scope`.
    pub fn resolve(&self, doc: &Document, scope: NodeId) -> Option<NodeId> {
        let mut node = scope;
        for step in &self.0 {
            let index = step.checked_sub(1)?;
            node = *doc.element_children(node).get(index)?;
        }
        Some(node)
    }
}

impl fmt::Display for StructuralPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, step) in self.0.iter().enumerate() {
            if position > 0 {
                f.write_str(" > ")?;
            }
            write!(f, ":nth-child({step})")?;
        }
        Ok(())
    }
}

impl FromStr for StructuralPath {
    type Err = MarginaliaError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut steps = Vec::new();
        for part in input.split('>') {
            let step = part
                .trim()
                .strip_prefix(":nth-child(")
                .and_then(|rest| rest.strip_suffix(')'))
                .and_then(|digits| digits.trim().parse::<usize>().ok())
                .filter(|step| *step > 0)
                .ok_or_else(|| {
                    MarginaliaError::new(
                        "anchor.structural_path_invalid",
                        format!("invalid structural path step `{}`", part.trim()),
                    )
                })?;
            steps.push(step);
        }

        Ok(Self(steps))
    }
}

/// Positional path from `ancestor` down to the element `descendant`.
/// Returns `None` if `descendant` is not an element inside `ancestor`.
pub fn absolute_path(doc: &Document, ancestor: NodeId, descendant: NodeId) -> Option<StructuralPath> {
    let mut steps = Vec::new();
    let mut node = descendant;
    while node != ancestor {
        steps.push(doc.element_index(node)?);
        node = doc.parent(node)?;
    }
    steps.reverse();
    Some(StructuralPath(steps))
}
