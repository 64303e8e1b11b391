//! Minimal unique selector search.
//!
//! Starting at a node, pick the candidate fragment that matches the fewest
//! elements (then the shortest, then the lexicographically smallest). If it
//! is not unique, try prefixing it with the parent's best fragment and keep
//! whichever side matches fewer elements, preferring the shallower one on
//! ties.

use crate::AnchorConfig;
use crate::descriptor::descriptors;
use mg_dom::Document;
use mg_dom::NodeId;
use mg_selector::TreeQuery;
use std::collections::HashMap;
use tracing::trace;

/// A selector together with the number of elements it matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredSelector {
    pub selector: String,
    pub matches: usize,
}

/// Request-scoped resolver. Owns the match-count, class-count and per-node
/// path caches, so a fresh resolver sees the current tree.
#[derive(Debug)]
pub struct PathResolver<'d> {
    doc: &'d Document,
    max_classes: usize,
    match_counts: HashMap<String, usize>,
    class_counts: HashMap<String, usize>,
    paths: HashMap<NodeId, ScoredSelector>,
}

impl<'d> PathResolver<'d> {
    pub fn new(doc: &'d Document, config: &AnchorConfig) -> Self {
        Self {
            doc,
            max_classes: config.max_classes,
            match_counts: HashMap::new(),
            class_counts: HashMap::new(),
            paths: HashMap::new(),
        }
    }

    /// Memoized `count_matches` over the whole document.
    pub fn count_matches(&mut self, selector: &str) -> usize {
        if let Some(count) = self.match_counts.get(selector) {
            return *count;
        }
        let count = self.doc.count_matches(selector);
        self.match_counts.insert(selector.to_owned(), count);
        count
    }

    pub fn descriptors(&mut self, node: NodeId) -> Vec<String> {
        let doc = self.doc;
        let class_counts = &mut self.class_counts;
        descriptors(doc, node, self.max_classes, |class| {
            *class_counts
                .entry(class.to_owned())
                .or_insert_with(|| doc.class_count(class))
        })
    }

    /// Simplest selector for `node`. Text nodes are addressed through their
    /// parent element; the document node has no selector.
    pub fn simplest_path(&mut self, node: NodeId) -> Option<ScoredSelector> {
        self.resolve(node, None)
    }

    fn resolve(&mut self, node: NodeId, suffix: Option<&str>) -> Option<ScoredSelector> {
        if self.doc.is_text(node) {
            let parent = self.doc.parent_element(node)?;
            return self.resolve(parent, suffix);
        }
        self.doc.element(node)?;

        if suffix.is_none() {
            if let Some(cached) = self.paths.get(&node) {
                return Some(cached.clone());
            }
        }

        let mut scored = Vec::new();
        for fragment in self.descriptors(node) {
            let selector = match suffix {
                Some(suffix) => format!("{fragment} > {suffix}"),
                None => fragment,
            };
            let matches = self.count_matches(&selector);
            trace!(selector = selector.as_str(), matches, "scored candidate");
            scored.push(ScoredSelector { selector, matches });
        }
        scored.sort_by(|left, right| {
            left.matches
                .cmp(&right.matches)
                .then_with(|| left.selector.len().cmp(&right.selector.len()))
                .then_with(|| left.selector.cmp(&right.selector))
        });
        let best = scored.into_iter().next()?;

        let topmost = self.doc.document_element() == Some(node);
        let chosen = if topmost || best.matches == 1 {
            best
        } else {
            let climbed = match self.doc.parent_element(node) {
                Some(parent) => self.resolve(parent, Some(&best.selector)),
                None => None,
            };
            match climbed {
                Some(climbed) if climbed.matches < best.matches => climbed,
                _ => best,
            }
        };

        if suffix.is_none() {
            self.paths.insert(node, chosen.clone());
        }
        Some(chosen)
    }
}
