//! Selector grammar, escaping and document queries.

mod escape;
mod parser;

pub use escape::escape_ident;
pub use parser::Selector;

use mg_dom::Document;
use mg_dom::NodeId;
use parser::Combinator;
use parser::Compound;
use tracing::trace;

/// Query capability the anchoring code needs from a document host.
pub trait TreeQuery {
    /// Number of elements matching `selector`; zero for invalid selectors.
    fn count_matches(&self, selector: &str) -> usize;

    /// Matching elements in document order.
    fn find_all(&self, selector: &str) -> Vec<NodeId>;

    /// Number of elements carrying `class`.
    fn class_count(&self, class: &str) -> usize;
}

impl TreeQuery for Document {
    fn count_matches(&self, selector: &str) -> usize {
        self.find_all(selector).len()
    }

    fn find_all(&self, selector: &str) -> Vec<NodeId> {
        let Some(parsed) = Selector::parse(selector) else {
            trace!(selector, "ignoring unparsable selector");
            return Vec::new();
        };
        parsed.select_all(self)
    }

    fn class_count(&self, class: &str) -> usize {
        Document::class_count(self, class)
    }
}

impl Selector {
    pub fn select_all(&self, doc: &Document) -> Vec<NodeId> {
        doc.elements()
            .into_iter()
            .filter(|node| self.matches(doc, *node))
            .collect()
    }

    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        match self.compounds.len() {
            0 => false,
            len => self.matches_from(doc, len - 1, node),
        }
    }

    fn matches_from(&self, doc: &Document, index: usize, node: NodeId) -> bool {
        if !matches_compound(doc, &self.compounds[index], node) {
            return false;
        }
        if index == 0 {
            return true;
        }

        match self.combinators[index - 1] {
            Combinator::Child => doc
                .parent_element(node)
                .is_some_and(|parent| self.matches_from(doc, index - 1, parent)),
            Combinator::Descendant => {
                let mut cursor = doc.parent_element(node);
                while let Some(ancestor) = cursor {
                    if self.matches_from(doc, index - 1, ancestor) {
                        return true;
                    }
                    cursor = doc.parent_element(ancestor);
                }
                false
            }
        }
    }
}

fn matches_compound(doc: &Document, compound: &Compound, node: NodeId) -> bool {
    let Some(element) = doc.element(node) else {
        return false;
    };

    if let Some(tag) = &compound.tag {
        if !element.tag.eq_ignore_ascii_case(tag) {
            return false;
        }
    }

    if let Some(id) = &compound.id {
        if element.id() != Some(id.as_str()) {
            return false;
        }
    }

    if !compound.classes.iter().all(|class| element.has_class(class)) {
        return false;
    }

    match compound.nth_child {
        Some(expected) => doc.element_index(node) == Some(expected),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::TreeQuery;
    use super::escape_ident;
    use mg_dom::Document;
    use mg_dom::NodeId;

    fn attrs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect()
    }

    fn element(doc: &mut Document, parent: NodeId, tag: &str, pairs: &[(&str, &str)]) -> NodeId {
        doc.append_element(parent, tag, attrs(pairs))
            .unwrap_or_else(|_| unreachable!())
    }

    // html > body > (div#x > p.a.b > b, p.a, section > p.a)
    fn sample() -> (Document, Vec<NodeId>) {
        let mut doc = Document::new();
        let root = doc.root();
        let html = element(&mut doc, root, "html", &[]);
        let body = element(&mut doc, html, "body", &[]);
        let div = element(&mut doc, body, "div", &[("id", "x")]);
        let p1 = element(&mut doc, div, "p", &[("class", "a b")]);
        let bold = element(&mut doc, p1, "b", &[]);
        let p2 = element(&mut doc, body, "p", &[("class", "a")]);
        let section = element(&mut doc, body, "section", &[]);
        let p3 = element(&mut doc, section, "p", &[("class", "a")]);
        (doc, vec![html, body, div, p1, bold, p2, section, p3])
    }

    #[test]
    fn counts_simple_selectors() {
        let (doc, _) = sample();
        assert_eq!(doc.count_matches("p"), 3);
        assert_eq!(doc.count_matches("p.a"), 3);
        assert_eq!(doc.count_matches("p.b.a"), 1);
        assert_eq!(doc.count_matches("div#x"), 1);
        assert_eq!(doc.count_matches("div#y"), 0);
        assert_eq!(doc.count_matches("*"), 8);
    }

    #[test]
    fn child_combinator_requires_direct_parent() {
        let (doc, nodes) = sample();
        assert_eq!(doc.find_all("body > p.a"), vec![nodes[5]]);
        assert_eq!(doc.find_all("body p.a"), vec![nodes[3], nodes[5], nodes[7]]);
        assert_eq!(doc.find_all("div#x > p > b"), vec![nodes[4]]);
    }

    #[test]
    fn nth_child_counts_element_siblings() {
        let (doc, nodes) = sample();
        assert_eq!(doc.find_all("body > :nth-child(2)"), vec![nodes[5]]);
        assert_eq!(doc.find_all("p:nth-child(1)"), vec![nodes[3], nodes[7]]);
    }

    #[test]
    fn invalid_selectors_match_nothing() {
        let (doc, _) = sample();
        assert_eq!(doc.count_matches("p:hover"), 0);
        assert!(doc.find_all("> p").is_empty());
    }

    #[test]
    fn escaped_classes_match_their_elements() {
        let mut doc = Document::new();
        let root = doc.root();
        let html = element(&mut doc, root, "html", &[]);
        let weird = ["a b", "md:flex", "1col", "-2x", "w-1/2", "caf\u{e9}", "x\\y", "hover:"];
        let class_attr = weird.join(" ");
        let target = element(&mut doc, html, "div", &[("class", class_attr.as_str())]);
        let _ = element(&mut doc, html, "div", &[("class", "a b md flex col")]);

        for class in ["md:flex", "1col", "-2x", "w-1/2", "caf\u{e9}", "x\\y", "hover:"] {
            let selector = format!("div.{}", escape_ident(class));
            assert_eq!(doc.find_all(&selector), vec![target], "{selector}");
        }
    }
}
