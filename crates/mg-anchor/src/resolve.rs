use crate::AnchorConfig;
use crate::ancestry::StructuralPath;
use crate::record::SelectionRecord;
use crate::record::TrimmedPoint;
use mg_core::MarginaliaResult;
use mg_core::squish;
use mg_dom::BoundaryPoint;
use mg_dom::Document;
use mg_dom::NodeId;
use mg_dom::Range;
use mg_dom::Selection;
use mg_selector::TreeQuery;
use std::fmt;
use thiserror::Error;
use tracing::debug;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Anchor,
    Focus,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anchor => f.write_str("anchor"),
            Self::Focus => f.write_str("focus"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelocateError {
    #[error("no element matches the recorded selector and context")]
    NoMatch,
    #[error("{0} point cannot be resolved in the matched element")]
    MissingPoint(Endpoint),
    #[error("reselected text `{found}` differs from recorded phrase `{expected}`")]
    IntegrityMismatch { expected: String, found: String },
}

/// Finds a recorded selection in a document and reselects it.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    config: AnchorConfig,
}

impl Resolver {
    pub fn new(config: AnchorConfig) -> MarginaliaResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// First element matching the recorded selector whose squished text
    /// contains `before + phrase + after`.
    pub fn find_selection(&self, doc: &Document, record: &SelectionRecord) -> Option<NodeId> {
        let context = record.context();
        doc.find_all(&record.selection.path)
            .into_iter()
            .find(|node| squish(&doc.text_content(*node)).contains(&context))
    }

    /// Rebuilds the recorded range and commits it as the live selection.
    /// The live selection is left untouched on failure.
    pub fn highlight_selection(
        &self,
        doc: &mut Document,
        record: &SelectionRecord,
    ) -> Result<Range, RelocateError> {
        let candidate = self
            .find_selection(doc, record)
            .ok_or(RelocateError::NoMatch)?;

        let anchor = record.selection.anchor.as_ref();
        let focus = record.selection.focus.as_ref();
        let anchor_container = locate(doc, candidate, anchor, Endpoint::Anchor)?;
        let focus_container = locate(doc, candidate, focus, Endpoint::Focus)?;

        doc.scroll_into_view(anchor_container, self.config.scroll);

        let start = boundary(doc, anchor_container, anchor, Endpoint::Anchor)?;
        let end = boundary(doc, focus_container, focus, Endpoint::Focus)?;
        let range = Range::new(start, end);

        let found = squish(&doc.range_text(&range).unwrap_or_default());
        if found != record.phrase {
            warn!(
                expected = record.phrase.as_str(),
                found = found.as_str(),
                "relocated range failed integrity check"
            );
            return Err(RelocateError::IntegrityMismatch {
                expected: record.phrase.clone(),
                found,
            });
        }

        debug!(phrase = record.phrase.as_str(), "relocated selection");
        doc.set_selection(Selection::new(start, end));
        Ok(range)
    }
}

fn locate(
    doc: &Document,
    candidate: NodeId,
    point: Option<&TrimmedPoint>,
    endpoint: Endpoint,
) -> Result<NodeId, RelocateError> {
    let point = point.ok_or(RelocateError::MissingPoint(endpoint))?;
    let path = point
        .path
        .parse::<StructuralPath>()
        .map_err(|_| RelocateError::MissingPoint(endpoint))?;
    path.resolve(doc, candidate)
        .ok_or(RelocateError::MissingPoint(endpoint))
}

fn boundary(
    doc: &Document,
    container: NodeId,
    point: Option<&TrimmedPoint>,
    endpoint: Endpoint,
) -> Result<BoundaryPoint, RelocateError> {
    let point = point.ok_or(RelocateError::MissingPoint(endpoint))?;
    let node = match point.parent_offset {
        Some(index) => *doc
            .children(container)
            .get(index)
            .ok_or(RelocateError::MissingPoint(endpoint))?,
        None => container,
    };

    let boundary = BoundaryPoint::new(node, point.offset);
    if !doc.is_valid_point(boundary) {
        return Err(RelocateError::MissingPoint(endpoint));
    }
    Ok(boundary)
}

/// [`Resolver::find_selection`] with the default configuration.
pub fn find_selection(doc: &Document, record: &SelectionRecord) -> Option<NodeId> {
    Resolver::default().find_selection(doc, record)
}

/// [`Resolver::highlight_selection`] with the default configuration.
pub fn highlight_selection(doc: &mut Document, record: &SelectionRecord) -> Result<Range, RelocateError> {
    Resolver::default().highlight_selection(doc, record)
}

pub fn highlight(doc: &mut Document, record: &SelectionRecord) -> bool {
    highlight_selection(doc, record).is_ok()
}

#[cfg(test)]
mod tests {
    use super::Endpoint;
    use super::RelocateError;
    use super::find_selection;
    use super::highlight;
    use super::highlight_selection;
    use crate::capture::wrap_selection;
    use crate::record::SelectionRecord;
    use mg_dom::BoundaryPoint;
    use mg_dom::Document;
    use mg_dom::NodeId;
    use mg_dom::ScrollBlock;
    use mg_dom::Selection;
    use mg_html::HtmlParser;

    fn find(doc: &Document, tag: &str, nth: usize) -> NodeId {
        doc.elements()
            .into_iter()
            .filter(|node| doc.node_name(*node) == tag)
            .nth(nth)
            .unwrap_or_else(|| unreachable!())
    }

    fn select(doc: &mut Document, text: NodeId, from: usize, to: usize) {
        doc.set_selection(Selection::new(BoundaryPoint::new(text, from), BoundaryPoint::new(text, to)));
    }

    #[test]
    fn capture_then_highlight_reselects_phrase() {
        let mut doc = HtmlParser.parse("<div id=\"x\"><p class=\"a b\">Hello <b>world</b>!</p></div>");
        let bold = find(&doc, "b", 0);
        let text = doc.children(bold)[0];
        select(&mut doc, text, 0, 5);
        let record = wrap_selection(&doc).unwrap_or_else(|| unreachable!());

        doc.clear_selection();
        let range = highlight_selection(&mut doc, &record).unwrap_or_else(|_| unreachable!());
        assert_eq!(doc.range_text(&range), Some("world".to_owned()));
        assert_eq!(doc.selection().map(|selection| selection.anchor.node), Some(text));

        let scroll = doc.scroll_request().unwrap_or_else(|| unreachable!());
        assert_eq!(scroll.node, bold);
        assert_eq!(scroll.options.block, ScrollBlock::Center);
    }

    #[test]
    fn context_disambiguates_identical_structures() {
        let html = "<p>foo bar</p><p>foo baz</p>";
        let mut doc = HtmlParser.parse(html);
        let first = find(&doc, "p", 0);
        let text = doc.children(first)[0];
        select(&mut doc, text, 4, 7);
        let record = wrap_selection(&doc).unwrap_or_else(|| unreachable!());
        assert_eq!(record.phrase, "bar");

        let mut replay = HtmlParser.parse(html);
        assert!(highlight(&mut replay, &record));
        let replay_first = find(&replay, "p", 0);
        let selection = replay.selection().unwrap_or_else(|| unreachable!());
        assert_eq!(selection.anchor.node, replay.children(replay_first)[0]);
    }

    #[test]
    fn removed_target_reports_no_match() {
        let html = "<div><p class=\"note\">keep this</p></div><div><p class=\"other\">unrelated</p></div>";
        let mut doc = HtmlParser.parse(html);
        let note = find(&doc, "p", 0);
        let text = doc.children(note)[0];
        select(&mut doc, text, 0, 4);
        let record = wrap_selection(&doc).unwrap_or_else(|| unreachable!());

        let mut edited = HtmlParser.parse(html);
        let target = find(&edited, "p", 0);
        edited.detach(target).unwrap_or_else(|_| unreachable!());
        assert_eq!(find_selection(&edited, &record), None);
        assert_eq!(highlight_selection(&mut edited, &record), Err(RelocateError::NoMatch));
        assert!(edited.selection().is_none());
    }

    #[test]
    fn changed_text_fails_integrity_without_touching_selection() {
        let record = SelectionRecord::from_json(
            r#"{"phrase":"cat","before":"","after":"","selection":{
                "path":"p","anchor":{"path":"","offset":0,"parentOffset":0},
                "focus":{"path":"","offset":3,"parentOffset":0}}}"#,
        )
        .unwrap_or_else(|_| unreachable!());

        let mut doc = HtmlParser.parse("<p>a cat</p>");
        let p = find(&doc, "p", 0);
        let text = doc.children(p)[0];
        select(&mut doc, text, 0, 1);
        let before = doc.selection().copied();

        let result = highlight_selection(&mut doc, &record);
        assert_eq!(
            result,
            Err(RelocateError::IntegrityMismatch {
                expected: "cat".to_owned(),
                found: "a c".to_owned(),
            })
        );
        assert_eq!(doc.selection().copied(), before);
    }

    #[test]
    fn missing_points_are_reported() {
        let record = SelectionRecord::from_json(
            r#"{"phrase":"x","before":"","after":"","selection":{"path":"p",
                "anchor":{"path":":nth-child(3)","offset":0}}}"#,
        )
        .unwrap_or_else(|_| unreachable!());
        let mut doc = HtmlParser.parse("<p>x</p>");
        assert_eq!(
            highlight_selection(&mut doc, &record),
            Err(RelocateError::MissingPoint(Endpoint::Anchor))
        );

        let record = SelectionRecord::from_json(
            r#"{"phrase":"x","before":"","after":"","selection":{"path":"p",
                "anchor":{"path":"","offset":0,"parentOffset":0}}}"#,
        )
        .unwrap_or_else(|_| unreachable!());
        assert_eq!(
            highlight_selection(&mut doc, &record),
            Err(RelocateError::MissingPoint(Endpoint::Focus))
        );
    }
}
