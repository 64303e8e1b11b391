use crate::AnchorConfig;
use crate::ancestry::absolute_path;
use crate::ancestry::common_parent;
use crate::path::PathResolver;
use crate::point::NodePoint;
use crate::record::SelectionLocator;
use crate::record::SelectionRecord;
use crate::record::TrimmedPoint;
use mg_core::MarginaliaResult;
use mg_core::squish;
use mg_dom::Document;
use mg_dom::NodeId;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("document has no live selection")]
    NoSelection,
    #[error("selection is collapsed or contains only whitespace")]
    EmptySelection,
    #[error("selection endpoint is not attached under an element")]
    DetachedPoint,
    #[error("selected phrase does not occur in its surrounding text")]
    PhraseNotInContext,
}

/// Turns the live selection of a document into a [`SelectionRecord`].
#[derive(Debug, Clone, Default)]
pub struct Capturer {
    config: AnchorConfig,
}

impl Capturer {
    pub fn new(config: AnchorConfig) -> MarginaliaResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AnchorConfig {
        &self.config
    }

    pub fn wrap_selection(&self, doc: &Document) -> Result<SelectionRecord, CaptureError> {
        let selection = doc.selection().ok_or(CaptureError::NoSelection)?;
        if selection.is_collapsed() {
            return Err(CaptureError::EmptySelection);
        }

        let text = doc
            .range_text(&selection.to_range())
            .ok_or(CaptureError::DetachedPoint)?;
        let phrase = squish(&text);
        if phrase.is_empty() {
            return Err(CaptureError::EmptySelection);
        }

        let anchor = NodePoint::describe(doc, selection.anchor).ok_or(CaptureError::DetachedPoint)?;
        let focus = NodePoint::describe(doc, selection.focus).ok_or(CaptureError::DetachedPoint)?;
        let common = context_ancestor(doc, anchor.container(), focus.container())
            .ok_or(CaptureError::DetachedPoint)?;

        // First occurrence wins when the phrase repeats inside the ancestor.
        let context = squish(&doc.text_content(common));
        let start = context
            .find(&phrase)
            .ok_or(CaptureError::PhraseNotInContext)?;
        let before = context[..start].to_owned();
        let after = context[start + phrase.len()..].to_owned();

        let mut resolver = PathResolver::new(doc, &self.config);
        let ancestor = resolver
            .simplest_path(common)
            .ok_or(CaptureError::DetachedPoint)?;
        debug!(
            selector = ancestor.selector.as_str(),
            matches = ancestor.matches,
            "captured selection ancestor"
        );

        Ok(SelectionRecord {
            phrase,
            before,
            after,
            selection: SelectionLocator {
                path: ancestor.selector,
                anchor: Some(trim_point(doc, common, anchor)?),
                focus: Some(trim_point(doc, common, focus)?),
            },
        })
    }
}

/// Deepest common ancestor of the two containers. When both endpoints share
/// one container its parent element is used instead, so the context carries
/// the text around the selected element.
fn context_ancestor(doc: &Document, anchor: NodeId, focus: NodeId) -> Option<NodeId> {
    let common = common_parent(doc, anchor, focus)?;
    if anchor != focus {
        return Some(common);
    }
    Some(doc.parent_element(common).unwrap_or(common))
}

fn trim_point(doc: &Document, common: NodeId, point: NodePoint) -> Result<TrimmedPoint, CaptureError> {
    let path = absolute_path(doc, common, point.container()).ok_or(CaptureError::DetachedPoint)?;
    Ok(TrimmedPoint {
        path: path.to_string(),
        offset: point.offset(),
        parent_offset: point.parent_offset(),
    })
}

/// Captures with the default configuration; `None` means nothing to capture.
pub fn wrap_selection(doc: &Document) -> Option<SelectionRecord> {
    Capturer::default().wrap_selection(doc).ok()
}
