//! Content-script side of a page: owns the loaded document and answers
//! capture and relocate requests for it.

use mg_anchor::AnchorConfig;
use mg_anchor::CaptureError;
use mg_anchor::Capturer;
use mg_anchor::Resolver;
use mg_anchor::SelectionRecord;
use mg_core::MarginaliaError;
use mg_core::MarginaliaResult;
use mg_dom::BoundaryPoint;
use mg_dom::Document;
use mg_dom::NodeId;
use mg_dom::Range;
use mg_dom::Selection;
use mg_html::HtmlParser;
use mg_ipc::IpcMessage;
use mg_ipc::LocalIpcEndpoint;
use tracing::debug;
use tracing::info;
use tracing::warn;
use url::Url;

#[derive(Debug)]
pub struct PageSession {
    url: String,
    document: Document,
    capturer: Capturer,
    resolver: Resolver,
}

impl PageSession {
    pub fn new(url: impl Into<String>, document: Document, config: AnchorConfig) -> MarginaliaResult<Self> {
        Ok(Self {
            url: url.into(),
            document,
            capturer: Capturer::new(config)?,
            resolver: Resolver::new(config)?,
        })
    }

    pub fn from_html(url: impl Into<String>, html: &str, config: AnchorConfig) -> MarginaliaResult<Self> {
        Self::new(url, HtmlParser.parse(html), config)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn config(&self) -> &AnchorConfig {
        self.capturer.config()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    /// Answers one request. Replies addressed to this side are ignored.
    pub fn handle(&mut self, message: IpcMessage) -> Option<IpcMessage> {
        match message {
            IpcMessage::CaptureSelection { request_id } => Some(IpcMessage::SelectionCaptured {
                request_id,
                record: self.capture_json(),
            }),
            IpcMessage::RelocateSelection {
                request_id,
                origin_url,
                record,
            } => Some(self.relocate(request_id, origin_url, &record)),
            other => {
                debug!(request_id = other.request_id(), "ignoring reply message");
                None
            }
        }
    }

    /// Answers framed requests until the peer hangs up. Returns how many
    /// requests were answered.
    pub fn serve(&mut self, endpoint: &LocalIpcEndpoint) -> MarginaliaResult<usize> {
        let mut answered = 0_usize;
        while let Some(message) = endpoint.recv()? {
            if let Some(reply) = self.handle(message) {
                endpoint.send(&reply)?;
                answered += 1;
            }
        }
        debug!(answered, "page session peer disconnected");
        Ok(answered)
    }

    /// Selects the `occurrence`-th (1-based) match of `needle` in the
    /// document's text, which may span several text nodes.
    pub fn select_text(&mut self, needle: &str, occurrence: usize) -> MarginaliaResult<Range> {
        if needle.is_empty() || occurrence == 0 {
            return Err(MarginaliaError::new(
                "page.select_invalid",
                "needle must be non-empty and occurrence starts at 1",
            ));
        }

        let mut text = String::new();
        let mut spans: Vec<(NodeId, usize, usize)> = Vec::new();
        let mut chars = 0_usize;
        for node in self.document.descendants(self.document.root()) {
            let Some(content) = self.document.text(node) else {
                continue;
            };
            let len = content.chars().count();
            spans.push((node, chars, chars + len));
            text.push_str(content);
            chars += len;
        }

        let byte_start = text
            .match_indices(needle)
            .nth(occurrence - 1)
            .map(|(index, _)| index)
            .ok_or_else(|| {
                MarginaliaError::new(
                    "page.text_not_found",
                    format!("occurrence {occurrence} of `{needle}` not found"),
                )
            })?;
        let start = text[..byte_start].chars().count();
        let end = start + needle.chars().count();

        let start_point = spans
            .iter()
            .find(|(_, from, to)| start >= *from && start < *to)
            .map(|(node, from, _)| BoundaryPoint::new(*node, start - from));
        let end_point = spans
            .iter()
            .find(|(_, from, to)| end > *from && end <= *to)
            .map(|(node, from, _)| BoundaryPoint::new(*node, end - from));
        let (Some(start_point), Some(end_point)) = (start_point, end_point) else {
            return Err(MarginaliaError::new(
                "page.text_not_found",
                format!("`{needle}` does not map onto text nodes"),
            ));
        };

        self.document
            .set_selection(Selection::new(start_point, end_point));
        Ok(Range::new(start_point, end_point))
    }

    fn capture_json(&self) -> Option<String> {
        let record = match self.capturer.wrap_selection(&self.document) {
            Ok(record) => record,
            Err(CaptureError::NoSelection | CaptureError::EmptySelection) => return None,
            Err(error) => {
                warn!(%error, "selection capture failed");
                return None;
            }
        };

        match record.to_json() {
            Ok(json) => Some(json),
            Err(error) => {
                warn!(code = error.code, "selection record encoding failed");
                None
            }
        }
    }

    fn relocate(&mut self, request_id: u64, origin_url: String, record: &str) -> IpcMessage {
        if !same_navigation_target(&origin_url, &self.url) {
            info!(
                origin = origin_url.as_str(),
                current = self.url.as_str(),
                "record belongs to another page"
            );
            return IpcMessage::SelectionRelocated {
                request_id,
                found: false,
                navigate_to: Some(origin_url),
            };
        }

        let found = match SelectionRecord::from_json(record) {
            Ok(record) => match self.resolver.highlight_selection(&mut self.document, &record) {
                Ok(_) => true,
                Err(error) => {
                    debug!(%error, "relocation failed");
                    false
                }
            },
            Err(error) => {
                warn!(code = error.code, "undecodable selection record");
                false
            }
        };

        IpcMessage::SelectionRelocated {
            request_id,
            found,
            navigate_to: None,
        }
    }
}

/// Same scheme, host, port, path and query. Fragments are ignored.
pub fn same_navigation_target(left: &str, right: &str) -> bool {
    if left == right {
        return true;
    }

    let Ok(left_url) = Url::parse(left) else {
        return false;
    };
    let Ok(right_url) = Url::parse(right) else {
        return false;
    };

    left_url.scheme() == right_url.scheme()
        && left_url.host_str() == right_url.host_str()
        && left_url.port_or_known_default() == right_url.port_or_known_default()
        && left_url.path() == right_url.path()
        && left_url.query() == right_url.query()
}
