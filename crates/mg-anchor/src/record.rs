//! Portable description of a captured selection.

use mg_core::MarginaliaError;
use mg_core::MarginaliaResult;
use serde::Deserialize;
use serde::Serialize;

/// A selection endpoint relative to the record's common ancestor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrimmedPoint {
    /// Structural path from the ancestor to the endpoint's container; empty
    /// when the container is the ancestor itself.
    #[serde(default)]
    pub path: String,
    pub offset: usize,
    /// Index of the text node among its parent's child nodes, for endpoints
    /// that sit inside text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_offset: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionLocator {
    /// Selector of the common ancestor.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<TrimmedPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<TrimmedPoint>,
}

/// Captured selection: squished phrase, its surrounding text inside the
/// common ancestor, and where to find it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRecord {
    pub phrase: String,
    pub before: String,
    pub after: String,
    pub selection: SelectionLocator,
}

impl SelectionRecord {
    /// Squished text of the common ancestor at capture time.
    pub fn context(&self) -> String {
        let mut context =
            String::with_capacity(self.before.len() + self.phrase.len() + self.after.len());
        context.push_str(&self.before);
        context.push_str(&self.phrase);
        context.push_str(&self.after);
        context
    }

    pub fn to_json(&self) -> MarginaliaResult<String> {
        serde_json::to_string(self).map_err(|error| {
            MarginaliaError::new(
                "anchor.record_encode_failed",
                format!("failed to encode selection record: {error}"),
            )
        })
    }

    pub fn from_json(input: &str) -> MarginaliaResult<Self> {
        serde_json::from_str(input).map_err(|error| {
            MarginaliaError::new(
                "anchor.record_decode_failed",
                format!("failed to decode selection record: {error}"),
            )
        })
    }
}
