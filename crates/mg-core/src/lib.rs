//! Shared primitives used across Marginalia crates.

/// Result alias used across the workspace.
pub type MarginaliaResult<T> = Result<T, MarginaliaError>;

/// Coded error for infrastructure failures (framing, storage, configuration).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct MarginaliaError {
    pub code: &'static str,
    pub message: String,
}

impl MarginaliaError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Collapses every whitespace run to a single space and trims both ends.
pub fn squish(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }

        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(ch);
    }

    out
}
