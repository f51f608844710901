//! Reasoning Marker Definitions

use serde::{Deserialize, Serialize};

/// Default opening marker of a reasoning span
pub const DEFAULT_START_MARKER: &str = "<think>";

/// Default closing marker of a reasoning span
pub const DEFAULT_END_MARKER: &str = "</think>";

/// Default line-prefix token ("thinking")
pub const DEFAULT_LINE_PREFIX: &str = "思考";

/// Colons accepted after the line-prefix token (ASCII and full-width)
const PREFIX_COLONS: [char; 2] = [':', '：'];

/// Markers delimiting reasoning the gateway should hide
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningMarkers {
    /// Opening marker of a balanced span
    pub start: String,
    /// Closing marker of a balanced span
    pub end: String,
    /// Token that, followed by a colon at a line start, hides the rest of the line
    pub line_prefix: String,
}

impl Default for ReasoningMarkers {
    fn default() -> Self {
        Self {
            start: DEFAULT_START_MARKER.to_string(),
            end: DEFAULT_END_MARKER.to_string(),
            line_prefix: DEFAULT_LINE_PREFIX.to_string(),
        }
    }
}

/// Result of matching the line-prefix marker at a line start
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PrefixMatch {
    /// Marker present; byte length of the marker including its colon
    Full(usize),
    /// Text so far could still become the marker
    Partial,
    /// Marker absent
    None,
}

impl ReasoningMarkers {
    /// Create a custom marker set
    pub fn new(
        start: impl Into<String>,
        end: impl Into<String>,
        line_prefix: impl Into<String>,
    ) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            line_prefix: line_prefix.into(),
        }
    }

    /// Whether every marker is non-empty and single-line
    #[must_use]
    pub fn is_valid(&self) -> bool {
        [&self.start, &self.end, &self.line_prefix]
            .iter()
            .all(|m| !m.is_empty() && !m.contains('\n'))
    }

    /// Match the line-prefix marker at the beginning of `text`
    pub(crate) fn match_line_prefix(&self, text: &str) -> PrefixMatch {
        for colon in PREFIX_COLONS {
            let mut marker = String::with_capacity(self.line_prefix.len() + colon.len_utf8());
            marker.push_str(&self.line_prefix);
            marker.push(colon);

            if text.starts_with(&marker) {
                return PrefixMatch::Full(marker.len());
            }
            if text.len() < marker.len() && marker.starts_with(text) {
                return PrefixMatch::Partial;
            }
        }
        PrefixMatch::None
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of `marker`
pub(crate) fn partial_marker_len(text: &str, marker: &str) -> usize {
    let max = marker.len().saturating_sub(1).min(text.len());
    (1..=max)
        .rev()
        .find(|&k| marker.is_char_boundary(k) && text.ends_with(&marker[..k]))
        .unwrap_or(0)
}
