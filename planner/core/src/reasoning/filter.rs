//! Streaming Reasoning Filter
//!
//! [`ReasoningFilter`] is a small state machine fed with text fragments in
//! arrival order. Its concatenated output is the same however the input was
//! chunked, so it serves both the streamed and the materialized response.
//!
//! # State Machine
//!
//! ```text
//!                 start marker
//!   Passthrough ───────────────► InsideReasoning
//!      │  ▲  ▲                        │
//!      │  │  └────────────────────────┘ end marker
//!      │  │
//!      │  └──────── newline ───────┐
//!      │ line prefix at line start │
//!      └────────────────────► InsideReasoningLine
//! ```
//!
//! A start marker inside a reasoning line opens a span as usual; once the span
//! closes the filter returns to the line, so the newline that ends the line is
//! searched for after the span and never inside it.
//!
//! Only a fragment tail that may be the beginning of a marker is retained
//! between calls. Text inside a reasoning span is discarded as it arrives.

use super::markers::{partial_marker_len, PrefixMatch, ReasoningMarkers};

/// Current mode of a [`ReasoningFilter`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FilterMode {
    /// Visible text; scanning for markers
    #[default]
    Passthrough,
    /// Inside a balanced span; scanning for the end marker
    InsideReasoning,
    /// Inside a prefixed reasoning line; scanning for the newline
    InsideReasoningLine,
}

/// Removes reasoning spans from fragmented model output
#[derive(Clone, Debug)]
pub struct ReasoningFilter {
    markers: ReasoningMarkers,
    mode: FilterMode,
    /// Unresolved tail that may be an incomplete marker
    pending: String,
    /// Whether the visible output so far is empty or ends with a newline
    line_start: bool,
    /// Span was opened inside a reasoning line, which resumes after it
    resume_line: bool,
}

impl Default for ReasoningFilter {
    fn default() -> Self {
        Self::new(ReasoningMarkers::default())
    }
}

impl ReasoningFilter {
    /// Create a filter for the given markers
    #[must_use]
    pub fn new(markers: ReasoningMarkers) -> Self {
        Self {
            markers,
            mode: FilterMode::Passthrough,
            pending: String::new(),
            line_start: true,
            resume_line: false,
        }
    }

    /// Current mode
    #[must_use]
    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    /// Text held back because it may be the beginning of a marker
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Consume one fragment and return the visible text it releases
    ///
    /// The result may be empty, either because the fragment is reasoning or
    /// because its tail is held until the next fragment disambiguates it.
    pub fn feed(&mut self, fragment: &str) -> String {
        let mut text = std::mem::take(&mut self.pending);
        text.push_str(fragment);

        let mut out = String::new();
        let mut rest = text.as_str();

        while !rest.is_empty() {
            match self.mode {
                FilterMode::Passthrough => {
                    if self.line_start {
                        match self.markers.match_line_prefix(rest) {
                            PrefixMatch::Full(len) => {
                                rest = &rest[len..];
                                self.mode = FilterMode::InsideReasoningLine;
                                continue;
                            }
                            PrefixMatch::Partial => {
                                self.pending = rest.to_string();
                                break;
                            }
                            PrefixMatch::None => {}
                        }
                    }

                    let start = rest.find(self.markers.start.as_str());
                    let newline = rest.find('\n');

                    match (start, newline) {
                        (_, Some(n)) if start.map_or(true, |s| n < s) => {
                            self.emit(&mut out, &rest[..=n]);
                            rest = &rest[n + 1..];
                        }
                        (Some(s), _) => {
                            self.emit(&mut out, &rest[..s]);
                            rest = &rest[s + self.markers.start.len()..];
                            self.mode = FilterMode::InsideReasoning;
                        }
                        _ => {
                            let split = rest.len() - partial_marker_len(rest, &self.markers.start);
                            self.emit(&mut out, &rest[..split]);
                            self.pending = rest[split..].to_string();
                            break;
                        }
                    }
                }
                FilterMode::InsideReasoning => {
                    if let Some(e) = rest.find(self.markers.end.as_str()) {
                        rest = &rest[e + self.markers.end.len()..];
                        self.mode = if std::mem::take(&mut self.resume_line) {
                            FilterMode::InsideReasoningLine
                        } else {
                            FilterMode::Passthrough
                        };
                    } else {
                        let split = rest.len() - partial_marker_len(rest, &self.markers.end);
                        self.pending = rest[split..].to_string();
                        break;
                    }
                }
                FilterMode::InsideReasoningLine => {
                    let start = rest.find(self.markers.start.as_str());
                    let newline = rest.find('\n');

                    match (start, newline) {
                        (_, Some(n)) if start.map_or(true, |s| n < s) => {
                            rest = &rest[n + 1..];
                            self.mode = FilterMode::Passthrough;
                        }
                        (Some(s), _) => {
                            rest = &rest[s + self.markers.start.len()..];
                            self.mode = FilterMode::InsideReasoning;
                            self.resume_line = true;
                        }
                        _ => {
                            let split = rest.len() - partial_marker_len(rest, &self.markers.start);
                            self.pending = rest[split..].to_string();
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Signal end of stream and return any text still held back
    ///
    /// A stream that ends inside a reasoning span releases nothing: the
    /// unterminated span extends to the end of the stream.
    #[must_use]
    pub fn finish(self) -> String {
        match self.mode {
            FilterMode::Passthrough => self.pending,
            FilterMode::InsideReasoning | FilterMode::InsideReasoningLine => String::new(),
        }
    }

    fn emit(&mut self, out: &mut String, piece: &str) {
        if piece.is_empty() {
            return;
        }
        out.push_str(piece);
        self.line_start = piece.ends_with('\n');
    }
}

/// Remove reasoning from a complete text in one pass
#[must_use]
pub fn strip_reasoning(text: &str, markers: &ReasoningMarkers) -> String {
    let mut filter = ReasoningFilter::new(markers.clone());
    let mut out = filter.feed(text);
    out.push_str(&filter.finish());
    out
}
