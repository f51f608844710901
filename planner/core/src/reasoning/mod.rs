//! Reasoning Removal
//!
//! Reasoning models interleave their deliberation with the answer. Two forms
//! are recognized and hidden from callers:
//!
//! - a balanced span such as `<think>...</think>`, removed with its markers
//! - a line starting with `思考:` (or the full-width `思考：`), removed
//!   through the end of the line
//!
//! The same [`ReasoningFilter`] handles a live fragment stream and a complete
//! string; [`strip_reasoning`] is the one-shot form.
//!
//! # Example
//!
//! ```
//! use planner_core::reasoning::{ReasoningFilter, ReasoningMarkers};
//!
//! let mut filter = ReasoningFilter::new(ReasoningMarkers::default());
//! let mut out = filter.feed("Plan: <thi");
//! out.push_str(&filter.feed("nk>hmm</think>learn Rust"));
//! out.push_str(&filter.finish());
//! assert_eq!(out, "Plan: learn Rust");
//! ```

mod filter;
mod markers;

pub use filter::{strip_reasoning, FilterMode, ReasoningFilter};
pub use markers::{
    ReasoningMarkers, DEFAULT_END_MARKER, DEFAULT_LINE_PREFIX, DEFAULT_START_MARKER,
};
