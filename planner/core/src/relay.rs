//! Response Relay
//!
//! Moves backend output to the client, through the reasoning filter when the
//! request asks for it. Two shapes are offered:
//!
//! - [`relay`]: a lazy stream of [`RelayEvent`]s for incremental responses
//! - [`collect_plan`]: the whole reply gathered into a [`PlanReply`]
//!
//! Both read the backend in streaming mode so newline-delimited replies are
//! handled the same way.

use futures::{stream, Stream, StreamExt};
use serde::Serialize;

use crate::backend::{BackendError, ChatBackend, FragmentStream};
use crate::messages::ChatMessage;
use crate::reasoning::{strip_reasoning, ReasoningFilter, ReasoningMarkers};

/// Prefix of the error text written into an already-started response ("error")
pub const STREAM_ERROR_PREFIX: &str = "错误: ";

/// One unit of output for a streamed response
#[derive(Debug)]
pub enum RelayEvent {
    /// Visible text, never empty
    Text(String),
    /// The backend failed; no further events follow
    Failed(BackendError),
}

impl RelayEvent {
    /// Text to write into the response body
    #[must_use]
    pub fn into_body_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Failed(err) => format!("{STREAM_ERROR_PREFIX}{err}"),
        }
    }
}

/// Materialized plan response
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct PlanReply {
    /// Plan text, reasoning removed when requested
    pub plan: String,
    /// Model that produced the plan
    pub model: String,
    /// Whether reasoning was removed from `plan`
    pub reasoning_hidden: bool,
    /// Unfiltered backend output
    pub raw_output: String,
}

struct RelayState {
    fragments: FragmentStream,
    filter: Option<ReasoningFilter>,
}

/// Pipe backend fragments through an optional reasoning filter
///
/// Empty pieces are skipped. The filter's held-back tail is released when
/// the backend stream ends. After a [`RelayEvent::Failed`] the stream ends.
pub fn relay(
    fragments: FragmentStream,
    filter: Option<ReasoningFilter>,
) -> impl Stream<Item = RelayEvent> + Send {
    stream::unfold(
        Some(RelayState { fragments, filter }),
        |state| async move {
            let mut state = state?;
            loop {
                match state.fragments.next().await {
                    Some(Ok(fragment)) => {
                        let text = match state.filter.as_mut() {
                            Some(filter) => filter.feed(&fragment),
                            None => fragment,
                        };
                        if !text.is_empty() {
                            return Some((RelayEvent::Text(text), Some(state)));
                        }
                    }
                    Some(Err(err)) => return Some((RelayEvent::Failed(err), None)),
                    None => {
                        let tail = state
                            .filter
                            .take()
                            .map(ReasoningFilter::finish)
                            .unwrap_or_default();
                        return if tail.is_empty() {
                            None
                        } else {
                            Some((RelayEvent::Text(tail), None))
                        };
                    }
                }
            }
        },
    )
}

/// Request a plan and wait for the complete reply
///
/// With `markers`, reasoning is removed from the plan and surrounding
/// whitespace trimmed; `raw_output` always holds the unfiltered text.
///
/// # Errors
///
/// Any backend failure, including one part way through the reply.
pub async fn collect_plan(
    backend: &dyn ChatBackend,
    messages: &[ChatMessage],
    markers: Option<&ReasoningMarkers>,
) -> Result<PlanReply, BackendError> {
    let mut fragments = backend.send_streaming(messages).await?;

    let mut raw_output = String::new();
    while let Some(fragment) = fragments.next().await {
        raw_output.push_str(&fragment?);
    }

    let plan = match markers {
        Some(markers) => strip_reasoning(&raw_output, markers).trim().to_string(),
        None => raw_output.clone(),
    };

    Ok(PlanReply {
        plan,
        model: backend.model().to_string(),
        reasoning_hidden: markers.is_some(),
        raw_output,
    })
}
