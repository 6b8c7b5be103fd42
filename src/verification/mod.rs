//! Iterative verification loop
//!
//! Drives the reasoning service round by round. A round either ends with a
//! final verdict or with a search request; searches are executed and their
//! results fed back until the service settles or the round cap is reached.
//! Search failures never abort the loop; they are reported back to the
//! service as a note.

pub mod events;
pub mod prompt;

pub use events::{FnSink, NoopSink, StatusEvent, StatusSink};
pub use prompt::{SYSTEM_PROMPT, prepare_images};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ConfigHandle;
use crate::reasoning::{
    AnalysisPoint, ChatMessage, FlaggedImage, FlaggedSegment, ReasoningReply, ReasoningService,
    ReplyParseError, Verdict, VerdictDraft, parse_reply,
};
use crate::search::{SearchRecord, WebSearchService};

/// Explanation used when the cap is hit with no verdict on record.
const INCONCLUSIVE_EXPLANATION: &str = "已达到最大分析轮数，现有信息不足以得出确定结论。";

#[derive(Debug, Error)]
pub enum VerificationError {
    /// The caller cancelled. Never reported as a generic failure.
    #[error("Verification aborted")]
    Aborted,

    #[error("Reasoning service failed: {0}")]
    Reasoning(String),

    #[error("Reasoning reply could not be parsed: {0}")]
    Parse(#[from] ReplyParseError),

    #[error("Verification is not configured: {0}")]
    Config(String),
}

/// Final outcome of one verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub probability: f64,
    pub verdict: Verdict,
    pub explanation: String,
    pub analysis_points: Vec<AnalysisPoint>,
    pub flagged_segments: Vec<FlaggedSegment>,
    pub flagged_images: Vec<FlaggedImage>,
    /// Every search performed, in order.
    pub search_results: Vec<SearchRecord>,
    /// Reasoning calls made.
    pub rounds: u32,
}

/// Mutable state of one run.
#[derive(Debug, Clone)]
pub struct VerificationState {
    pub messages: Vec<ChatMessage>,
    pub round: u32,
    pub max_rounds: u32,
    pub search_log: Vec<SearchRecord>,
}

impl VerificationState {
    fn new(first_request: ChatMessage, max_rounds: u32) -> Self {
        Self {
            messages: vec![ChatMessage::system(SYSTEM_PROMPT), first_request],
            round: 0,
            max_rounds: max_rounds.max(1),
            search_log: Vec::new(),
        }
    }

    fn at_cap(&self) -> bool {
        self.round >= self.max_rounds
    }

    fn finish(self, draft: VerdictDraft) -> VerificationResult {
        VerificationResult {
            probability: draft.probability,
            verdict: draft.verdict,
            explanation: draft.explanation,
            analysis_points: draft.analysis_points,
            flagged_segments: draft.flagged_segments,
            flagged_images: draft.flagged_images,
            search_results: self.search_log,
            rounds: self.round,
        }
    }
}

fn inconclusive() -> VerdictDraft {
    VerdictDraft {
        probability: 50.0,
        verdict: Verdict::Mixed,
        explanation: INCONCLUSIVE_EXPLANATION.to_string(),
        analysis_points: Vec::new(),
        flagged_segments: Vec::new(),
        flagged_images: Vec::new(),
    }
}

pub struct VerificationLoop {
    config: Arc<ConfigHandle>,
    reasoning: Arc<dyn ReasoningService>,
    search: Arc<dyn WebSearchService>,
}

impl VerificationLoop {
    pub fn new(
        config: Arc<ConfigHandle>,
        reasoning: Arc<dyn ReasoningService>,
        search: Arc<dyn WebSearchService>,
    ) -> Self {
        Self {
            config,
            reasoning,
            search,
        }
    }

    /// Verify `content` with optional images and source URL.
    ///
    /// `images` may be proxied; they are unwrapped before being shown to
    /// the reasoning service. Cancellation is checked on entry, before
    /// every reasoning call and before every search.
    pub async fn run(
        &self,
        content: &str,
        images: &[String],
        source_url: Option<&str>,
        cancel: &CancellationToken,
        sink: &dyn StatusSink,
    ) -> Result<VerificationResult, VerificationError> {
        if cancel.is_cancelled() {
            return Err(VerificationError::Aborted);
        }
        self.reasoning
            .check_ready()
            .map_err(VerificationError::Config)?;

        let config = self.config.get();
        let images = prepare_images(images, &config.acquisition.proxy_base);
        if content.trim().is_empty() && images.is_empty() {
            return Err(VerificationError::Config(
                "nothing to verify: no text and no usable images".to_string(),
            ));
        }

        let first = ChatMessage::user_with_images(
            prompt::initial_request(content, source_url, images.len()),
            &images,
        );
        let mut state = VerificationState::new(first, config.reasoning.max_rounds);
        info!(
            max_rounds = state.max_rounds,
            images = images.len(),
            "Starting verification"
        );
        sink.emit(StatusEvent::Analyzing);

        loop {
            if cancel.is_cancelled() {
                return Err(VerificationError::Aborted);
            }
            state.round += 1;
            let round = state.round;
            if round > 1 {
                sink.emit(StatusEvent::DeepAnalysis { round });
            }

            let reply_text = self
                .reasoning
                .complete(&state.messages)
                .await
                .map_err(|e| VerificationError::Reasoning(format!("{e:#}")))?;
            debug!(round, bytes = reply_text.len(), "Reasoning reply");
            let reply = parse_reply(&reply_text)?;
            state.messages.push(ChatMessage::assistant(reply_text));

            let (query, fallback) = match reply {
                ReasoningReply::Final(draft) => {
                    info!(round, verdict = ?draft.verdict, "Verification finished");
                    return Ok(state.finish(draft));
                }
                ReasoningReply::NeedsSearch { query, fallback } => (query, fallback),
            };

            if state.at_cap() {
                warn!(round, query = %query, "Round cap reached with a pending search");
                let draft = fallback.unwrap_or_else(inconclusive);
                return Ok(state.finish(draft));
            }

            if cancel.is_cancelled() {
                return Err(VerificationError::Aborted);
            }
            sink.emit(StatusEvent::Searching {
                query: query.clone(),
                round,
            });
            let next_round = round + 1;

            match self.search.search(&query).await {
                Ok(hits) => {
                    debug!(round, query = %query, hits = hits.len(), "Search finished");
                    state.messages.push(ChatMessage::user(prompt::search_results_message(
                        &query,
                        &hits,
                        next_round,
                        state.max_rounds,
                    )));
                    state.search_log.push(SearchRecord { query, round, hits });
                }
                Err(e) => {
                    let error = format!("{e:#}");
                    warn!(round, query = %query, "Search failed: {error}");
                    state.messages.push(ChatMessage::user(prompt::search_failed_message(
                        &query,
                        &error,
                        next_round,
                        state.max_rounds,
                    )));
                    sink.emit(StatusEvent::SearchFailed {
                        query,
                        round,
                        error,
                    });
                }
            }
        }
    }
}
