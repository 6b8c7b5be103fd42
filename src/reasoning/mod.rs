//! Reasoning service boundary
//!
//! A [`ReasoningService`] turns a message history into assistant text.
//! Two wire styles implement it; [`parse::parse_reply`] turns the text into
//! a typed [`ReasoningReply`].

pub mod client;
pub mod parse;
pub mod types;

pub use client::{
    ChatCompletionsClient, ConfiguredReasoning, RawHttpClient, ReasoningError,
    extract_assistant_text,
};
pub use parse::{
    AnalysisPoint, FlaggedImage, FlaggedSegment, PointStatus, ReasoningReply, ReplyParseError,
    Verdict, VerdictDraft, parse_reply,
};
pub use types::{ChatMessage, ContentPart, ImageUrl, MessageContent, Role};

use async_trait::async_trait;

#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Send the full history, get the assistant's reply text.
    async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String>;

    /// Whether the service can be called at all (credentials, endpoint).
    fn check_ready(&self) -> Result<(), String> {
        Ok(())
    }
}
