use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::models::message::Message;
use crate::models::tool::WebSearch;

/// Token counts reported by the model for one round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: i64,
    pub output_tokens: i64,
}

impl Usage {
    pub fn new(input_tokens: i64, output_tokens: i64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Fold another round's counts into a turn-level total.
    pub fn add(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Why the model stopped emitting content for a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
    PauseTurn,
    Refusal,
    Other(String),
}

impl StopReason {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "end_turn" => StopReason::EndTurn,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            "tool_use" => StopReason::ToolUse,
            "pause_turn" => StopReason::PauseTurn,
            "refusal" => StopReason::Refusal,
            other => StopReason::Other(other.to_string()),
        }
    }

    /// True when the model paused mid-turn to use a tool and expects the
    /// conversation to be resubmitted for continuation.
    pub fn is_tool_pause(&self) -> bool {
        matches!(self, StopReason::ToolUse | StopReason::PauseTurn)
    }
}

/// The final state of one model round.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub message: Message,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

/// Incremental output of a model round. Text deltas arrive in production
/// order; `Completed` is always the last event.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionEvent {
    TextDelta(String),
    Completed(Completion),
}

pub type CompletionStream = BoxStream<'static, Result<CompletionEvent>>;

/// Base trait for model providers
#[async_trait]
pub trait Provider: Send + Sync {
    /// Start one model round over the full rolling history. Dropping the
    /// returned stream aborts the underlying request.
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[WebSearch],
        temperature: f32,
    ) -> Result<CompletionStream>;
}
