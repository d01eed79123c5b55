//! Streaming chat session: one logical turn against the model, possibly
//! spanning several rounds when the model pauses to use its search tool.
//!
//! Each turn moves through Streaming, zero or more ToolPause/Streaming
//! cycles, then Finalizing. Finalization runs on every exit path exactly
//! once: it persists whatever text reached the client, emits the terminal
//! frame, and closes the channel.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use uuid::Uuid;

use crate::models::message::Message;
use crate::models::tool::WebSearch;
use crate::providers::base::{CompletionEvent, Provider, Usage};
use crate::store::ConversationStore;

/// The fixed system prompt for every conversation.
pub const SYSTEM_PROMPT: &str = "You are a concise, helpful assistant. Use the \
web_search tool when the answer depends on current or external information; \
otherwise answer directly.";

/// Sampling temperature applied when the request does not carry a usable one.
pub const DEFAULT_TEMPERATURE: f32 = 1.0;

/// Upper bound on model rounds within one turn. A model that keeps pausing
/// for tool use past this is cut off at its last completion.
pub const MAX_ROUNDS: usize = 8;

/// How often the stream wait wakes up to look for a disconnected client.
const HEARTBEAT: Duration = Duration::from_millis(500);

/// Events pushed to the transport channel. `Done` is always the last one.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    Text(String),
    Error(String),
    Done { usage: Usage },
}

/// Accept a chat message only if it is a string with content left after
/// trimming. Runs before any store mutation or model call.
pub fn clean_message(raw: &serde_json::Value) -> Option<String> {
    let text = raw.as_str()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Clamp a consumer-supplied temperature to [0, 1], falling back to the
/// default when the value is absent or not a finite number.
pub fn clamp_temperature(raw: Option<f64>) -> f32 {
    match raw {
        Some(t) if t.is_finite() => t.clamp(0.0, 1.0) as f32,
        _ => DEFAULT_TEMPERATURE,
    }
}

/// How the round loop ended without a fault.
enum TurnEnd {
    Complete,
    /// The client went away; stop forwarding, but keep what was produced.
    Cancelled,
}

/// Orchestrates one chat turn: appends the user message, relays model
/// output to the transport, loops through tool pauses, and persists the
/// accumulated text.
pub struct ChatSession {
    store: Arc<dyn ConversationStore>,
    provider: Arc<dyn Provider>,
    tools: Vec<WebSearch>,
}

impl ChatSession {
    pub fn new(store: Arc<dyn ConversationStore>, provider: Arc<dyn Provider>) -> Self {
        Self {
            store,
            provider,
            tools: vec![WebSearch::default()],
        }
    }

    /// Run one turn for an already-validated message. Every fault is
    /// reported in-band on `tx`; the channel always receives a terminal
    /// `Done` frame and is closed afterwards.
    pub async fn run_turn(
        &self,
        conversation_id: Uuid,
        text: String,
        temperature: f32,
        tx: mpsc::Sender<TurnEvent>,
    ) {
        let mut usage = Usage::default();
        let mut transcript = String::new();

        let fault = self
            .stream_rounds(
                conversation_id,
                text,
                temperature,
                &tx,
                &mut usage,
                &mut transcript,
            )
            .await
            .err();

        // Finalization. The client already saw the transcript, so a
        // persistence failure is logged rather than surfaced.
        if !transcript.is_empty() {
            let assistant = Message::assistant().with_text(&transcript);
            if let Err(e) = self.store.append_message(conversation_id, assistant).await {
                tracing::warn!(%conversation_id, error = %e, "failed to persist assistant message");
            }
        }
        if let Some(e) = fault {
            let _ = tx.send(TurnEvent::Error(e.to_string())).await;
        }
        let _ = tx.send(TurnEvent::Done { usage }).await;
    }

    /// The round loop. Usage and transcript accumulate through the caller's
    /// buffers so finalization sees them on every exit path.
    async fn stream_rounds(
        &self,
        conversation_id: Uuid,
        text: String,
        temperature: f32,
        tx: &mpsc::Sender<TurnEvent>,
        usage: &mut Usage,
        transcript: &mut String,
    ) -> anyhow::Result<TurnEnd> {
        // Append, then take the returned conversation as the reload: the
        // model must see its own just-written turn, not a stale copy.
        let conversation = self
            .store
            .append_message(conversation_id, Message::user().with_text(&text))
            .await?;
        let mut history = conversation.messages;

        let mut rounds = 0;
        loop {
            rounds += 1;
            let mut stream = self
                .provider
                .complete(SYSTEM_PROMPT, &history, &self.tools, temperature)
                .await?;

            let mut completion = None;
            // Drain the round. The heartbeat wakes the wait so a client
            // disconnect is noticed even while the model is quiet;
            // dropping the stream aborts the in-flight request.
            loop {
                match timeout(HEARTBEAT, stream.next()).await {
                    Ok(Some(Ok(CompletionEvent::TextDelta(delta)))) => {
                        transcript.push_str(&delta);
                        if tx.send(TurnEvent::Text(delta)).await.is_err() {
                            return Ok(TurnEnd::Cancelled);
                        }
                    }
                    Ok(Some(Ok(CompletionEvent::Completed(c)))) => {
                        completion = Some(c);
                    }
                    Ok(Some(Err(e))) => return Err(e),
                    Ok(None) => break,
                    Err(_) => {
                        if tx.is_closed() {
                            return Ok(TurnEnd::Cancelled);
                        }
                    }
                }
            }

            let completion = completion
                .ok_or_else(|| anyhow::anyhow!("model stream ended without a completion"))?;
            usage.add(completion.usage);

            if completion.stop_reason.is_tool_pause() && rounds < MAX_ROUNDS {
                // Continuation: the assistant message carries the tool
                // invocation and any host-supplied result blocks.
                // Resubmitting the extended history resumes the turn.
                history.push(completion.message);
                continue;
            }

            return Ok(TurnEnd::Complete);
        }
    }
}
