use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::models::message::Message;
use crate::models::tool::WebSearch;
use crate::providers::base::{
    Completion, CompletionEvent, CompletionStream, Provider, StopReason, Usage,
};

/// One scripted item in a mock round.
#[derive(Debug, Clone)]
pub enum MockEvent {
    Event(CompletionEvent),
    /// Fail the stream at this point with a transport error.
    Error(String),
}

/// A mock provider that replays pre-scripted rounds for testing
pub struct MockProvider {
    rounds: Arc<Mutex<Vec<Vec<MockEvent>>>>,
    repeat: Option<String>,
}

impl MockProvider {
    /// Create a mock provider with one script per expected round.
    /// Rounds past the end of the script fail at the transport level.
    pub fn new(rounds: Vec<Vec<MockEvent>>) -> Self {
        Self {
            rounds: Arc::new(Mutex::new(rounds)),
            repeat: None,
        }
    }

    /// Reply to every round with the same single-delta text.
    pub fn repeating<S: Into<String>>(text: S) -> Self {
        Self {
            rounds: Arc::new(Mutex::new(Vec::new())),
            repeat: Some(text.into()),
        }
    }

    /// Fail every round before any event is produced.
    pub fn failing() -> Self {
        Self::new(Vec::new())
    }

    /// Script for a plain text round: each delta, then the completion.
    pub fn text_round(deltas: &[&str], stop_reason: StopReason, usage: Usage) -> Vec<MockEvent> {
        let mut events: Vec<MockEvent> = deltas
            .iter()
            .map(|delta| MockEvent::Event(CompletionEvent::TextDelta(delta.to_string())))
            .collect();
        let text: String = deltas.concat();
        events.push(MockEvent::Event(CompletionEvent::Completed(Completion {
            message: Message::assistant().with_text(text),
            stop_reason,
            usage,
        })));
        events
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        _system: &str,
        _messages: &[Message],
        _tools: &[WebSearch],
        _temperature: f32,
    ) -> Result<CompletionStream> {
        let events = {
            let mut rounds = self.rounds.lock().unwrap();
            if !rounds.is_empty() {
                rounds.remove(0)
            } else if let Some(text) = &self.repeat {
                Self::text_round(&[text.as_str()], StopReason::EndTurn, Usage::new(1, 1))
            } else {
                return Err(anyhow!("mock transport failure"));
            }
        };

        let items = events.into_iter().map(|event| match event {
            MockEvent::Event(event) => Ok(event),
            MockEvent::Error(message) => Err(anyhow!(message)),
        });
        Ok(Box::pin(futures::stream::iter(items)))
    }
}
