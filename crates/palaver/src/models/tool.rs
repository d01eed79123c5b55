use serde::{Deserialize, Serialize};

/// How many searches the model may run within a single round.
pub const MAX_SEARCHES_PER_ROUND: u32 = 5;

/// Declaration of the web search capability handed to the model. The
/// search itself runs host-side; its results come back to us as content
/// blocks inside the assistant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSearch {
    pub max_uses: u32,
}

impl WebSearch {
    pub fn new(max_uses: u32) -> Self {
        Self { max_uses }
    }
}

impl Default for WebSearch {
    fn default() -> Self {
        Self::new(MAX_SEARCHES_PER_ROUND)
    }
}
