//! Token estimation: deterministic character heuristics for budget math.
//!
//! Compaction never needs exact token counts. It needs a monotonic,
//! side-effect-free estimate that is cheap enough to recompute inside an
//! eviction loop. Text is counted by a chars-per-token ratio, every
//! message pays a small fixed framing overhead, and non-text content
//! parts are charged flat costs. Unknown part payloads cost a minimal
//! constant instead of failing: the estimator is a total function.

use crate::{ContentPart, Message, MessageContent};

/// Default characters per token (conservative estimate for English text).
/// Most tokenizers average 3-4 chars per token; we use 3.5 as a middle ground.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Fixed per-message framing overhead (role tag, separators) in tokens.
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Flat cost charged for an image content part.
pub const IMAGE_PART_TOKENS: usize = 768;

/// Minimal flat cost charged for a content part we cannot inspect.
pub const UNKNOWN_PART_TOKENS: usize = 8;

/// Character-heuristic token estimator.
///
/// Deterministic, O(total content length), no I/O, never fails. Totals
/// are monotonic in message count and content size. The chars-per-token
/// ratio can be calibrated from historical API usage data.
///
/// # Example
///
/// ```
/// use baler_rs::Message;
/// use baler_rs::estimate::TokenEstimator;
///
/// let estimator = TokenEstimator::new();
/// let messages = vec![Message::user("hello world")];
/// assert!(estimator.count_messages(&messages) > 0);
/// ```
#[derive(Debug, Clone)]
pub struct TokenEstimator {
    chars_per_token: f64,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

impl TokenEstimator {
    /// Create an estimator with the default chars-per-token ratio.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the chars-per-token ratio with a calibrated value.
    /// Non-finite or non-positive ratios fall back to the default.
    pub fn with_chars_per_token(ratio: f64) -> Self {
        let ratio = if ratio.is_finite() && ratio > 0.0 {
            ratio
        } else {
            DEFAULT_CHARS_PER_TOKEN
        };
        Self {
            chars_per_token: ratio,
        }
    }

    /// Estimate tokens for a raw text string.
    pub fn count(&self, text: &str) -> usize {
        (text.len() as f64 / self.chars_per_token).ceil() as usize
    }

    /// Estimate tokens for one message, including framing overhead and
    /// any attached tool calls.
    pub fn count_message(&self, message: &Message) -> usize {
        let mut total = MESSAGE_OVERHEAD_TOKENS;

        match &message.content {
            Some(MessageContent::Text(text)) => total += self.count(text),
            Some(MessageContent::Parts(parts)) => {
                for part in parts {
                    total += match part {
                        ContentPart::Text { text } => self.count(text),
                        ContentPart::ImageUrl { .. } => IMAGE_PART_TOKENS,
                        ContentPart::Other(_) => UNKNOWN_PART_TOKENS,
                    };
                }
            }
            None => {}
        }

        if let Some(calls) = &message.tool_calls {
            for call in calls {
                total += self.count(&call.name) + self.count(&call.arguments);
            }
        }

        total
    }

    /// Estimate total tokens for a message list.
    pub fn count_messages(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.count_message(m)).sum()
    }
}
