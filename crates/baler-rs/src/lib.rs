//! Context compaction engine for LLM agent pipelines.
//!
//! The context window is the scarcest resource in any LLM agent. A growing
//! conversation eventually exceeds the model's token budget, and something
//! has to give. `baler-rs` owns that decision: it detects *whether* a
//! message list overflows the usable budget and *how badly*, then shrinks
//! it, degrading from cheap structural eviction to an expensive semantic
//! summary only when truly necessary.
//!
//! The engine is a stateless transform. One call to
//! [`Compactor::compress()`](compact::Compactor::compress) takes a message
//! list, a context limit, and a [`CompactionConfig`](compact::CompactionConfig),
//! and returns a new message list plus a decision trace. It never fails,
//! never blocks the caller's request pipeline, and holds no state across
//! calls.
//!
//! # Getting started
//!
//! ```ignore
//! use baler_rs::prelude::*;
//!
//! let summarizer = StaticSummarizer::new("Earlier work: read main.rs, fixed the parser.");
//! let compactor = Compactor::new().with_summarizer(&summarizer);
//!
//! let result = compactor
//!     .compress(messages, 200_000, &CompactionConfig::default())
//!     .await;
//!
//! if result.stats.was_compressed {
//!     println!(
//!         "compacted: {:?}, removed {}, protected {}",
//!         result.stats.compaction_type,
//!         result.stats.removed_count,
//!         result.stats.protected_count,
//!     );
//! }
//! send_to_model(result.messages);
//! ```
//!
//! # Where to find things
//!
//! If you're looking for how to...
//!
//! - **Run a compaction pass:** see [`Compactor`](compact::Compactor) and
//!   [`CompactionConfig`](compact::CompactionConfig). The result carries
//!   the full [`OverflowVerdict`](compact::OverflowVerdict) that drove the
//!   decision.
//! - **Estimate token usage:** see [`TokenEstimator`](estimate::TokenEstimator).
//!   It is a deterministic character heuristic: close enough to steer
//!   eviction, never exact.
//! - **Plug in a summarizer:** implement [`Summarizer`](api::Summarizer),
//!   or use [`LlmSummarizer`](api::LlmSummarizer) for a real LLM call and
//!   [`StaticSummarizer`](api::StaticSummarizer) in tests.
//! - **Force a specific legacy strategy:** set
//!   [`CompactionConfig::auto`](compact::CompactionConfig::auto) to `false`
//!   and pick a [`Strategy`](compact::Strategy) by name.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`compact`] | Overflow detection, protected pruning, summary compaction, legacy strategies, and the [`Compactor`](compact::Compactor) orchestrator |
//! | [`estimate`] | [`TokenEstimator`](estimate::TokenEstimator) character-heuristic token counting |
//! | [`api`] | [`Summarizer`](api::Summarizer) capability trait and implementations |
//!
//! # Design principles
//!
//! 1. **Cheap edits first.** Structural pruning frees context without any
//!    LLM call. Summarization runs only at severe overflow, and only when
//!    pruning alone could not satisfy the budget.
//!
//! 2. **Never lose a tool pair.** A tool call and its result travel
//!    together. Eviction treats the pair as one unit; dropping half of it
//!    would leave the model staring at an answer with no question.
//!
//! 3. **Degrade, don't fail.** A summarizer error or timeout falls back to
//!    the pruned-only result. No error from this crate ever reaches the
//!    request-handling layer.
//!
//! 4. **Observability over magic.** Every result carries the
//!    [`OverflowVerdict`](compact::OverflowVerdict) and per-step counts
//!    that explain what the engine decided and why.

pub mod api;
pub mod compact;
pub mod estimate;
pub mod prelude;

use serde::{Deserialize, Serialize};

// ── Tool marker protocol ───────────────────────────────────────────

/// Sentinel prefix marking an embedded tool invocation block.
///
/// Upstream tool loops that deliver messages as opaque text embed their
/// tool traffic as `<action_call ...>...</action_call>` blocks. Structural
/// tagging ([`Message::tool_calls`]) is authoritative when present; marker
/// scanning is the ingestion-boundary fallback.
pub const ACTION_CALL_MARKER: &str = "<action_call";

/// Sentinel prefix marking an embedded tool result block.
///
/// Counterpart of [`ACTION_CALL_MARKER`] for
/// `<action_result ...>...</action_result>` blocks.
pub const ACTION_RESULT_MARKER: &str = "<action_result";

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// Message content: plain text, or a list of multimodal parts.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// The text content, if this is a plain-text message.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(t) => Some(t),
            MessageContent::Parts(_) => None,
        }
    }

    /// Whether any text in this content contains `marker`.
    pub fn has_marker(&self, marker: &str) -> bool {
        match self {
            MessageContent::Text(t) => t.contains(marker),
            MessageContent::Parts(parts) => parts.iter().any(|p| match p {
                ContentPart::Text { text } => text.contains(marker),
                _ => false,
            }),
        }
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        MessageContent::Text(s)
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        MessageContent::Text(s.to_string())
    }
}

/// One part of a multimodal content list.
///
/// Unrecognized part payloads deserialize into [`ContentPart::Other`] and
/// are carried through compaction verbatim; the estimator charges them a
/// minimal fixed cost instead of failing.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum ContentPart {
    /// Plain text part.
    Text { text: String },
    /// Image reference part.
    ImageUrl { image_url: ImageUrl },
    /// Unrecognized part payload, preserved verbatim.
    Other(serde_json::Value),
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ImageUrl {
    pub url: String,
}

/// A tool invocation attached to an assistant message.
///
/// `id` pairs the call with the tool-result message that answers it
/// (via [`Message::tool_call_id`]).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self {
            role: MessageRole::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_text(content: impl Into<MessageContent>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: None,
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<MessageContent>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }

    /// Whether this message issues a tool invocation.
    ///
    /// Structural tagging (a non-empty [`tool_calls`](Self::tool_calls)
    /// list) is authoritative; assistant messages ingested as opaque text
    /// are recognized by the [`ACTION_CALL_MARKER`] sentinel.
    pub fn is_tool_call(&self) -> bool {
        if self.tool_calls.as_ref().is_some_and(|c| !c.is_empty()) {
            return true;
        }
        self.role == MessageRole::Assistant && self.has_marker(ACTION_CALL_MARKER)
    }

    /// Whether this message carries a tool result.
    pub fn is_tool_result(&self) -> bool {
        self.role == MessageRole::Tool
            || self.tool_call_id.is_some()
            || self.has_marker(ACTION_RESULT_MARKER)
    }

    /// Whether eviction must treat this message as part of a tool pair.
    pub fn is_tool_bearing(&self) -> bool {
        self.is_tool_call() || self.is_tool_result()
    }

    /// Whether any text content contains `marker`.
    pub fn has_marker(&self, marker: &str) -> bool {
        self.content.as_ref().is_some_and(|c| c.has_marker(marker))
    }
}
