//! Convenience re-exports for common `baler-rs` types.
//!
//! Meant to be glob-imported when wiring compaction into a chat
//! pipeline:
//!
//! ```ignore
//! use baler_rs::prelude::*;
//! ```
//!
//! This pulls in the message model, the [`Compactor`] entry point with
//! its config and result types, and the [`Summarizer`] capability.
//! Specialized items (the individual pruning/summary functions, wire
//! constants) are intentionally excluded; import those from their
//! modules directly when needed.

// ── Message model ───────────────────────────────────────────────────
pub use crate::{ContentPart, ImageUrl, Message, MessageContent, MessageRole, ToolCall};

// ── Compaction engine ───────────────────────────────────────────────
pub use crate::compact::{
    CompactionConfig, CompactionResult, CompactionStats, CompactionType, Compactor,
    OverflowVerdict, Severity, Strategy,
};

// ── Estimation ──────────────────────────────────────────────────────
pub use crate::estimate::TokenEstimator;

// ── Summarizer capability ───────────────────────────────────────────
pub use crate::api::{LlmSummarizer, StaticSummarizer, Summarizer};
