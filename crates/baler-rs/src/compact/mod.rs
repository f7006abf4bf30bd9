//! Context compaction: overflow detection, pruning, summarization, and
//! the orchestrator that ties them together.
//!
//! Compaction is a bounded-resource eviction problem with competing
//! invariants: never separate a tool call from its result, never touch
//! the system prompt, always keep the most recent exchange, and reach
//! for an LLM summary only when structural edits cannot satisfy the
//! budget. This module provides the layered strategies, cheapest first:
//!
//! 1. **[`overflow`]** — decides *whether* and *how badly* a message list
//!    exceeds the usable budget ([`OverflowVerdict`], [`Severity`]).
//!
//! 2. **[`prune`]** — structural eviction: drops the oldest unprotected
//!    messages. No LLM call, no information synthesized, highest ROI.
//!
//! 3. **[`summary`]** — semantic eviction: collapses an old message range
//!    into one condensed assistant message via an injected
//!    [`Summarizer`](crate::api::Summarizer).
//!
//! 4. **[`strategy`]** — four named fallback strategies (truncate, prune,
//!    summary, hybrid) for callers that disable the adaptive policy.
//!
//! [`engine::Compactor`] is the entry point; it routes between the layers
//! and guarantees that every call, including every failure path,
//! resolves to a valid [`CompactionResult`].

pub mod config;
pub mod engine;
pub mod overflow;
pub mod prune;
pub mod strategy;
pub mod summary;

// Re-export commonly used items at the module level.
pub use config::{CompactionConfig, Strategy};
pub use engine::{CompactionResult, CompactionStats, CompactionType, Compactor};
pub use overflow::{OverflowVerdict, Severity};
pub use prune::KEEP_RECENT_MESSAGES;
