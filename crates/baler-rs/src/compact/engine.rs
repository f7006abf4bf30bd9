//! The compaction orchestrator: one entry point that routes between
//! no-op, structural pruning, summary compaction, and the legacy
//! strategies, and always resolves to a valid [`CompactionResult`].
//!
//! Failure semantics are the point. A summarizer error or timeout
//! degrades to the pruned-only result; a budget that even full eviction
//! cannot satisfy yields a best-effort minimal list with the shortfall
//! still reported in the decision trace. Compaction degrades; it never
//! blocks the caller's request pipeline.

use serde::Serialize;
use tracing::{debug, warn};

use super::config::CompactionConfig;
use super::overflow::{self, OverflowVerdict, Severity};
use super::prune::protected_prune;
use super::strategy::compress_with_strategy;
use super::summary::summarize_prefix;
use crate::Message;
use crate::api::Summarizer;
use crate::estimate::TokenEstimator;

/// Which compaction step produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompactionType {
    /// No overflow; input returned unchanged.
    None,
    /// Structural pruning was the last step applied.
    Prune,
    /// Summary compaction was the last step applied.
    Summary,
    /// A legacy strategy ran (adaptive policy disabled).
    Strategy,
}

/// Observability counters for one compaction call.
#[derive(Debug, Clone, Serialize)]
pub struct CompactionStats {
    /// Whether any compaction step ran.
    pub was_compressed: bool,
    /// The last step actually applied.
    pub compaction_type: CompactionType,
    /// Messages evicted by pruning or truncation.
    pub removed_count: usize,
    /// Pruning candidates skipped as protected tool-pair members.
    pub protected_count: usize,
    /// Messages replaced by a synthetic summary.
    pub replaced_count: usize,
    /// Estimated tokens of the synthetic summary message (0 when no
    /// summary was produced).
    pub summary_token_count: usize,
    /// The overflow verdict that drove the routing decision.
    pub decision: OverflowVerdict,
}

/// Result of one compaction call: the new message list plus the
/// decision trace.
#[derive(Debug)]
pub struct CompactionResult {
    pub messages: Vec<Message>,
    pub stats: CompactionStats,
}

impl CompactionResult {
    pub(crate) fn unchanged(messages: Vec<Message>, decision: OverflowVerdict) -> Self {
        Self {
            messages,
            stats: CompactionStats {
                was_compressed: false,
                compaction_type: CompactionType::None,
                removed_count: 0,
                protected_count: 0,
                replaced_count: 0,
                summary_token_count: 0,
                decision,
            },
        }
    }
}

/// The compaction engine.
///
/// Stateless across calls: each [`compress()`](Self::compress) creates
/// and discards its own working set, so concurrent requests need no
/// locking; give each call its own message list. The summarizer is an
/// injected capability; without one the engine still works, it just
/// cannot escalate past pruning.
///
/// # Example
///
/// ```ignore
/// let summarizer = LlmSummarizer::new(api_key, "z-ai/glm-5")?;
/// let compactor = Compactor::new().with_summarizer(&summarizer);
/// let result = compactor
///     .compress(messages, model.context_limit, &CompactionConfig::default())
///     .await;
/// ```
#[derive(Default)]
pub struct Compactor<'a> {
    estimator: TokenEstimator,
    summarizer: Option<&'a dyn Summarizer>,
}

impl<'a> Compactor<'a> {
    /// Create a compactor with no summarizer and the default estimator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject the summarizer used for semantic compaction.
    pub fn with_summarizer(mut self, summarizer: &'a dyn Summarizer) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Override the token estimator (e.g. with a calibrated ratio).
    pub fn with_estimator(mut self, estimator: TokenEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    /// Compact `messages` to fit within `context_limit`.
    ///
    /// Never fails: configuration is normalized, the estimator is total,
    /// and summarizer failures degrade to the pruned-only result. The
    /// output always begins with the original system message (when one
    /// existed) and always ends with the original last message.
    pub async fn compress(
        &self,
        messages: Vec<Message>,
        context_limit: usize,
        config: &CompactionConfig,
    ) -> CompactionResult {
        let config = config.normalized();

        if !config.auto {
            return compress_with_strategy(
                messages,
                context_limit,
                &config,
                &self.estimator,
                self.summarizer,
            )
            .await;
        }

        let verdict = overflow::assess(&messages, context_limit, &config, &self.estimator);
        if verdict.severity == Severity::None {
            return CompactionResult::unchanged(messages, verdict);
        }
        debug!(
            "compacting: severity {}, ~{} tokens over a usable limit of {}",
            verdict.severity, verdict.overflow_amount, verdict.usable_limit,
        );

        let (mut current, removed_count, protected_count) =
            if verdict.severity == Severity::Warning || config.prune {
                let out =
                    protected_prune(messages, verdict.usable_limit, &config, &self.estimator);
                (out.messages, out.removed_count, out.protected_count)
            } else {
                (messages, 0, 0)
            };

        let mut compaction_type = CompactionType::Prune;
        let mut replaced_count = 0;
        let mut summary_token_count = 0;

        let still_over = self.estimator.count_messages(&current) > verdict.usable_limit;
        if still_over && verdict.severity == Severity::Severe && config.summary_on_severe {
            match self.summarizer {
                Some(summarizer) => {
                    match summarize_prefix(
                        &current,
                        verdict.usable_limit,
                        &config,
                        &self.estimator,
                        summarizer,
                    )
                    .await
                    {
                        Ok(out) if out.replaced_count > 0 => {
                            current = out.messages;
                            replaced_count = out.replaced_count;
                            summary_token_count = out.summary_token_count;
                            compaction_type = CompactionType::Summary;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!("summarization failed, returning pruned result: {e}");
                        }
                    }
                }
                None => {
                    warn!("severe overflow but no summarizer configured; pruned result only");
                }
            }
        }

        if self.estimator.count_messages(&current) > verdict.usable_limit {
            warn!(
                "budget unsatisfiable: best-effort result still ~{} tokens over",
                self.estimator
                    .count_messages(&current)
                    .saturating_sub(verdict.usable_limit),
            );
        }

        CompactionResult {
            messages: current,
            stats: CompactionStats {
                was_compressed: true,
                compaction_type,
                removed_count,
                protected_count,
                replaced_count,
                summary_token_count,
                decision: verdict,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::StaticSummarizer;
    use crate::compact::config::Strategy;
    use crate::{MessageRole, ToolCall};

    fn filler(len: usize) -> Message {
        Message::user("x".repeat(len))
    }

    fn call(id: &str) -> Message {
        Message::assistant_tool_calls(vec![ToolCall {
            id: id.into(),
            name: "read_file".into(),
            arguments: r#"{"path": "src/lib.rs"}"#.into(),
        }])
    }

    fn pair_intact(messages: &[Message]) -> bool {
        let call_ids: Vec<&str> = messages
            .iter()
            .filter_map(|m| m.tool_calls.as_ref())
            .flatten()
            .map(|c| c.id.as_str())
            .collect();
        let result_ids: Vec<&str> = messages
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        call_ids.iter().all(|id| result_ids.contains(id))
            && result_ids.iter().all(|id| call_ids.contains(id))
    }

    // ── Scenarios ─────────────────────────────────────────────────

    #[tokio::test]
    async fn scenario_a_two_short_messages_no_overflow() {
        let compactor = Compactor::new();
        let messages = vec![Message::user("hello"), Message::assistant_text("hi there")];
        let result = compactor
            .compress(messages.clone(), 8000, &CompactionConfig::default())
            .await;
        assert!(!result.stats.decision.is_overflow);
        assert!(!result.stats.was_compressed);
        assert_eq!(result.stats.compaction_type, CompactionType::None);
        assert_eq!(result.messages, messages);
    }

    #[tokio::test]
    async fn scenario_b_eighty_medium_messages_overflow() {
        let compactor = Compactor::new();
        let messages: Vec<Message> = (0..80)
            .map(|_| Message::user("compaction ".repeat(25)))
            .collect();
        let result = compactor
            .compress(messages, 8000, &CompactionConfig::default())
            .await;
        assert!(result.stats.decision.is_overflow);
        assert!(result.stats.decision.overflow_amount > 0);
        assert!(result.stats.was_compressed);
    }

    #[tokio::test]
    async fn scenario_c_five_hundred_large_messages_severe() {
        let compactor = Compactor::new();
        let messages: Vec<Message> = (0..500).map(|_| filler(400)).collect();
        let result = compactor
            .compress(messages, 8000, &CompactionConfig::default())
            .await;
        assert_eq!(result.stats.decision.severity, Severity::Severe);
    }

    #[tokio::test]
    async fn scenario_d_tool_pairs_survive_tiny_budget() {
        let compactor = Compactor::new();
        let messages = vec![
            Message::user("task"),
            call("c1"),
            Message::tool_result("c1", "first result ".repeat(30)),
            call("c2"),
            Message::tool_result("c2", "second result ".repeat(30)),
            Message::user("next"),
            Message::assistant_text("done"),
        ];
        let config = CompactionConfig::default().with_overflow_threshold(0);
        let result = compactor.compress(messages, 100, &config).await;
        assert!(result.stats.protected_count >= 1);
        assert!(pair_intact(&result.messages));
        assert!(result.messages.iter().any(|m| m.is_tool_call()));
        assert!(result.messages.iter().any(|m| m.is_tool_result()));
    }

    #[tokio::test]
    async fn scenario_e_auto_off_reports_strategy() {
        let compactor = Compactor::new();
        let messages: Vec<Message> = (0..500).map(|_| filler(400)).collect();
        let config = CompactionConfig::default()
            .with_auto(false)
            .with_strategy(Strategy::Truncate);
        let result = compactor.compress(messages, 8000, &config).await;
        assert_eq!(result.stats.decision.severity, Severity::Severe);
        assert_eq!(result.stats.compaction_type, CompactionType::Strategy);
    }

    #[tokio::test]
    async fn scenario_f_summary_disabled_stays_prune() {
        let summarizer = StaticSummarizer::new("should never be used");
        let compactor = Compactor::new().with_summarizer(&summarizer);
        // Protected pairs keep pruning from satisfying the budget.
        let mut messages = vec![Message::user("task")];
        for i in 0..10 {
            messages.push(call(&format!("c{i}")));
            messages.push(Message::tool_result(format!("c{i}"), "x".repeat(2000)));
        }
        let config = CompactionConfig::default()
            .with_overflow_threshold(0)
            .with_summary_on_severe(false);
        let result = compactor.compress(messages, 500, &config).await;
        assert_eq!(result.stats.decision.severity, Severity::Severe);
        assert_eq!(result.stats.summary_token_count, 0);
        assert_eq!(result.stats.replaced_count, 0);
        assert_eq!(result.stats.compaction_type, CompactionType::Prune);
    }

    // ── Properties ────────────────────────────────────────────────

    #[tokio::test]
    async fn idempotent_under_no_overflow() {
        let compactor = Compactor::new();
        for n in [0usize, 1, 5, 20] {
            let messages: Vec<Message> = (0..n).map(|i| Message::user(format!("msg {i}"))).collect();
            let result = compactor
                .compress(messages.clone(), 200_000, &CompactionConfig::default())
                .await;
            assert!(!result.stats.was_compressed);
            assert_eq!(result.messages, messages);
        }
    }

    #[tokio::test]
    async fn protected_pairs_never_split() {
        let summarizer = StaticSummarizer::new("condensed");
        let compactor = Compactor::new().with_summarizer(&summarizer);
        let mut messages = vec![Message::system("sys")];
        for i in 0..8 {
            messages.push(filler(500));
            messages.push(call(&format!("c{i}")));
            messages.push(Message::tool_result(format!("c{i}"), "x".repeat(500)));
        }
        messages.push(Message::assistant_text("done"));

        for limit in [200usize, 1000, 5000] {
            let config = CompactionConfig::default().with_overflow_threshold(0);
            let result = compactor.compress(messages.clone(), limit, &config).await;
            assert!(
                pair_intact(&result.messages),
                "pair split at limit {limit}: {:?}",
                result.stats,
            );
        }
    }

    #[tokio::test]
    async fn system_message_preserved_through_summary() {
        let summarizer = StaticSummarizer::new("condensed history");
        let compactor = Compactor::new().with_summarizer(&summarizer);
        // Protected pairs keep pruning from satisfying the budget, so the
        // engine must escalate to summarization.
        let mut messages = vec![Message::system("the one true system prompt")];
        for i in 0..12 {
            messages.push(call(&format!("c{i}")));
            messages.push(Message::tool_result(format!("c{i}"), "x".repeat(2000)));
        }
        let config = CompactionConfig::default().with_overflow_threshold(0);
        let result = compactor.compress(messages.clone(), 2000, &config).await;
        assert_eq!(result.stats.compaction_type, CompactionType::Summary);
        assert_eq!(result.messages[0], messages[0]);
    }

    #[tokio::test]
    async fn last_message_always_survives() {
        let summarizer = StaticSummarizer::new("condensed");
        let compactor = Compactor::new().with_summarizer(&summarizer);
        let mut messages: Vec<Message> = (0..30).map(|_| filler(600)).collect();
        messages.push(Message::assistant_text("the final word"));
        let config = CompactionConfig::default().with_overflow_threshold(0);
        let result = compactor.compress(messages.clone(), 1000, &config).await;
        assert_eq!(result.messages.last(), messages.last());
    }

    #[tokio::test]
    async fn token_count_monotonically_converges() {
        let summarizer = StaticSummarizer::new("short summary");
        let estimator = TokenEstimator::new();
        let compactor = Compactor::new().with_summarizer(&summarizer);
        let messages: Vec<Message> = (0..60).map(|_| filler(700)).collect();
        let before = estimator.count_messages(&messages);
        let config = CompactionConfig::default();
        let result = compactor.compress(messages, 8000, &config).await;
        assert!(result.stats.was_compressed);
        assert!(estimator.count_messages(&result.messages) <= before);
    }

    #[tokio::test]
    async fn severity_progression_none_warning_severe() {
        let compactor = Compactor::new();
        let config = CompactionConfig::default();
        // usable = 8000; tolerable overflow = 1600.
        let sizes_and_severities = [
            (20, Severity::None),     // ~2080 tokens
            (88, Severity::Warning),  // ~9152 tokens
            (120, Severity::Severe),  // ~12480 tokens
        ];
        for (n, expected) in sizes_and_severities {
            let messages: Vec<Message> = (0..n).map(|_| filler(350)).collect();
            let result = compactor
                .compress(messages, 12_000, &config)
                .await;
            assert_eq!(
                result.stats.decision.severity, expected,
                "{n} messages should be {expected:?}",
            );
        }
    }

    #[tokio::test]
    async fn summarizer_failure_degrades_to_pruned_result() {
        struct Exploding;
        impl Summarizer for Exploding {
            fn summarize<'b>(
                &'b self,
                _text: &'b str,
                _budget_tokens: u32,
            ) -> crate::api::SummaryFuture<'b> {
                Box::pin(async { Err("boom".to_string()) })
            }
        }
        let failing = Exploding;
        let compactor = Compactor::new().with_summarizer(&failing);
        // Interleave evictable fillers with protected pairs so pruning
        // removes something but cannot satisfy the budget, forcing the
        // engine to attempt (and survive) the failing summarizer.
        let mut messages = vec![Message::system("sys")];
        for i in 0..10 {
            messages.push(filler(350));
            messages.push(call(&format!("c{i}")));
            messages.push(Message::tool_result(format!("c{i}"), "x".repeat(2000)));
        }
        let config = CompactionConfig::default().with_overflow_threshold(0);
        let result = compactor.compress(messages, 2000, &config).await;
        assert_eq!(result.stats.compaction_type, CompactionType::Prune);
        assert_eq!(result.stats.replaced_count, 0);
        assert!(result.stats.removed_count > 0);
        assert!(result.stats.was_compressed);
    }

    #[tokio::test]
    async fn budget_unsatisfiable_reports_soft_warning() {
        let compactor = Compactor::new();
        // A single protected pair larger than the whole budget.
        let messages = vec![
            Message::system("sys"),
            call("c1"),
            Message::tool_result("c1", "x".repeat(50_000)),
            Message::user("latest"),
        ];
        let config = CompactionConfig::default().with_overflow_threshold(0);
        let estimator = TokenEstimator::new();
        let result = compactor.compress(messages.clone(), 100, &config).await;
        assert!(result.stats.was_compressed);
        assert!(result.stats.decision.overflow_amount > 0);
        assert!(estimator.count_messages(&result.messages) > 100);
        // Best-effort minimal list: system + protected pair + last message.
        assert_eq!(result.messages.len(), messages.len());
        assert!(pair_intact(&result.messages));
    }

    #[tokio::test]
    async fn severe_without_prune_flag_goes_straight_to_summary() {
        let summarizer = StaticSummarizer::new("condensed");
        let compactor = Compactor::new().with_summarizer(&summarizer);
        let mut messages = vec![Message::system("sys")];
        messages.extend((0..50).map(|_| filler(800)));
        let config = CompactionConfig::default()
            .with_prune(false)
            .with_overflow_threshold(0);
        let result = compactor.compress(messages, 2000, &config).await;
        assert_eq!(result.stats.removed_count, 0);
        assert_eq!(result.stats.compaction_type, CompactionType::Summary);
        assert!(result.stats.replaced_count > 0);
    }

    #[tokio::test]
    async fn decision_trace_carries_verdict() {
        let compactor = Compactor::new();
        let messages: Vec<Message> = (0..80).map(|_| filler(700)).collect();
        let result = compactor
            .compress(messages, 8000, &CompactionConfig::default())
            .await;
        let decision = &result.stats.decision;
        assert_eq!(decision.usable_limit, 4000);
        assert_eq!(decision.cache_consideration, 4000);
        assert!(decision.is_overflow);
    }
}
