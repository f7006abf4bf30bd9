//! Legacy strategy compressor: four named, mutually exclusive fallback
//! strategies for callers that disable the adaptive policy.
//!
//! Selected by [`Strategy`](super::config::Strategy) name when
//! `config.auto` is `false`. Unlike the adaptive path there is no
//! severity-based escalation: the chosen strategy runs whenever the
//! conversation overflows, full stop. Every strategy keeps the leading
//! system message and the final message.

use tracing::warn;

use super::config::{CompactionConfig, Strategy};
use super::engine::{CompactionResult, CompactionStats, CompactionType};
use super::prune::protected_prune;
use super::summary::summarize_prefix;
use super::{overflow, overflow::Severity};
use crate::api::Summarizer;
use crate::estimate::TokenEstimator;
use crate::{Message, MessageRole};

/// Run the configured legacy strategy against `messages`.
///
/// Returns the input unchanged (and `was_compressed = false`) when the
/// conversation does not overflow; otherwise the result always reports
/// `compaction_type = Strategy`.
pub async fn compress_with_strategy(
    messages: Vec<Message>,
    context_limit: usize,
    config: &CompactionConfig,
    estimator: &TokenEstimator,
    summarizer: Option<&dyn Summarizer>,
) -> CompactionResult {
    let verdict = overflow::assess(&messages, context_limit, config, estimator);
    if verdict.severity == Severity::None {
        return CompactionResult::unchanged(messages, verdict);
    }

    let mut removed_count = 0;
    let mut protected_count = 0;
    let mut replaced_count = 0;
    let mut summary_token_count = 0;

    let messages = match config.strategy {
        Strategy::Truncate => {
            let (messages, removed) =
                truncate_oldest(messages, verdict.usable_limit, estimator);
            removed_count = removed;
            messages
        }
        Strategy::Prune => {
            let out = protected_prune(messages, verdict.usable_limit, config, estimator);
            removed_count = out.removed_count;
            protected_count = out.protected_count;
            out.messages
        }
        Strategy::Summary => {
            let (messages, replaced, tokens) = summarize_or_prune(
                messages,
                verdict.usable_limit,
                config,
                estimator,
                summarizer,
                &mut removed_count,
                &mut protected_count,
            )
            .await;
            replaced_count = replaced;
            summary_token_count = tokens;
            messages
        }
        Strategy::Hybrid => {
            let out = protected_prune(messages, verdict.usable_limit, config, estimator);
            removed_count = out.removed_count;
            protected_count = out.protected_count;
            let mut messages = out.messages;
            if estimator.count_messages(&messages) > verdict.usable_limit {
                let (compacted, replaced, tokens) = summarize_or_prune(
                    messages,
                    verdict.usable_limit,
                    config,
                    estimator,
                    summarizer,
                    &mut removed_count,
                    &mut protected_count,
                )
                .await;
                messages = compacted;
                replaced_count = replaced;
                summary_token_count = tokens;
            }
            messages
        }
    };

    CompactionResult {
        messages,
        stats: CompactionStats {
            was_compressed: true,
            compaction_type: CompactionType::Strategy,
            removed_count,
            protected_count,
            replaced_count,
            summary_token_count,
            decision: verdict,
        },
    }
}

/// Summarize the full collapsible prefix, degrading to a protected
/// prune when no summarizer is available or the call fails.
async fn summarize_or_prune(
    messages: Vec<Message>,
    usable_limit: usize,
    config: &CompactionConfig,
    estimator: &TokenEstimator,
    summarizer: Option<&dyn Summarizer>,
    removed_count: &mut usize,
    protected_count: &mut usize,
) -> (Vec<Message>, usize, usize) {
    // Explicit strategy selection overrides the severe-only gate.
    let summary_config = config.clone().with_summary_on_severe(true);

    if let Some(summarizer) = summarizer {
        match summarize_prefix(&messages, usable_limit, &summary_config, estimator, summarizer)
            .await
        {
            Ok(out) => return (out.messages, out.replaced_count, out.summary_token_count),
            Err(e) => warn!("summary strategy failed, degrading to prune: {e}"),
        }
    } else {
        warn!("summary strategy selected but no summarizer configured; degrading to prune");
    }

    let out = protected_prune(messages, usable_limit, config, estimator);
    *removed_count += out.removed_count;
    *protected_count += out.protected_count;
    (out.messages, 0, 0)
}

/// Drop the oldest messages, tool protection ignored, until the
/// estimate fits. The leading system message and the final message are
/// never dropped.
fn truncate_oldest(
    messages: Vec<Message>,
    usable_limit: usize,
    estimator: &TokenEstimator,
) -> (Vec<Message>, usize) {
    let costs: Vec<usize> = messages.iter().map(|m| estimator.count_message(m)).collect();
    let mut total: usize = costs.iter().sum();

    let len = messages.len();
    let head = usize::from(
        messages
            .first()
            .is_some_and(|m| m.role == MessageRole::System),
    );

    let mut cut = head;
    while total > usable_limit && cut + 1 < len {
        total -= costs[cut];
        cut += 1;
    }
    let removed = cut - head;

    let mut result: Vec<Message> = Vec::with_capacity(len - removed);
    let mut iter = messages.into_iter();
    for _ in 0..head {
        if let Some(msg) = iter.next() {
            result.push(msg);
        }
    }
    result.extend(iter.skip(removed));

    (result, removed)
}
