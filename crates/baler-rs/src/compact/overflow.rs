//! Overflow detection: decides whether and how badly a conversation
//! exceeds the usable token budget.
//!
//! The verdict is the single source of truth for the rest of the
//! pipeline: the orchestrator routes on its severity, and the final
//! result surfaces it verbatim as the decision trace. Assessment is a
//! total function: it never fails, whatever the inputs.

use serde::Serialize;
use tracing::debug;

use super::config::CompactionConfig;
use crate::Message;
use crate::estimate::TokenEstimator;

/// How badly the conversation overflows the usable budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Within budget; compaction is a no-op.
    None,
    /// Over budget by a tolerable margin; structural pruning suffices.
    Warning,
    /// Over budget beyond the tolerable margin; summarization may be
    /// needed.
    Severe,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::None => write!(f, "none"),
            Severity::Warning => write!(f, "warning"),
            Severity::Severe => write!(f, "severe"),
        }
    }
}

/// Verdict on one message list against one context limit.
#[derive(Debug, Clone, Serialize)]
pub struct OverflowVerdict {
    /// Whether estimated tokens exceed the usable limit.
    pub is_overflow: bool,
    /// Overflow severity band.
    pub severity: Severity,
    /// Estimated tokens over the usable limit (0 when within budget).
    pub overflow_amount: usize,
    /// Context limit minus the configured headroom.
    pub usable_limit: usize,
    /// Headroom reserved to avoid invalidating provider-side prompt
    /// caches on every compaction. Surfaced for callers that tune their
    /// own limits; never changes the verdict.
    pub cache_consideration: usize,
}

impl OverflowVerdict {
    fn within_budget(usable_limit: usize, cache_consideration: usize) -> Self {
        Self {
            is_overflow: false,
            severity: Severity::None,
            overflow_amount: 0,
            usable_limit,
            cache_consideration,
        }
    }
}

/// Assess a message list against a context limit.
///
/// `usable_limit = context_limit - overflow_threshold` (saturating).
/// Overflow up to `(1 - severe_threshold) * usable_limit` is a
/// [`Severity::Warning`]; beyond that it is [`Severity::Severe`]. An
/// empty message list never overflows; a zero usable limit makes any
/// non-empty input severe.
pub fn assess(
    messages: &[Message],
    context_limit: usize,
    config: &CompactionConfig,
    estimator: &TokenEstimator,
) -> OverflowVerdict {
    let usable_limit = context_limit.saturating_sub(config.overflow_threshold);
    let cache_consideration = config.overflow_threshold;

    if messages.is_empty() {
        return OverflowVerdict::within_budget(usable_limit, cache_consideration);
    }

    let used = estimator.count_messages(messages);
    let overflow_amount = used.saturating_sub(usable_limit);

    let severity = if overflow_amount == 0 {
        Severity::None
    } else {
        let tolerable = ((1.0 - config.severe_threshold) * usable_limit as f64) as usize;
        if overflow_amount > tolerable {
            Severity::Severe
        } else {
            Severity::Warning
        }
    };

    debug!(
        "overflow check: ~{} tokens used, usable limit {}, overflow {}, severity {}",
        used, usable_limit, overflow_amount, severity,
    );

    OverflowVerdict {
        is_overflow: overflow_amount > 0,
        severity,
        overflow_amount,
        usable_limit,
        cache_consideration,
    }
}
