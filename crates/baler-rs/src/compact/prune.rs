//! Protected pruning: structural eviction of the oldest unprotected
//! messages.
//!
//! The cheapest way out of overflow. Walks the conversation oldest to
//! newest and drops messages until the estimate fits the usable limit,
//! subject to three guardrails: the leading system message is never a
//! candidate, the most recent messages are never candidates (the final
//! exchange must survive), and when tool protection is on, a tool call
//! and its result are one unit that eviction cannot split, even when
//! only one half sits inside the recency window.

use std::collections::HashMap;

use tracing::debug;

use super::config::CompactionConfig;
use crate::estimate::TokenEstimator;
use crate::{Message, MessageRole};

/// Number of trailing messages excluded from eviction. Sized so the
/// final user/assistant exchange plus one tool pair always survives.
pub const KEEP_RECENT_MESSAGES: usize = 4;

/// Outcome of one pruning pass.
#[derive(Debug)]
pub struct PruneOutcome {
    /// Surviving messages, relative order preserved.
    pub messages: Vec<Message>,
    /// Messages evicted.
    pub removed_count: usize,
    /// Candidates skipped because they belong to a protected tool pair.
    pub protected_count: usize,
}

/// Assign each message to a tool pair group.
///
/// Structurally tagged traffic pairs by id: an assistant message with
/// `tool_calls` opens a group, and every tool result whose
/// `tool_call_id` matches one of those calls joins it. Marker-tagged
/// messages (opaque-text ingestion) pair adjacently: a call marker opens
/// a group that the result markers immediately following it join. An
/// orphan result forms a group of its own.
pub(crate) fn pair_groups(messages: &[Message]) -> Vec<Option<usize>> {
    let mut groups: Vec<Option<usize>> = vec![None; messages.len()];
    let mut next_group = 0;

    // Structural pass: pair by call id.
    let mut group_by_call_id: HashMap<&str, usize> = HashMap::new();
    for (i, msg) in messages.iter().enumerate() {
        if let Some(calls) = &msg.tool_calls
            && !calls.is_empty()
        {
            let group = next_group;
            next_group += 1;
            groups[i] = Some(group);
            for call in calls {
                group_by_call_id.insert(call.id.as_str(), group);
            }
        } else if let Some(id) = &msg.tool_call_id {
            groups[i] = Some(match group_by_call_id.get(id.as_str()) {
                Some(&group) => group,
                None => {
                    let group = next_group;
                    next_group += 1;
                    group
                }
            });
        }
    }

    // Marker pass: adjacency pairing for messages that arrived as
    // opaque text.
    let mut open_group: Option<usize> = None;
    for (i, msg) in messages.iter().enumerate() {
        if groups[i].is_some() {
            open_group = None;
            continue;
        }
        if msg.is_tool_call() {
            let group = next_group;
            next_group += 1;
            groups[i] = Some(group);
            open_group = Some(group);
        } else if msg.is_tool_result() {
            groups[i] = Some(match open_group {
                Some(group) => group,
                None => {
                    let group = next_group;
                    next_group += 1;
                    group
                }
            });
        } else {
            open_group = None;
        }
    }

    groups
}

/// Evict the oldest unprotected messages until the estimate fits
/// `usable_limit`.
///
/// Returns the input unchanged when `config.prune` is `false` or the
/// list is already within budget. When every remaining candidate is
/// protected the result is best-effort (still over budget) and the
/// orchestrator decides whether to escalate.
pub fn protected_prune(
    messages: Vec<Message>,
    usable_limit: usize,
    config: &CompactionConfig,
    estimator: &TokenEstimator,
) -> PruneOutcome {
    if !config.prune {
        return PruneOutcome {
            messages,
            removed_count: 0,
            protected_count: 0,
        };
    }

    let costs: Vec<usize> = messages.iter().map(|m| estimator.count_message(m)).collect();
    let mut total: usize = costs.iter().sum();
    if total <= usable_limit {
        return PruneOutcome {
            messages,
            removed_count: 0,
            protected_count: 0,
        };
    }

    let len = messages.len();
    let first_candidate = usize::from(
        messages
            .first()
            .is_some_and(|m| m.role == MessageRole::System),
    );
    let suffix_start = len.saturating_sub(KEEP_RECENT_MESSAGES);

    let mut keep = vec![true; len];
    let mut removed_count = 0;
    let mut protected_count = 0;

    for i in first_candidate..suffix_start {
        if total <= usable_limit {
            break;
        }
        if config.protect_tools && messages[i].is_tool_bearing() {
            protected_count += 1;
            continue;
        }
        keep[i] = false;
        removed_count += 1;
        total -= costs[i];
    }

    debug!(
        "prune: removed {}, protected {}, ~{} tokens remain (limit {})",
        removed_count, protected_count, total, usable_limit,
    );

    let messages = messages
        .into_iter()
        .zip(keep)
        .filter_map(|(msg, kept)| kept.then_some(msg))
        .collect();

    PruneOutcome {
        messages,
        removed_count,
        protected_count,
    }
}
