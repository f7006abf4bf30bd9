//! Summary compaction: collapse an old message range into one condensed
//! assistant message.
//!
//! The expensive path. Invoked only when structural pruning could not
//! satisfy the budget at severe overflow. The conversation is split into
//! a leading system message (kept verbatim), an older collapsible
//! prefix, and a recent suffix sized so the final exchange (and any
//! tool pair touching the boundary) stays intact. The prefix is
//! rendered as a transcript, condensed by the injected
//! [`Summarizer`](crate::api::Summarizer), and replaced with a single
//! synthetic assistant message.

use tracing::debug;

use super::config::CompactionConfig;
use super::prune::{KEEP_RECENT_MESSAGES, pair_groups};
use crate::api::Summarizer;
use crate::estimate::TokenEstimator;
use crate::{ContentPart, Message, MessageContent, MessageRole};

/// Instructions prepended to the transcript sent to the summarizer.
const SUMMARY_INSTRUCTIONS: &str = "\
Summarize the following conversation messages concisely. Focus on:
- What was accomplished and what remains to be done
- Key findings and decisions made
- Failed approaches (what was tried and why it failed)
- File paths, identifiers, and error messages, preserved verbatim

Rules:
- Only include facts explicitly stated in the messages. Do not infer or extrapolate.
- Be concise. Every token must earn its place.
- The result must be a standalone summary that fully replaces the messages.";

/// Outcome of one summary compaction pass.
#[derive(Debug)]
pub struct SummaryOutcome {
    /// New message list: [system?][synthetic summary][recent suffix].
    pub messages: Vec<Message>,
    /// Original messages replaced by the synthetic summary.
    pub replaced_count: usize,
    /// Estimated tokens of the synthetic summary message.
    pub summary_token_count: usize,
}

impl SummaryOutcome {
    fn unchanged(messages: Vec<Message>) -> Self {
        Self {
            messages,
            replaced_count: 0,
            summary_token_count: 0,
        }
    }
}

/// Replace the collapsible prefix of `messages` with one condensed
/// assistant message.
///
/// No-op when `config.summary_on_severe` is `false` or there is nothing
/// collapsible. Summarizer failure propagates as `Err`; the
/// orchestrator owns the fail-soft fallback.
pub async fn summarize_prefix(
    messages: &[Message],
    usable_limit: usize,
    config: &CompactionConfig,
    estimator: &TokenEstimator,
    summarizer: &dyn Summarizer,
) -> Result<SummaryOutcome, String> {
    if !config.summary_on_severe {
        return Ok(SummaryOutcome::unchanged(messages.to_vec()));
    }

    let head = usize::from(
        messages
            .first()
            .is_some_and(|m| m.role == MessageRole::System),
    );
    let suffix_start = collapse_boundary(messages, head);
    if suffix_start <= head {
        return Ok(SummaryOutcome::unchanged(messages.to_vec()));
    }

    let collapsible = &messages[head..suffix_start];
    let transcript = render_transcript(collapsible);
    let request = format!("{SUMMARY_INSTRUCTIONS}\n\n{transcript}");

    // Cap the requested summary size so the condensed message cannot
    // itself crowd out the budget it is meant to restore.
    let budget = config
        .summary_budget
        .min(((usable_limit / 4).max(1)) as u32)
        .max(1);

    debug!(
        "summarizing {} messages (~{} tokens) into a {}-token budget",
        collapsible.len(),
        estimator.count_messages(collapsible),
        budget,
    );

    let summary_text = summarizer.summarize(&request, budget).await?;
    let synthetic =
        Message::assistant_text(format!("<context_summary>\n{summary_text}\n</context_summary>"));
    let summary_token_count = estimator.count_message(&synthetic);

    let mut result = Vec::with_capacity(head + 1 + (messages.len() - suffix_start));
    result.extend_from_slice(&messages[..head]);
    result.push(synthetic);
    result.extend_from_slice(&messages[suffix_start..]);

    Ok(SummaryOutcome {
        messages: result,
        replaced_count: suffix_start - head,
        summary_token_count,
    })
}

/// First index of the recent suffix that must survive verbatim.
///
/// Starts `KEEP_RECENT_MESSAGES` from the end and moves earlier until no
/// tool pair straddles the boundary.
fn collapse_boundary(messages: &[Message], head: usize) -> usize {
    let groups = pair_groups(messages);
    let mut suffix_start = messages.len().saturating_sub(KEEP_RECENT_MESSAGES).max(head);

    loop {
        let kept: Vec<usize> = groups[suffix_start..].iter().flatten().copied().collect();
        let straddler = (head..suffix_start)
            .find(|&i| groups[i].is_some_and(|g| kept.contains(&g)));
        match straddler {
            Some(i) => suffix_start = i,
            None => return suffix_start,
        }
    }
}

/// Render messages as a `[role]: text` transcript for the summarizer.
fn render_transcript(messages: &[Message]) -> String {
    let mut transcript = String::new();
    for msg in messages {
        let text = match &msg.content {
            Some(MessageContent::Text(t)) => t.clone(),
            Some(MessageContent::Parts(parts)) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => text.as_str(),
                    ContentPart::ImageUrl { .. } => "[image]",
                    ContentPart::Other(_) => "[attachment]",
                })
                .collect::<Vec<_>>()
                .join("\n"),
            None => "[no content]".to_string(),
        };
        transcript.push_str(&format!("[{}]: {}\n", msg.role, text));
        if let Some(calls) = &msg.tool_calls {
            for call in calls {
                transcript.push_str(&format!("[action_call {}]: {}\n", call.name, call.arguments));
            }
        }
        transcript.push('\n');
    }
    transcript
}
