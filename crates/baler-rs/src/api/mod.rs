//! The summarizer capability: an injected seam between the compaction
//! engine and whatever produces condensed text.
//!
//! The engine never talks to an LLM directly. It asks a [`Summarizer`]
//! (typically [`LlmSummarizer`] in production, [`StaticSummarizer`] in
//! tests) and treats the call as unreliable: a single attempt with a
//! caller-supplied timeout, whose failure the orchestrator absorbs by
//! falling back to the pruned-only result.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// OpenRouter chat completions endpoint used by [`LlmSummarizer`].
pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for summarization calls (cheap and fast beats smart
/// here).
pub const DEFAULT_SUMMARY_MODEL: &str = "z-ai/glm-5";

/// Default timeout for one summarization attempt.
pub const DEFAULT_SUMMARY_TIMEOUT: Duration = Duration::from_secs(30);

/// Boxed future returned by [`Summarizer::summarize`].
///
/// Type alias to keep trait signatures and implementations readable.
pub type SummaryFuture<'a> = Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>>;

/// A capability that condenses text into roughly `budget_tokens` tokens.
///
/// Implementations own their timeout and make exactly one attempt. The
/// engine never retries, and a returned `Err` degrades compaction rather
/// than failing the caller's request.
pub trait Summarizer: Send + Sync {
    fn summarize<'a>(&'a self, text: &'a str, budget_tokens: u32) -> SummaryFuture<'a>;
}

// ── Deterministic test double ──────────────────────────────────────

/// A summarizer that always returns the same canned text.
///
/// Keeps engine tests reproducible: every property test that exercises
/// the summary path substitutes this for the LLM.
#[derive(Debug, Clone)]
pub struct StaticSummarizer {
    summary: String,
}

impl StaticSummarizer {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
        }
    }
}

impl Summarizer for StaticSummarizer {
    fn summarize<'a>(&'a self, _text: &'a str, _budget_tokens: u32) -> SummaryFuture<'a> {
        Box::pin(async move { Ok(self.summary.clone()) })
    }
}

// ── LLM-backed implementation ──────────────────────────────────────

/// Summarizer backed by an OpenRouter chat completion.
///
/// One request per call, no retries; the per-attempt timeout is applied
/// on the request itself so a hung provider degrades compaction instead
/// of stalling the pipeline.
pub struct LlmSummarizer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl LlmSummarizer {
    /// Create a summarizer with the given API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("baler-rs/0.1")
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            timeout: DEFAULT_SUMMARY_TIMEOUT,
        })
    }

    /// Override the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn complete(&self, text: &str, budget_tokens: u32) -> Result<String, String> {
        let body = CompletionRequest {
            model: &self.model,
            messages: vec![WireMessage {
                role: "user",
                content: text,
            }],
            max_tokens: budget_tokens,
            temperature: 0.3,
        };

        debug!(
            "summarize request: model={}, {} chars in, {} token budget",
            self.model,
            text.len(),
            budget_tokens,
        );
        let start = Instant::now();

        let resp = self
            .client
            .post(OPENROUTER_URL)
            .timeout(self.timeout)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("summarize request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read summarize response: {e}"))?;

        debug!(
            "summarize response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len(),
        );

        if !status.is_success() {
            return Err(format!("summarize API HTTP {status}: {text}"));
        }

        let parsed: CompletionResponse = serde_json::from_str(&text)
            .map_err(|e| format!("failed to parse summarize response: {e}"))?;

        if let Some(err) = parsed.error {
            return Err(format!("summarize API error: {}", err.message));
        }

        parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message.content)
            .ok_or_else(|| "empty summarize response".to_string())
    }
}

impl Summarizer for LlmSummarizer {
    fn summarize<'a>(&'a self, text: &'a str, budget_tokens: u32) -> SummaryFuture<'a> {
        Box::pin(self.complete(text, budget_tokens))
    }
}

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize, Debug)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct CompletionResponse {
    choices: Option<Vec<WireChoice>>,
    error: Option<WireError>,
}

#[derive(Deserialize, Debug)]
struct WireChoice {
    message: WireChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct WireChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct WireError {
    message: String,
}
