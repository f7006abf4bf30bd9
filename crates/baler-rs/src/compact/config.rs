//! Compaction configuration: every field optional on the wire, defaults
//! filled and invalid values clamped during normalization.
//!
//! There is no process-wide default config: callers pass an explicit
//! [`CompactionConfig`] on every invocation, built either in code through
//! the builder methods or deserialized from a gateway config file.
//! Malformed values are clamped or replaced with their defaults, never
//! rejected: a bad config line must not take the request pipeline down.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Default token headroom reserved below the hard context limit.
pub const DEFAULT_OVERFLOW_THRESHOLD: usize = 4000;

/// Default fraction of the usable budget that marks "severe" overflow.
pub const DEFAULT_SEVERE_THRESHOLD: f64 = 0.8;

/// Default maximum tokens requested from the summarizer.
pub const DEFAULT_SUMMARY_BUDGET: u32 = 2048;

/// Legacy fallback strategy, selected by name when the adaptive policy
/// is disabled.
///
/// Unknown names fall back to [`Strategy::Truncate`] rather than failing
/// deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Drop oldest messages, ignoring tool protection, until under budget.
    #[default]
    Truncate,
    /// Structural pruning only, no severity-based escalation.
    Prune,
    /// Always summarize the full collapsible prefix.
    Summary,
    /// Prune first, then summarize any remainder still over budget.
    Hybrid,
}

impl Strategy {
    /// Resolve a strategy from its wire name. Unknown names map to the
    /// default.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "prune" => Strategy::Prune,
            "summary" => Strategy::Summary,
            "hybrid" => Strategy::Hybrid,
            _ => Strategy::Truncate,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Truncate => "truncate",
            Strategy::Prune => "prune",
            Strategy::Summary => "summary",
            Strategy::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Strategy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Strategy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Strategy::from_name(&name))
    }
}

/// Configuration for one compaction pass.
///
/// All fields are optional on the wire and default to the adaptive
/// policy. Two construction patterns are supported: builder methods for
/// code, serde for config files (camelCase keys, unset fields filled
/// with defaults).
///
/// # Example
///
/// ```
/// use baler_rs::compact::{CompactionConfig, Strategy};
///
/// let config = CompactionConfig::default()
///     .with_overflow_threshold(2000)
///     .with_summary_on_severe(false);
/// assert!(config.auto);
///
/// let from_file: CompactionConfig =
///     serde_json::from_str(r#"{"auto": false, "strategy": "hybrid"}"#).unwrap();
/// assert_eq!(from_file.strategy, Strategy::Hybrid);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompactionConfig {
    /// Enable the adaptive policy. `false` forces the legacy strategy
    /// compressor.
    pub auto: bool,
    /// Allow the structural pruning step.
    pub prune: bool,
    /// Never evict tool-bearing pairs during pruning.
    pub protect_tools: bool,
    /// Token headroom reserved below the hard context limit. Negative
    /// wire values are clamped to 0.
    #[serde(deserialize_with = "clamped_token_count")]
    pub overflow_threshold: usize,
    /// Allow semantic summarization when severity is severe.
    pub summary_on_severe: bool,
    /// Fraction of the usable budget that marks "severe": overflow beyond
    /// `(1 - severeThreshold) * usableLimit` escalates. Clamped to [0, 1].
    pub severe_threshold: f64,
    /// Legacy strategy used when `auto` is `false`.
    pub strategy: Strategy,
    /// Maximum tokens requested from the summarizer for the condensed
    /// message. Clamped to at least 1.
    pub summary_budget: u32,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            auto: true,
            prune: true,
            protect_tools: true,
            overflow_threshold: DEFAULT_OVERFLOW_THRESHOLD,
            summary_on_severe: true,
            severe_threshold: DEFAULT_SEVERE_THRESHOLD,
            strategy: Strategy::default(),
            summary_budget: DEFAULT_SUMMARY_BUDGET,
        }
    }
}

impl CompactionConfig {
    // ── Builder methods ───────────────────────────────────────────

    pub fn with_auto(mut self, auto: bool) -> Self {
        self.auto = auto;
        self
    }

    pub fn with_prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    pub fn with_protect_tools(mut self, protect: bool) -> Self {
        self.protect_tools = protect;
        self
    }

    pub fn with_overflow_threshold(mut self, tokens: usize) -> Self {
        self.overflow_threshold = tokens;
        self
    }

    pub fn with_summary_on_severe(mut self, allow: bool) -> Self {
        self.summary_on_severe = allow;
        self
    }

    pub fn with_severe_threshold(mut self, fraction: f64) -> Self {
        self.severe_threshold = fraction;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_summary_budget(mut self, tokens: u32) -> Self {
        self.summary_budget = tokens;
        self
    }

    /// Return a copy with every field forced into its valid range.
    ///
    /// The orchestrator normalizes once at the top of `compress()`; the
    /// inner layers can then assume sane values.
    pub fn normalized(&self) -> Self {
        let mut config = self.clone();
        if !config.severe_threshold.is_finite() {
            config.severe_threshold = DEFAULT_SEVERE_THRESHOLD;
        }
        config.severe_threshold = config.severe_threshold.clamp(0.0, 1.0);
        config.summary_budget = config.summary_budget.max(1);
        config
    }
}

/// Deserialize a token count, clamping negative or non-finite wire
/// values to 0 instead of failing.
fn clamped_token_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    let raw = f64::deserialize(deserializer)?;
    if !raw.is_finite() || raw <= 0.0 {
        return Ok(0);
    }
    Ok(raw as usize)
}
