//! Prompt and response screening
//!
//! Filters only decide allow or block; what they look for is configuration.
//! Pre-filters see the prompt before routing, post-filters see the generated
//! text. The first filter that blocks wins.

use crate::config::SecurityConfig;
use serde::Serialize;
use std::sync::Arc;

/// Why a text was refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockDecision {
    pub reason: String,
    /// Short classification tag, e.g. `blocked_phrase`
    pub classification: String,
}

impl BlockDecision {
    pub fn new(reason: impl Into<String>, classification: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            classification: classification.into(),
        }
    }
}

/// One screening step
pub trait SecurityFilter: Send + Sync {
    fn name(&self) -> &str;

    /// `None` allows the text
    fn inspect(&self, text: &str) -> Option<BlockDecision>;
}

/// Blocks text containing any configured phrase, ignoring case
#[derive(Debug, Clone)]
pub struct PhraseFilter {
    phrases: Vec<String>,
}

impl PhraseFilter {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases = phrases
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases }
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }
}

impl SecurityFilter for PhraseFilter {
    fn name(&self) -> &str {
        "phrase"
    }

    fn inspect(&self, text: &str) -> Option<BlockDecision> {
        let lowered = text.to_lowercase();
        self.phrases
            .iter()
            .find(|phrase| lowered.contains(phrase.as_str()))
            .map(|phrase| {
                BlockDecision::new(
                    format!("Text contains blocked phrase '{}'", phrase),
                    "blocked_phrase",
                )
            })
    }
}

/// Blocks prompts longer than a character limit
#[derive(Debug, Clone, Copy)]
pub struct LengthFilter {
    max_chars: usize,
}

impl LengthFilter {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

impl SecurityFilter for LengthFilter {
    fn name(&self) -> &str {
        "length"
    }

    fn inspect(&self, text: &str) -> Option<BlockDecision> {
        // Characters, not bytes
        let chars = text.chars().count();
        (chars > self.max_chars).then(|| {
            BlockDecision::new(
                format!(
                    "Prompt exceeds maximum length of {} characters (got {})",
                    self.max_chars, chars
                ),
                "prompt_too_long",
            )
        })
    }
}

/// Ordered pre- and post-generation filters
#[derive(Clone, Default)]
pub struct SecurityPipeline {
    pre: Vec<Arc<dyn SecurityFilter>>,
    post: Vec<Arc<dyn SecurityFilter>>,
}

impl SecurityPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pre(mut self, filter: Arc<dyn SecurityFilter>) -> Self {
        self.pre.push(filter);
        self
    }

    pub fn with_post(mut self, filter: Arc<dyn SecurityFilter>) -> Self {
        self.post.push(filter);
        self
    }

    /// Length check and phrase list on the prompt; phrase list on the response
    pub fn from_config(config: &SecurityConfig) -> Self {
        let mut pipeline = Self::new();
        if config.max_prompt_chars > 0 {
            pipeline = pipeline.with_pre(Arc::new(LengthFilter::new(config.max_prompt_chars)));
        }

        let phrases = PhraseFilter::new(&config.blocked_phrases);
        if !phrases.is_empty() {
            let phrases = Arc::new(phrases);
            pipeline = pipeline.with_pre(phrases.clone()).with_post(phrases);
        }
        pipeline
    }

    pub fn check_prompt(&self, prompt: &str) -> Option<BlockDecision> {
        Self::run("pre", &self.pre, prompt)
    }

    pub fn check_response(&self, text: &str) -> Option<BlockDecision> {
        Self::run("post", &self.post, text)
    }

    fn run(stage: &str, filters: &[Arc<dyn SecurityFilter>], text: &str) -> Option<BlockDecision> {
        filters.iter().find_map(|filter| {
            let decision = filter.inspect(text)?;
            tracing::info!(
                stage,
                filter = %filter.name(),
                classification = %decision.classification,
                "Security filter blocked text"
            );
            Some(decision)
        })
    }
}

impl std::fmt::Debug for SecurityPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |filters: &[Arc<dyn SecurityFilter>]| {
            filters.iter().map(|f| f.name().to_string()).collect::<Vec<_>>()
        };
        f.debug_struct("SecurityPipeline")
            .field("pre", &names(&self.pre))
            .field("post", &names(&self.post))
            .finish()
    }
}
