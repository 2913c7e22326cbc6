//! Summary compaction
//!
//! Every committed turn appends a summary, and the newest summary seeds the
//! next continuation prompt. To keep prompts bounded over an unbounded
//! game, summaries are periodically merged by the model:
//!
//! - **Dilution**: when every older summary is already large, the oldest
//!   window is folded into one new summary placed first.
//! - **Compression**: otherwise all small summaries are merged into one new
//!   summary placed last, keeping the large ones in order.

use super::observer::{TurnMode, TurnPhase};
use super::parser::parse_summary;
use super::session::Session;
use super::turn::TurnEngine;
use crate::config::CompactionConfig;
use crate::error::Result;
use crate::prompts::{Overrides, Section};

/// How summaries are merged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionStrategy {
    /// Fold the oldest window into one leading summary
    Dilution,
    /// Merge every small summary into one trailing summary
    Compression,
}

impl std::fmt::Display for CompactionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompactionStrategy::Dilution => write!(f, "dilution"),
            CompactionStrategy::Compression => write!(f, "compression"),
        }
    }
}

/// Length class of one summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryClass {
    /// At least `compact_min_length` characters
    Large,
    /// Non-blank and shorter than `compact_min_length`
    Small,
    /// Empty or whitespace
    Blank,
}

/// Classifies a summary by character count
///
/// # Examples
///
/// ```
/// use storyloom::engine::compaction::{classify, SummaryClass};
///
/// assert_eq!(classify("", 4), SummaryClass::Blank);
/// assert_eq!(classify("abc", 4), SummaryClass::Small);
/// assert_eq!(classify("开门见山", 4), SummaryClass::Large);
/// ```
pub fn classify(summary: &str, min_length: usize) -> SummaryClass {
    if summary.trim().is_empty() {
        SummaryClass::Blank
    } else if summary.chars().count() >= min_length {
        SummaryClass::Large
    } else {
        SummaryClass::Small
    }
}

/// Whether compaction is due before the next continuation prompt
pub fn should_compact(session: &Session, config: &CompactionConfig) -> bool {
    session.summaries.len() > config.summary_conclude_threshold && session.compaction_cooldown < 1
}

/// Picks the strategy by inspecting every summary except the newest
pub fn choose_strategy(summaries: &[String], config: &CompactionConfig) -> CompactionStrategy {
    let older = &summaries[..summaries.len().saturating_sub(1)];
    let any_small = older
        .iter()
        .any(|s| classify(s, config.compact_min_length) == SummaryClass::Small);
    if any_small {
        CompactionStrategy::Compression
    } else {
        CompactionStrategy::Dilution
    }
}

/// What to summarize and how to splice the result back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionPlan {
    /// Chosen strategy
    pub strategy: CompactionStrategy,
    /// Summaries sent to the model, in order, blanks removed
    pub material: Vec<String>,
    /// Number of leading summaries replaced (dilution only)
    pub window: usize,
    /// Completion budget for the summary call
    pub max_tokens: u32,
}

impl CompactionPlan {
    /// Builds the plan for a summary list
    pub fn new(summaries: &[String], config: &CompactionConfig) -> Self {
        let strategy = choose_strategy(summaries, config);
        match strategy {
            CompactionStrategy::Dilution => {
                let window = config
                    .dilution_window
                    .min(summaries.len().saturating_sub(1));
                Self {
                    strategy,
                    material: summaries[..window]
                        .iter()
                        .filter(|s| !s.trim().is_empty())
                        .cloned()
                        .collect(),
                    window,
                    max_tokens: config.dilution_max_tokens,
                }
            }
            CompactionStrategy::Compression => Self {
                strategy,
                material: summaries
                    .iter()
                    .filter(|s| classify(s, config.compact_min_length) == SummaryClass::Small)
                    .cloned()
                    .collect(),
                window: 0,
                max_tokens: config.compression_max_tokens,
            },
        }
    }

    /// Produces the new summary list
    ///
    /// Dilution yields `[merged] + summaries[window..]`. Compression yields
    /// the large summaries in their original order followed by `merged`.
    pub fn apply(
        &self,
        summaries: &[String],
        merged: Option<String>,
        config: &CompactionConfig,
    ) -> Vec<String> {
        match self.strategy {
            CompactionStrategy::Dilution => merged
                .into_iter()
                .chain(summaries[self.window..].iter().cloned())
                .collect(),
            CompactionStrategy::Compression => summaries
                .iter()
                .filter(|s| classify(s, config.compact_min_length) == SummaryClass::Large)
                .cloned()
                .chain(merged)
                .collect(),
        }
    }
}

impl TurnEngine {
    /// Runs one compaction on the session's summaries
    ///
    /// The session's summaries, cooldown and token accounting change only
    /// when the whole compaction succeeds.
    ///
    /// # Errors
    ///
    /// Returns `RetryExhausted` or `TurnAborted` if the summary call failed
    pub async fn compact(&self, session: &mut Session) -> Result<CompactionStrategy> {
        let config = self.config().compaction.clone();
        let plan = CompactionPlan::new(&session.summaries, &config);
        tracing::info!(
            "Compacting {} summaries with {} ({} selected)",
            session.summaries.len(),
            plan.strategy,
            plan.material.len()
        );
        self.observer().on_phase(TurnPhase::Compacting(plan.strategy));

        if plan.material.is_empty() {
            tracing::warn!("Nothing to merge, dropping the selected blank summaries");
            session.summaries = plan.apply(&session.summaries, None, &config);
            session.compaction_cooldown = config.cooldown_reset;
            return Ok(plan.strategy);
        }

        let identity = match plan.strategy {
            CompactionStrategy::Dilution => session.player_identity(),
            CompactionStrategy::Compression => format!("Player name: {}", session.player.name),
        };
        let mut overrides = Overrides::new();
        overrides.insert(Section::PrePrompt, identity);
        overrides.insert(
            Section::UserInput,
            format!("Story summaries:\n{}", plan.material.join("\n")),
        );
        let prompt = self.templates().summary.render(&overrides);
        let options = self.story_options(session).with_max_tokens(plan.max_tokens);

        let (merged, usage) = self
            .call_with_retry(session, TurnMode::Summarize, &prompt, &options, parse_summary)
            .await?;

        session.summaries = plan.apply(&session.summaries, Some(merged), &config);
        session.compaction_cooldown = config.cooldown_reset;
        session.tokens.add_to_last_turn(usage.total_tokens);

        tracing::info!(
            "Compaction done: {} summaries remain, cooldown reset to {}",
            session.summaries.len(),
            session.compaction_cooldown
        );
        Ok(plan.strategy)
    }
}
