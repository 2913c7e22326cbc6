//! Turn progress reporting
//!
//! The engine reports phase changes, token usage and failures to a
//! `TurnObserver`. The observer also decides whether a failed attempt is
//! retried, which lets an interactive front end put the operator in the
//! loop without the engine knowing about terminals.

use super::compaction::CompactionStrategy;
use super::session::TokenCounters;
use crate::providers::TokenUsage;

/// Kind of model call being made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnMode {
    /// First turn of a game
    Opening,
    /// A player action
    Continuation,
    /// Summary compaction
    Summarize,
}

impl std::fmt::Display for TurnMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnMode::Opening => write!(f, "opening"),
            TurnMode::Continuation => write!(f, "continuation"),
            TurnMode::Summarize => write!(f, "summarize"),
        }
    }
}

/// Progress of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// Waiting for the model
    AwaitingModel {
        /// Call kind
        mode: TurnMode,
        /// 1-based attempt number
        attempt: u32,
    },
    /// Compaction is about to run
    Compacting(CompactionStrategy),
    /// The turn has been committed to the session
    Committed(TurnMode),
}

/// A failed attempt that may be retried
#[derive(Debug, Clone)]
pub struct TurnFailure {
    /// Call kind
    pub mode: TurnMode,
    /// 1-based attempt number that failed
    pub attempt: u32,
    /// Attempts allowed in total
    pub max_attempts: u32,
    /// Failure description
    pub message: String,
    /// Raw model text when the failure was a parse failure
    pub raw: Option<String>,
    /// Whether the model call itself failed
    pub transport: bool,
}

/// Observer verdict on a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after the backoff delay
    Retry,
    /// Give up on this turn
    Abort,
}

/// Receives turn progress from the engine
///
/// Every method has a no-op default, so implementations only override what
/// they display.
pub trait TurnObserver: Send + Sync {
    /// Called when a turn changes phase
    fn on_phase(&self, _phase: TurnPhase) {}

    /// Called after every successful model call
    fn on_usage(&self, _usage: &TokenUsage, _totals: &TokenCounters) {}

    /// Called when an attempt fails and another one is allowed
    fn on_failure(&self, _failure: &TurnFailure) -> RetryDecision {
        RetryDecision::Retry
    }

    /// Called when compaction failed and the turn continues without it
    fn on_compaction_failed(&self, _message: &str) {}
}

/// Observer that ignores everything and always retries
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl TurnObserver for SilentObserver {}
