//! Narrative turn engine
//!
//! Owns the session state, the call/parse/retry protocol for turns, and the
//! summary compaction policy that keeps prompts bounded.

pub mod compaction;
pub mod observer;
pub mod parser;
pub mod repair;
pub mod session;
pub mod turn;
pub mod usage;

pub use compaction::{CompactionPlan, CompactionStrategy};
pub use observer::{RetryDecision, SilentObserver, TurnFailure, TurnMode, TurnObserver, TurnPhase};
pub use parser::{parse_story, parse_summary, StoryRecord};
pub use session::{
    ContentRatings, ConversationEntry, CustomPrompts, Player, Session, SessionSettings,
    TokenCounters,
};
pub use turn::{CompactionOutcome, TurnEngine, TurnOutcome};
pub use usage::{analyze_trend, TokenStats, TrendPoint};
