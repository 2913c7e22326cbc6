//! Token usage statistics and trend analysis

use super::session::TokenCounters;
use serde::Serialize;

/// Turns per analysis window
pub const TREND_WINDOW: usize = 10;

/// Snapshot of token counters for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenStats {
    /// Prompt tokens of the last call
    pub last_prompt: usize,
    /// Completion tokens of the last call
    pub last_completion: usize,
    /// Tokens of the last call
    pub last_total: usize,
    /// Running prompt tokens
    pub total_prompt: usize,
    /// Running completion tokens
    pub total_completion: usize,
    /// Running total tokens
    pub total: usize,
}

impl From<&TokenCounters> for TokenStats {
    fn from(tokens: &TokenCounters) -> Self {
        Self {
            last_prompt: tokens.last_prompt,
            last_completion: tokens.last_completion,
            last_total: tokens.last_call_total(),
            total_prompt: tokens.total_prompt,
            total_completion: tokens.total_completion,
            total: tokens.total,
        }
    }
}

/// Least-squares fit of turn cost over turns `1..=turns`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendPoint {
    /// Number of turns covered, starting from the first
    pub turns: usize,
    /// Mean cost per turn
    pub average: f64,
    /// Fitted cost increase per turn
    pub slope: f64,
    /// Fitted cost at turn zero
    pub intercept: f64,
}

impl TrendPoint {
    /// Predicted cost of the turn after the covered range
    pub fn predicted_next(&self) -> f64 {
        self.slope * (self.turns as f64 + 1.0) + self.intercept
    }
}

/// Fits every 10-turn prefix of the cost list, plus the full list when its
/// length is not a multiple of 10
///
/// # Examples
///
/// ```
/// use storyloom::engine::usage::analyze_trend;
///
/// let costs: Vec<usize> = (1..=12).map(|t| 100 + 10 * t).collect();
/// let trend = analyze_trend(&costs);
/// assert_eq!(trend.len(), 2);
/// assert_eq!(trend[1].turns, 12);
/// assert!((trend[1].slope - 10.0).abs() < 1e-9);
/// assert!((trend[1].predicted_next() - 230.0).abs() < 1e-9);
/// ```
pub fn analyze_trend(consumes: &[usize]) -> Vec<TrendPoint> {
    let total = consumes.len();
    let mut ends: Vec<usize> = (TREND_WINDOW..=total).step_by(TREND_WINDOW).collect();
    if total % TREND_WINDOW != 0 {
        ends.push(total);
    }
    ends.into_iter().map(|end| fit(&consumes[..end])).collect()
}

fn fit(values: &[usize]) -> TrendPoint {
    let n = values.len() as f64;
    let sum_x: f64 = (1..=values.len()).map(|x| x as f64).sum();
    let sum_y: f64 = values.iter().map(|&y| y as f64).sum();
    let sum_xy: f64 = values
        .iter()
        .enumerate()
        .map(|(i, &y)| (i + 1) as f64 * y as f64)
        .sum();
    let sum_x2: f64 = (1..=values.len()).map(|x| (x * x) as f64).sum();

    let average = sum_y / n;
    let denominator = n * sum_x2 - sum_x * sum_x;
    let (slope, intercept) = if denominator != 0.0 {
        let slope = (n * sum_xy - sum_x * sum_y) / denominator;
        (slope, (sum_y - slope * sum_x) / n)
    } else {
        (0.0, average)
    };

    TrendPoint {
        turns: values.len(),
        average,
        slope,
        intercept,
    }
}
