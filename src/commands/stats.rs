//! Token usage report
//!
//! Shows last-call and running token counters of a session together with
//! the per-turn cost trend, either from the play loop (`/stats`) or for a
//! saved session (`storyloom stats`).

use crate::config::Config;
use crate::engine::{analyze_trend, Session, TokenStats, TrendPoint};
use crate::error::Result;
use crate::storage::SnapshotStore;
use colored::Colorize;
use prettytable::{format, Table};

/// Builds the trend table, one row per analysed prefix
pub fn trend_table(points: &[TrendPoint]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "Turns".bold(),
        "Average".bold(),
        "Slope".bold(),
        "Intercept".bold(),
        "Next (predicted)".bold()
    ]);
    for point in points {
        table.add_row(prettytable::row![
            point.turns,
            format!("{:.1}", point.average),
            format!("{:+.2}", point.slope),
            format!("{:.1}", point.intercept),
            format!("{:.0}", point.predicted_next())
        ]);
    }
    table
}

/// Prints token counters and the cost trend of a session
pub fn print_token_report(session: &Session) {
    let stats = TokenStats::from(&session.tokens);
    println!("\nToken usage:");
    println!(
        "  Last call:  {} ({} prompt + {} completion)",
        stats.last_total, stats.last_prompt, stats.last_completion
    );
    println!(
        "  Session:    {} ({} prompt + {} completion)",
        stats.total, stats.total_prompt, stats.total_completion
    );
    println!("  Turns:      {}", session.tokens.consumes.len());

    let trend = analyze_trend(&session.tokens.consumes);
    if trend.is_empty() {
        println!("{}", "\nNo turns played yet.".yellow());
    } else {
        println!("\nCost per turn:");
        trend_table(&trend).printstd();
    }
    println!();
}

/// Prints the token report of a saved session
///
/// # Arguments
///
/// * `config` - Global configuration
/// * `session_id` - Session to inspect, or `None` for the latest autosave
/// * `force` - Accept saves from other versions
pub fn run_stats(config: &Config, session_id: Option<&str>, force: bool) -> Result<()> {
    let store = SnapshotStore::from_config(&config.storage)?;
    let snapshot = match session_id {
        Some(id) => store.load_session(id, None, force)?,
        None => store.load_latest(force)?,
    };
    println!(
        "Session {} - {} ({} turns)",
        snapshot.header.session_id.cyan(),
        snapshot.header.player_name,
        snapshot.header.total_turns
    );
    print_token_report(&snapshot.session);
    Ok(())
}
