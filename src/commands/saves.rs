use crate::config::Config;
use crate::error::Result;
use crate::storage::{SaveSummary, SnapshotStore};
use colored::Colorize;
use prettytable::{format, Table};

/// Builds the saves table, newest first
pub fn saves_table(saves: &[SaveSummary]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row![
        "Session".bold(),
        "File".bold(),
        "Player".bold(),
        "Turns".bold(),
        "Kind".bold(),
        "Saved".bold()
    ]);

    for save in saves {
        let player = if save.player_name.chars().count() > 24 {
            format!("{}...", save.player_name.chars().take(21).collect::<String>())
        } else {
            save.player_name.clone()
        };
        let kind = if save.manual { "manual" } else { "auto" };
        let saved = save.timestamp.format("%Y-%m-%d %H:%M:%S").to_string();

        table.add_row(prettytable::row![
            save.session_id.cyan(),
            save.file_name,
            player,
            save.total_turns,
            kind,
            saved
        ]);
    }
    table
}

/// List saved games
pub fn list_saves(config: &Config) -> Result<()> {
    let store = SnapshotStore::from_config(&config.storage)?;
    let saves = store.list_saves()?;

    if saves.is_empty() {
        println!("{}", "No saved games found.".yellow());
        return Ok(());
    }

    println!("\nSaved games in {}:", store.root().display());
    saves_table(&saves).printstd();
    println!();
    println!(
        "Use {} to resume a session.",
        "storyloom play --session <ID>".cyan()
    );
    println!();
    Ok(())
}
