//! Storyloom - interactive fiction driven by a language model
//!
#![doc = "Storyloom - interactive fiction driven by a language model"]
#![doc = "Main entry point for the Storyloom application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use storyloom::cli::{Cli, Commands};
use storyloom::commands;
use storyloom::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    match cli.command {
        Commands::Play {
            resume,
            session,
            file,
            premise,
            name,
            provider,
            force,
        } => {
            tracing::info!("Starting play mode");
            if let Some(p) = &provider {
                tracing::debug!("Using provider override: {}", p);
            }
            if force {
                tracing::warn!("Saves from other versions will be loaded");
            }

            let args = commands::PlayArgs {
                resume,
                session,
                file,
                premise,
                name,
                provider,
                force,
            };
            commands::run_play(config, args).await?;
            Ok(())
        }
        Commands::Saves => {
            commands::list_saves(&config)?;
            Ok(())
        }
        Commands::Stats { session, force } => {
            commands::run_stats(&config, session.as_deref(), force)?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// `RUST_LOG` wins; otherwise `--verbose` selects debug level.
fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        "storyloom=debug"
    } else {
        "storyloom=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
