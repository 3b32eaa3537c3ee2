use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use guildstate::config::Config;
use guildstate::replay::replay_lines;
use guildstate::state::tracker::StateTracker;

/// Replay a recorded gateway event stream into the guild state cache and
/// print what the cache ends up holding.
#[derive(Parser)]
#[command(name = "guildstate", version)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "guildstate.toml")]
    config: String,

    /// Newline-delimited JSON events to replay.
    events: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let tracker = StateTracker::new(config.cache);

    let file = tokio::fs::File::open(&cli.events)
        .await
        .with_context(|| format!("failed to open {}", cli.events.display()))?;
    let stats = replay_lines(&tracker, tokio::io::BufReader::new(file)).await?;

    info!(
        applied = stats.applied,
        undecodable = stats.undecodable,
        unknown_guild = stats.unknown_guild,
        unknown_channel = stats.unknown_channel,
        ignored = stats.ignored,
        "replay finished"
    );

    let mut ids = tracker.guild_ids();
    ids.sort();
    for id in ids {
        if let Some(guild) = tracker.guild(&id) {
            println!("{}", serde_json::to_string(&guild.summary())?);
        }
    }

    Ok(())
}
