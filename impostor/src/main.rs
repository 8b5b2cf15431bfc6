//! Impostor game console.
//!
//! Runs the session engine behind a line protocol on stdin/stdout. Logs go
//! to stderr.
//!
//! ```bash
//! cargo run -p impostor -- --catalog tasks.json --admin 1 --vote-timeout-secs 60
//! ```

mod console;

use clap::Parser;
use impostor_core::{Engine, EngineConfig, PlayerId, ScalingPolicy};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command-line flags. Each one overrides its `IMPOSTOR_*` variable.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON task catalog (overrides IMPOSTOR_CATALOG)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Minimum players to start a game (overrides IMPOSTOR_MIN_PLAYERS)
    #[arg(long)]
    min_players: Option<usize>,

    /// Headcount at which a second impostor is added (overrides IMPOSTOR_PAIR_THRESHOLD)
    #[arg(long, conflicts_with = "fixed_impostors")]
    pair_threshold: Option<usize>,

    /// Always use this many impostors (overrides IMPOSTOR_FIXED_IMPOSTORS)
    #[arg(long)]
    fixed_impostors: Option<usize>,

    /// Objective skips per game (overrides IMPOSTOR_SKIP_ALLOWANCE)
    #[arg(long)]
    skip_allowance: Option<u32>,

    /// Seconds a vote stays open without quorum (overrides IMPOSTOR_VOTE_TIMEOUT_SECS)
    #[arg(long)]
    vote_timeout_secs: Option<u64>,

    /// Player allowed to run admin commands; repeatable (adds to IMPOSTOR_ADMINS)
    #[arg(long = "admin")]
    admins: Vec<i64>,

    /// Random seed for reproducible games (overrides IMPOSTOR_SEED)
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn apply(self, mut config: EngineConfig) -> EngineConfig {
        if let Some(path) = self.catalog {
            config = config.with_catalog_path(path);
        }
        if let Some(n) = self.min_players {
            config = config.with_min_players(n);
        }
        if let Some(pair_threshold) = self.pair_threshold {
            config = config.with_scaling(ScalingPolicy::Headcount { pair_threshold });
        }
        if let Some(impostors) = self.fixed_impostors {
            config = config.with_scaling(ScalingPolicy::Fixed { impostors });
        }
        if let Some(skips) = self.skip_allowance {
            config = config.with_skip_allowance(skips);
        }
        if let Some(secs) = self.vote_timeout_secs {
            config = config.with_vote_timeout(Duration::from_secs(secs));
        }
        for admin in self.admins {
            config = config.with_admin(PlayerId(admin));
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("impostor=info,impostor_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.apply(EngineConfig::from_env()?);
    info!(
        catalog = ?config.catalog_path,
        min_players = config.min_players,
        scaling = ?config.scaling,
        vote_timeout_secs = config.vote_timeout.as_secs(),
        admins = config.admins.len(),
        "Starting impostor console"
    );

    // A catalog that cannot be read is fatal.
    let engine = Engine::load(config).await?;
    console::run(engine).await?;
    Ok(())
}
