use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::watch;

use gator::commands::{Session, DEFAULT_BROWSE_LIMIT};
use gator::config::Config;
use gator::storage::{Database, DatabaseError};

#[derive(Parser, Debug)]
#[command(name = "gator", version, about = "Command-line RSS aggregator")]
struct Args {
    /// Config file (default: ~/.config/gator/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a user and log in as them
    Register { name: String },
    /// Switch the current user
    Login { name: String },
    /// List users
    Users,
    /// Delete all users, feeds and posts
    Reset,
    /// Poll feeds forever, one every INTERVAL (e.g. 30s, 1m, 1h30m)
    Agg {
        interval: String,
        /// Skip feeds that fail to fetch instead of stopping
        #[arg(long)]
        keep_going: bool,
    },
    /// Register a feed and follow it
    #[command(name = "addfeed")]
    AddFeed { name: String, url: String },
    /// List all registered feeds
    Feeds,
    /// Follow a registered feed
    Follow { url: String },
    /// List followed feeds
    Following,
    /// Stop following a feed
    Unfollow { url: String },
    /// Show the newest posts from followed feeds
    Browse {
        #[arg(default_value_t = DEFAULT_BROWSE_LIMIT)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout carries command output
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,gator=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config_path = match args.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let db_path = config.resolve_database_path(&config_path);
    if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;

    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        // Already tells the user what to do
        Err(e @ DatabaseError::Locked) => return Err(e.into()),
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let mut session = Session::new(db, config, config_path);

    let lines = match args.command {
        Command::Register { name } => session.register(&name).await?,
        Command::Login { name } => session.login(&name).await?,
        Command::Users => session.users().await?,
        Command::Reset => session.reset().await?,
        Command::AddFeed { name, url } => session.add_feed(&name, &url).await?,
        Command::Feeds => session.feeds().await?,
        Command::Follow { url } => session.follow(&url).await?,
        Command::Following => session.following().await?,
        Command::Unfollow { url } => session.unfollow(&url).await?,
        Command::Browse { limit } => session.browse(limit).await?,
        Command::Agg {
            interval,
            keep_going,
        } => {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupt received, stopping");
                    let _ = shutdown_tx.send(true);
                }
            });

            let summary = session
                .aggregate(&interval, keep_going, shutdown_rx)
                .await?;
            vec![format!(
                "stopped after {} cycles: {} new posts, {} feeds skipped",
                summary.cycles, summary.posts_inserted, summary.feeds_skipped
            )]
        }
    };

    for line in lines {
        println!("{line}");
    }
    Ok(())
}
