use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use followscout::{Command, FollowScout, TracingDisplay};
use followscout_common::{load_file_config, Config};
use graph_client::{GraphClient, QueryHashes, Session};

#[derive(Parser)]
#[command(
    name = "followscout",
    about = "Throttled follow runs over a profile's followers or a post's likers"
)]
struct Cli {
    /// Handle, profile URL, or post/reel/tv URL to scan
    reference: String,

    /// Begin following as soon as the scan is ready
    #[arg(long)]
    start: bool,

    /// Path to config TOML file (overrides FOLLOWSCOUT_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("followscout=info".parse()?))
        .init();

    let cli = Cli::parse();

    // Load config
    let config = Config::from_env()?;
    config.log_redacted();
    let config_path = cli.config.unwrap_or_else(|| config.config_path.clone());
    let file_config = load_file_config(&config_path)?;

    let client = GraphClient::new(
        &config.base_url,
        Session {
            session_id: config.session_id.clone(),
            csrf_token: config.csrf_token.clone(),
        },
        QueryHashes {
            followers: config.followers_query_hash.clone(),
            likers: config.likers_query_hash.clone(),
        },
    )
    .context("Failed to build HTTP client")?;

    let mut scout = FollowScout::new(Arc::new(client), file_config, Arc::new(TracingDisplay));
    let (commands, rx) = scout.command_channel();

    commands.send(Command::Scan(cli.reference))?;
    if cli.start {
        commands.send(Command::Start)?;
    } else {
        info!("Type `start` when the scan is ready (also: pause, stop, scan <target>, quit)");
    }

    // Stdin is the only command source; the session ends once it closes and
    // queued commands are done.
    let stdin_task = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let trimmed = line.trim();
            if trimmed.eq_ignore_ascii_case("quit") {
                let _ = commands.send(Command::Stop);
                break;
            }
            match Command::parse(trimmed) {
                Some(command) => {
                    if let Err(e) = commands.send(command) {
                        warn!(error = %e, "Command not delivered");
                        break;
                    }
                }
                None if trimmed.is_empty() => {}
                None => warn!(line = trimmed, "Unknown command"),
            }
        }
    });

    // Ctrl-C stops the active scan or run; its summary is still logged.
    scout
        .run_until(rx, async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Interrupted"),
                Err(e) => {
                    warn!(error = %e, "Ctrl-C handler unavailable");
                    std::future::pending::<()>().await
                }
            }
        })
        .await;
    stdin_task.abort();

    info!(counters = ?scout.counters(), "followscout exiting");
    Ok(())
}
