//! Xorion explorer CLI - network status, recent activity and transaction lookup.

mod render;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use xorion_chain::Explorer;
use xorion_core::ExplorerConfig;

/// Xorion explorer - inspect a Xorion network from the terminal.
#[derive(Parser, Debug)]
#[command(name = "xorion")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// RPC endpoint URL; repeat to give fallbacks in preference order
    #[arg(short, long = "endpoint", global = true)]
    endpoints: Vec<String>,

    /// JSON config file (XORION_* environment variables still apply on top)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect and report connection state and chain properties
    Status,
    /// Show network metrics
    Metrics,
    /// Show recent blocks and transactions
    Activity,
    /// Look up an extrinsic by hash among recent blocks
    Find {
        /// Extrinsic hash, with or without 0x
        hash: String,
    },
    /// Keep polling and print a summary after each refresh
    Watch {
        /// Seconds between refreshes
        #[arg(short, long, default_value = "12")]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    color_eyre::install()?;
    dotenvy::dotenv().ok();

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("xorion=info".parse()?)
        .add_directive("xorion_chain=info".parse()?)
        .add_directive("xorion_core=info".parse()?);

    // Logs go to stderr so stdout stays clean for results.
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&args)?;
    tracing::info!("Using endpoints: {}", config.endpoints.join(", "));

    let explorer = Arc::new(Explorer::new(config));
    let state = explorer.connect(None).await;
    if !state.status.is_live() {
        return Err(eyre!("Could not connect: {}", render::connection(&state)));
    }

    let result = run(&args, &explorer).await;
    explorer.disconnect().await;
    result
}

fn load_config(args: &Args) -> Result<ExplorerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = ExplorerConfig::from_json_file(path)
                .wrap_err_with(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_overrides(|key| std::env::var(key).ok())?;
            config
        }
        None => ExplorerConfig::from_env()?,
    };

    if !args.endpoints.is_empty() {
        config.endpoints = args.endpoints.clone();
        config.validate()?;
    }
    Ok(config)
}

async fn run(args: &Args, explorer: &Arc<Explorer>) -> Result<()> {
    let properties = explorer.properties();

    match &args.command {
        Command::Status => {
            let snapshot = explorer.snapshot();
            if args.json {
                print_json(&snapshot)?;
            } else {
                println!("{}", render::connection(&snapshot.connection));
                println!(
                    "Token {} ({} decimals), SS58 format {}",
                    properties.token_symbol, properties.token_decimals, properties.ss58_format
                );
            }
        }
        Command::Metrics => {
            // Transaction counts come from the activity window.
            explorer.fetch_recent_transaction_activity().await;
            let metrics = explorer.fetch_metrics().await.ok_or_else(|| {
                eyre!(
                    "Metrics unavailable: {}",
                    explorer.snapshot().metrics_error.unwrap_or_default()
                )
            })?;
            if args.json {
                print_json(&metrics)?;
            } else {
                println!("{}", render::metrics(&metrics, &properties));
            }
        }
        Command::Activity => {
            let activity = explorer
                .fetch_recent_transaction_activity()
                .await
                .ok_or_else(|| {
                    eyre!(
                        "Activity unavailable: {}",
                        explorer.snapshot().activity_error.unwrap_or_default()
                    )
                })?;
            if args.json {
                print_json(&activity)?;
            } else {
                println!("{}", render::activity(&activity, &properties));
            }
        }
        Command::Find { hash } => match explorer.find_by_hash(hash).await? {
            Some(detail) if args.json => print_json(&detail)?,
            Some(detail) => println!("{}", render::detail(&detail, &properties)),
            None => {
                println!(
                    "Transaction {} not found in the last {} finalized blocks",
                    hash,
                    explorer.config().lookup.depth
                );
            }
        },
        Command::Watch { interval } => watch(explorer, Duration::from_secs(*interval)).await?,
    }

    Ok(())
}

async fn watch(explorer: &Arc<Explorer>, interval: Duration) -> Result<()> {
    let cancel = CancellationToken::new();
    let poller = {
        let explorer = Arc::clone(explorer);
        let cancel = cancel.clone();
        tokio::spawn(async move { explorer.run_polling(interval, cancel).await })
    };

    let mut connection = explorer.subscribe_connection();
    let mut ticker = tokio::time::interval(interval);
    // Give the first poll a head start before printing.
    ticker.reset_after(Duration::from_secs(2));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = explorer.snapshot();
                if let Some(metrics) = &snapshot.metrics {
                    println!("{}\n", render::metrics(metrics, &snapshot.properties));
                }
                if let Some(activity) = &snapshot.activity {
                    for tx in activity.transactions.iter().take(5) {
                        println!("{}", render::transaction(tx, &snapshot.properties));
                    }
                    println!();
                }
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = connection.borrow_and_update().clone();
                println!("Connection: {}", render::connection(&state));
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    cancel.cancel();
    poller.await.wrap_err("Polling task failed")?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
