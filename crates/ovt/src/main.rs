use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ovt::models::config::TraderConfig;
use ovt::store::RunStore;
use ovt::{api, CollaboratorFactory, TradingService};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ovt", about = "OV Trader agent pipeline")]
struct Cli {
    /// Path to a TOML configuration file. Built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one trading cycle and print its record
    Run {
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        pretty: bool,
    },
    /// Replay the alpha over the configured backtest window
    Backtest {
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        pretty: bool,
    },
    /// Run the synthetic demo into a virtual wallet
    Demo {
        #[arg(long, default_value_t = 100.0)]
        initial_balance: f64,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        pretty: bool,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long, default_value = "127.0.0.1:8000")]
        addr: SocketAddr,
    },
}

fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&str>) -> Result<TraderConfig> {
    let Some(path) = path else {
        return Ok(TraderConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {path}"))?;
    let config: TraderConfig =
        toml::from_str(&raw).with_context(|| format!("Failed to parse config: {path}"))?;
    config.validate().context("Invalid config")?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{output}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = load_config(cli.config.as_deref())?;
    let store = Arc::new(RunStore::new(config));
    let service = Arc::new(TradingService::new(store, CollaboratorFactory::detect().await));

    match cli.command {
        Command::Run { notes, pretty } => {
            let record = service.run_cycle(notes, None).await?;
            print_json(&record, pretty)?;
        }
        Command::Backtest { notes, pretty } => {
            let record = service.run_backtest(notes, None).await?;
            print_json(&record, pretty)?;
        }
        Command::Demo {
            initial_balance,
            notes,
            pretty,
        } => {
            let record = service.run_demo(Some(initial_balance), notes)?;
            print_json(&record, pretty)?;
        }
        Command::Serve { addr } => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind {addr}"))?;
            info!(%addr, "Serving API");
            axum::serve(listener, api::router(service))
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await
                .context("API server failed")?;
        }
    }

    Ok(())
}
