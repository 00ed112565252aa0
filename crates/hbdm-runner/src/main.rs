//! # hbdm-runner
//!
//! Runs the HBDM swap gateway from a JSON config file.
//!
//! # Usage
//!
//! ```bash
//! hbdm-runner config.json --log-level info
//! hbdm-runner config.json history BTC-USD --interval 1min --start 2024-03-01
//! ```
//!
//! `run` (the default) connects every channel, subscribes the configured
//! symbols and logs gateway events until Ctrl+C. `history` fetches bars once
//! and exits.

mod gateway;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use hbdm_core::event::{GatewayEvent, GatewayEventReceiver, event_channel};
use hbdm_core::{HistoryRequest, Interval};
use tracing::{debug, error, info};

use crate::gateway::HbdmGateway;

/// HBDM coin-margined swap gateway.
#[derive(Parser)]
#[command(name = "hbdm-runner", about = "HBDM coin-margined swap gateway")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log directory for file output. Overrides `gateway.log_path`.
    #[arg(long)]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Connect and stream events until Ctrl+C.
    Run,
    /// Fetch kline history once.
    History {
        symbol: String,
        /// `1min`, `60min` or `1day`.
        #[arg(short, long, default_value = "1min")]
        interval: String,
        /// `YYYY-MM-DD` or RFC 3339.
        #[arg(short, long)]
        start: String,
    },
}

fn parse_start(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("bad start time {s:?}"))?;
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| anyhow!("bad start time {s:?}"))
}

/// Log every gateway event until the sender side is dropped.
async fn log_events(mut rx: GatewayEventReceiver) {
    while let Some(event) = rx.recv().await {
        match event {
            GatewayEvent::Log(msg) => info!("[gateway] {msg}"),
            GatewayEvent::Tick(tick) => {
                debug!(
                    "[tick] {} last={} bid={} ask={}",
                    tick.symbol,
                    tick.last_price,
                    tick.bid_price_1(),
                    tick.ask_price_1()
                )
            }
            GatewayEvent::Order(order) => info!("[order] {order:?}"),
            GatewayEvent::Trade(trade) => info!("[trade] {trade:?}"),
            GatewayEvent::Account(account) => debug!("[account] {account:?}"),
            GatewayEvent::Position(position) => debug!("[position] {position:?}"),
            GatewayEvent::Contract(contract) => debug!("[contract] {}", contract.symbol),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = hbdm_core::config::load_config(&cli.config)?;
    let log_dir = cli.log_dir.clone().or_else(|| config.gateway.log_path.clone());
    let _guard =
        hbdm_core::logging::init_logging(&cli.log_level, log_dir.as_deref(), &config.gateway.name);

    info!("hbdm-runner starting, config={}, log_level={}", cli.config.display(), cli.log_level);

    let (events_tx, events_rx) = event_channel();
    let printer = tokio::spawn(log_events(events_rx));
    let mut gateway = HbdmGateway::new(config, Arc::new(events_tx))?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            gateway.connect().await?;
            info!("gateway '{}' running, press Ctrl+C to stop", gateway.name());

            tokio::signal::ctrl_c().await?;
            info!("shutdown signal received");
        }
        Command::History { symbol, interval, start } => {
            let interval = Interval::from_wire(&interval)
                .ok_or_else(|| anyhow!("unknown interval {interval:?}"))?;
            let req = HistoryRequest { symbol, interval, start: parse_start(&start)? };
            let bars = gateway.query_history(&req).await;
            match (bars.first(), bars.last()) {
                (Some(first), Some(last)) => {
                    let (n, iv) = (bars.len(), req.interval);
                    info!("{n} {iv} bars: {} - {}", first.datetime, last.datetime)
                }
                _ => info!("no bars for {} {}", req.symbol, req.interval),
            }
        }
    }

    if let Err(e) = gateway.close().await {
        error!("error closing gateway: {e}");
    }
    drop(gateway);
    let _ = tokio::time::timeout(Duration::from_secs(1), printer).await;

    info!("hbdm-runner stopped");
    Ok(())
}
