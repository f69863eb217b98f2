//! Spyder Producer Emulator
//!
//! Streams synthetic battery readings to the relay's ingest port, the way a
//! vehicle data acquisition unit would. Useful for driving dashboards and for
//! exercising warning and invalid-data handling.
//!
//! Run with: cargo run --bin spyder-emulator -- --interval-ms 200

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "spyder-emulator")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Streams synthetic battery telemetry to a Spyder relay")]
pub struct Cli {
    /// Relay ingest address
    #[arg(long, default_value = "127.0.0.1:12000")]
    pub addr: String,

    /// Delay between readings in milliseconds
    #[arg(short, long, default_value = "500")]
    pub interval_ms: u64,

    /// Stop after this many readings (default: run until Ctrl+C)
    #[arg(short, long)]
    pub count: Option<u64>,

    /// Send a non-numeric temperature every N readings (0 disables)
    #[arg(long, default_value = "0")]
    pub invalid_every: u64,

    /// Terminate each reading with a newline (for `lines` framing)
    #[arg(long)]
    pub newline: bool,
}

/// Smooth drift through the 20–40 band with occasional excursions
fn synthetic_temperature(i: u64) -> f64 {
    let t = i as f64;
    let value = 30.0 + 15.0 * (t * 0.05).sin() + 4.0 * (t * 1.3).sin();
    (value * 100.0).round() / 100.0
}

fn synthetic_reading(i: u64, invalid_every: u64, timestamp: i64) -> Value {
    if invalid_every > 0 && (i + 1) % invalid_every == 0 {
        json!({ "battery_temperature": "sensor-fault", "timestamp": timestamp })
    } else {
        json!({ "battery_temperature": synthetic_temperature(i), "timestamp": timestamp })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "spyder_emulator=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut stream = TcpStream::connect(&cli.addr)
        .await
        .with_context(|| format!("Failed to connect to relay at {}", cli.addr))?;
    tracing::info!(addr = %cli.addr, "Connected to relay");

    let mut ticker = tokio::time::interval(Duration::from_millis(cli.interval_ms.max(1)));
    let mut sent = 0u64;

    loop {
        if cli.count.is_some_and(|count| sent >= count) {
            break;
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
            _ = ticker.tick() => {}
        }

        let reading = synthetic_reading(sent, cli.invalid_every, Utc::now().timestamp_millis());
        let mut payload = reading.to_string();
        if cli.newline {
            payload.push('\n');
        }

        stream
            .write_all(payload.as_bytes())
            .await
            .context("Relay closed the connection")?;
        tracing::debug!(reading = %reading, "Sent reading");
        sent += 1;
    }

    stream.shutdown().await.ok();
    tracing::info!(sent, "Emulator finished");
    Ok(())
}
