//! Items service.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ request id ─▶ request span ─▶ API handler ─▶ ItemService ─▶ ItemStore
//!                                 (SERVER, api)    (api)          (service)      (db)
//!
//!     Telemetry handle (cloned into every layer)
//!         spans   ─▶ batch span processor ─┐
//!         metrics ─▶ periodic reader      ─┼─▶ OTLP/gRPC collector
//!         logs    ─▶ batch log processor  ─┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use items_service::config::load_config;
use items_service::lifecycle;

#[derive(Parser)]
#[command(name = "items-service")]
#[command(about = "Items CRUD service with OpenTelemetry instrumentation", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    lifecycle::run(config).await?;
    Ok(())
}
