//! drawbridge-server binary
//!
//! Hosts an in-memory voxel world, loads persisted gates into the engine and
//! serves JSON-lines gate requests on stdin/stdout.
//!
//! ## Configuration (TOML / env via `config` crate, flags override)
//!
//! | Key                            | Default    | Description                      |
//! |--------------------------------|------------|----------------------------------|
//! | `DRAWBRIDGE_ANIMATION_TICKS`   | `40`       | Ticks per open/close swing       |
//! | `DRAWBRIDGE_SAVE_DELAY_TICKS`  | `20`       | Deferred save coalescing window  |
//! | `DRAWBRIDGE_LINK_RADIUS`       | `15.0`     | Max mechanism distance           |
//! | `DRAWBRIDGE_MAX_GATE_VOLUME`   | `16384`    | Largest gate box, in cells       |
//! | `DRAWBRIDGE_TICK_RATE_HZ`      | `20`       | Simulation tick rate             |
//! | `DRAWBRIDGE_DATABASE_PATH`     | `gates.db` | SQLite database file             |

use anyhow::{Context, Result};
use clap::Parser;
use drawbridge::{
    driver::GateDriver, engine::GateEngine, store::SqliteGateStore, types::EngineConfig,
    world::MemoryWorld,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::BufReader;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "drawbridge-server", about = "Drawbridge gate engine", version)]
struct Args {
    /// Optional TOML configuration file
    #[arg(long, default_value = "drawbridge.toml")]
    config: String,

    /// SQLite database file
    #[arg(long)]
    database: Option<String>,

    /// Tick rate (Hz)
    #[arg(long)]
    tick_rate_hz: Option<f32>,

    /// Ticks per open/close swing
    #[arg(long)]
    animation_ticks: Option<u32>,

    /// Deferred save window in ticks
    #[arg(long)]
    save_delay_ticks: Option<u64>,

    /// Log filter directive
    #[arg(long, env = "DRAWBRIDGE_LOG", default_value = "drawbridge=info")]
    log: String,
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(&args.config).required(false))
        .add_source(config::Environment::with_prefix("DRAWBRIDGE").try_parsing(true))
        .build()
        .with_context(|| format!("Failed to read configuration from '{}'", args.config))?;
    let mut engine_config: EngineConfig = settings
        .try_deserialize()
        .context("Invalid engine configuration")?;

    if let Some(path) = &args.database {
        engine_config.database_path = path.clone();
    }
    if let Some(hz) = args.tick_rate_hz {
        engine_config.tick_rate_hz = hz;
    }
    if let Some(ticks) = args.animation_ticks {
        engine_config.animation_ticks = ticks;
    }
    if let Some(ticks) = args.save_delay_ticks {
        engine_config.save_delay_ticks = ticks;
    }
    Ok(engine_config)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries responses.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(args.log.parse()?),
        )
        .init();

    let config = load_config(&args)?;
    tracing::info!(
        "Starting drawbridge-server (db='{}', tick_rate={}Hz, swing={} ticks)",
        config.database_path,
        config.tick_rate_hz,
        config.animation_ticks,
    );

    let store = SqliteGateStore::open(&config.database_path)
        .with_context(|| format!("Failed to open gate database '{}'", config.database_path))?;
    let world = Arc::new(MemoryWorld::new());
    let tick_rate_hz = config.tick_rate_hz;

    let mut engine = GateEngine::new(config, world, Arc::new(store));
    engine.load_gates();
    let engine = Arc::new(Mutex::new(engine));

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    // Run until shutdown
    GateDriver::new(engine, tick_rate_hz).run(stdin, stdout).await
}
