//! Runs one MQTT light against a broker.
//!
//! Usage:
//!   mqtt-light --config light.json
//!   mqtt-light --config light.json --set '{"brightness": 128}'
//!
//! Broker settings come from `MQTT_*` environment variables (or `.env`).

use clap::Parser;
use log::{error, info, warn};
use mqtt_light_sync::config::{self, Config};
use mqtt_light_sync::input::LightBridge;
use mqtt_light_sync::light::{LightRequest, LightSynchronizer};
use std::path::PathBuf;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "mqtt-light")]
#[command(about = "Keep an MQTT light's state in sync with its topics")]
struct Cli {
    /// JSON light definition
    #[arg(long, env = "LIGHT_CONFIG", default_value = "light.json")]
    config: PathBuf,

    /// Request to send once connected, as JSON
    #[arg(long, value_parser = parse_request)]
    set: Option<LightRequest>,

    /// Where to keep the last state across restarts
    #[arg(long, env = "LIGHT_STATE_FILE")]
    state_file: Option<PathBuf>,
}

fn parse_request(raw: &str) -> Result<LightRequest, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid light request: {e}"))
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

#[tokio::main]
async fn main() {
    // Load .env file before anything else
    config::load_dotenv();
    init_logger();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> mqtt_light_sync::error::Result<()> {
    let config = Config::load(&cli.config)?;
    info!("Configuration loaded:");
    info!("  Light: {}", config.light.name);
    info!(
        "  Broker: {}:{}",
        config.mqtt.broker_host, config.mqtt.broker_port
    );

    let restored = match &cli.state_file {
        Some(path) => config::load_state(path).unwrap_or_else(|e| {
            warn!("Ignoring unreadable state file {}: {}", path.display(), e);
            None
        }),
        None => None,
    };

    let (state_tx, mut state_rx) = mpsc::unbounded_channel();
    let synchronizer = LightSynchronizer::new(&config.light)?
        .with_restored_state(restored)
        .with_state_channel(state_tx);

    let bridge = LightBridge::new(config.mqtt, synchronizer);
    let handle = bridge.handle();
    let mut bridge_task = bridge.start();

    let state_logger = tokio::spawn(async move {
        while let Some(state) = state_rx.recv().await {
            info!(
                "State: {} brightness={:?} color={:?} color_temp={:?} white={:?} effect={:?}{}",
                state.power(),
                state.brightness,
                state.color,
                state.color_temp,
                state.white_value,
                state.effect,
                if state.assumed { " (assumed)" } else { "" }
            );
        }
    });

    if let Some(request) = cli.set {
        handle.send(request).await?;
    }

    info!("Press Ctrl+C to exit");

    let result = tokio::select! {
        joined = &mut bridge_task => match joined {
            Ok(result) => result,
            Err(e) => {
                error!("Bridge task failed: {}", e);
                Ok(())
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            bridge_task.abort();
            Ok(())
        }
    };

    if let Some(path) = &cli.state_file {
        match config::save_state(path, &handle.state()) {
            Ok(()) => info!("Saved state to {}", path.display()),
            Err(e) => warn!("Failed to save state to {}: {}", path.display(), e),
        }
    }

    state_logger.abort();
    result
}
