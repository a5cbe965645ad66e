//! Arena Simulator - client-authoritative multiplayer arena
//!
//! One binary, two roles:
//! - `client`: runs the local simulation, mirrors peers and exchanges
//!   impulses through the relay store
//! - `relay`: serves a development relay store over REST and event streams

mod app;
mod config;
mod game;
mod http;
mod relay;
mod util;

use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::{Config, LogFormat, RelayBackend, Role};
use crate::game::input::ScriptedInput;
use crate::game::render::TracingSurface;
use crate::game::session::Cadence;
use crate::game::{ArenaSession, Tuning};
use crate::http::build_router;
use crate::relay::{BroadcastChannel, HttpRelay, MemoryRelay, RelayStore};
use crate::util::device_id::DeviceIdStore;
use crate::util::time::init_process_time;

/// Time left for queued relay writes after the session retires
const RELAY_DRAIN_GRACE: Duration = Duration::from_millis(250);

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level, config.log_format);

    // Initialize uptime tracking
    init_process_time();

    match config.role {
        Role::Client => run_client(config).await,
        Role::Relay => run_relay(config).await,
    }
}

/// Run one headless arena client until shutdown
async fn run_client(config: Config) -> anyhow::Result<()> {
    info!("Starting arena client");

    let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let device_id = DeviceIdStore::new(&config.device_id_path).load_or_create(&mut rng)?;
    info!(device_id = %device_id, seed, "Device identity loaded");

    let relay: Arc<dyn RelayStore> = match &config.relay {
        RelayBackend::Memory => {
            info!("Using in-process relay store");
            Arc::new(MemoryRelay::new())
        }
        RelayBackend::Http { base_url } => Arc::new(HttpRelay::new(
            base_url,
            config.relay_auth.clone(),
            config.relay_writes_per_sec,
        )),
    };

    let tuning = Tuning {
        mirror_timeout: config.mirror_timeout,
        ..Tuning::default()
    };
    let cadence = Cadence {
        simulation: config.simulation_interval,
        upload: config.upload_interval,
        projectile_step: tuning.blaster.step_interval,
    };

    let channel = BroadcastChannel::open(relay, device_id);
    let session = ArenaSession::new(
        tuning,
        channel,
        TracingSurface::new(config.shadows),
        ScriptedInput::new(rng.gen(), config.viewport),
        config.viewport,
        rng.gen(),
    );

    session.run(cadence, shutdown_signal()).await;

    if matches!(config.relay, RelayBackend::Http { .. }) {
        tokio::time::sleep(RELAY_DRAIN_GRACE).await;
    }
    info!("Client shutdown complete");
    Ok(())
}

/// Serve the development relay store
async fn run_relay(config: Config) -> anyhow::Result<()> {
    info!("Starting development relay");

    let addr = config.relay_bind;
    let state = AppState::new(config);
    let router = build_router(state);

    let listener = TcpListener::bind(addr).await?;

    info!("Relay listening on {}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Relay shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str, format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init(),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
