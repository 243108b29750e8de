//! Orbital Arena - headless multi-client runner
//!
//! Starts a configurable number of autopiloted clients that replicate through
//! either an in-process store or a shared REST store, plus a small HTTP
//! server exposing their status.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use orbital_arena::app::AppState;
use orbital_arena::config::Config;
use orbital_arena::game::autopilot::Autopilot;
use orbital_arena::game::{Session, SessionRegistry, SpawnPoint};
use orbital_arena::http::build_router;
use orbital_arena::store::{MemoryStore, RestStore, SharedStore};
use orbital_arena::util::time::{init_process_time, unix_millis};

/// Time given to in-flight store deletes after the sessions stop
const SHUTDOWN_FLUSH: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize uptime tracking
    init_process_time();

    info!("Starting Orbital Arena");
    info!("Server address: {}", config.server_addr);

    let state = AppState::new(config.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start the clients
    let sessions = match &config.store_url {
        Some(url) => {
            info!(store_url = %url, "Replicating through REST store");
            let store = RestStore::connect(url.clone(), Duration::from_millis(config.store_poll_ms));
            spawn_sessions(store, &config, state.sessions.clone(), shutdown_rx)?
        }
        None => {
            info!("Replicating through in-process store");
            spawn_sessions(Arc::new(MemoryStore::new()), &config, state.sessions.clone(), shutdown_rx)?
        }
    };

    // Build router
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    for result in join_all(sessions).await {
        if let Err(e) = result {
            warn!(error = %e, "Session task failed");
        }
    }
    tokio::time::sleep(SHUTDOWN_FLUSH).await;

    info!("Shutdown complete");
    Ok(())
}

/// Create `client_count` sessions at seeded spawn points and start their loops
fn spawn_sessions<S: SharedStore>(
    store: Arc<S>,
    config: &Config,
    registry: Arc<SessionRegistry>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<Vec<JoinHandle<()>>> {
    let sim = Arc::new(config.sim.clone());
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut handles = Vec::with_capacity(config.client_count);

    for i in 0..config.client_count {
        let spawn = SpawnPoint::random(&mut rng);
        let session = Session::new(Uuid::new_v4(), Arc::clone(&store), Arc::clone(&sim), spawn, unix_millis())?;
        let pilot = Autopilot::new(config.seed.wrapping_add(i as u64 + 1));

        info!(player_id = %session.id(), "Client spawned");
        handles.push(tokio::spawn(session.run(
            pilot,
            config.frame_rate,
            Arc::clone(&registry),
            shutdown.clone(),
        )));
    }

    Ok(handles)
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
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
            info!("Received Ctrl+C, stopping clients");
        }
        _ = terminate => {
            info!("Received terminate signal, stopping clients");
        }
    }
}
