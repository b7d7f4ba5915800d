use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;

use visitors_server::config::{generate_config_template, Config, StorageBackend};
use visitors_server::presence::{
    sweeper, MemoryStore, PresenceTracker, SqliteStore, SystemClock, TrackerSettings,
    VisitorStore,
};
use visitors_server::{db, routes, state};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("visitors_server=info"));
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }

    tracing::info!("Visitor presence server v{} starting", env!("CARGO_PKG_VERSION"));

    let store: Arc<dyn VisitorStore> = match config.storage {
        StorageBackend::Sqlite => Arc::new(SqliteStore::new(db::init_db(&config.data_dir)?)),
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage: counts reset on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let settings = TrackerSettings::from(&config.tracker);
    tracing::info!(
        "Staleness timeout {:?}, inline reap interval {:?}",
        settings.staleness_timeout,
        settings.reap_interval
    );
    let tracker = Arc::new(PresenceTracker::new(store, Arc::new(SystemClock), settings));

    sweeper::spawn_sweeper(tracker.clone(), config.tracker.sweep_interval());

    let cron_secret = config.cron_secret.clone().filter(|s| !s.is_empty());
    if cron_secret.is_none() {
        tracing::info!("No cron secret configured, /api/cleanup is disabled");
    }

    let app_state = state::AppState {
        tracker,
        cron_secret,
    };

    let app = routes::build_router(app_state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                tracing::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
