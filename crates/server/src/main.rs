//! Persona pipeline server entry point

use std::net::SocketAddr;
use std::sync::Arc;

use avatar_config::{load_settings, Settings};
use avatar_persistence::{
    MemorySessionRecordStore, MemoryStyleGenerationStore, MemoryTranscriptStore, ScyllaConfig,
    SessionRecordStore, StyleGenerationStore, TranscriptStore,
};
use avatar_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Priority: env vars > config/{env}.yaml > config/default.yaml > defaults.
    let env = std::env::var("AVATAR_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            // Tracing is not up yet.
            eprintln!("warning: failed to load config: {e}. Using defaults.");
            Settings::default()
        }
    };

    init_tracing(&settings);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?settings.environment,
        "starting persona pipeline server"
    );

    if settings.observability.metrics_enabled {
        init_metrics();
        tracing::info!("Prometheus metrics at /metrics");
    }

    // Persistence: ScyllaDB when enabled, in-memory otherwise.
    let (transcripts, styles, session_records): (
        Arc<dyn TranscriptStore>,
        Arc<dyn StyleGenerationStore>,
        Arc<dyn SessionRecordStore>,
    ) = if settings.persistence.enabled {
        let config = ScyllaConfig {
            hosts: settings.persistence.scylla_hosts.clone(),
            keyspace: settings.persistence.keyspace.clone(),
            replication_factor: settings.persistence.replication_factor,
        };
        match avatar_persistence::init(config).await {
            Ok(layer) => {
                tracing::info!(
                    hosts = ?settings.persistence.scylla_hosts,
                    keyspace = %settings.persistence.keyspace,
                    "ScyllaDB persistence initialized"
                );
                (
                    Arc::new(layer.transcripts),
                    Arc::new(layer.style_generations),
                    Arc::new(layer.sessions),
                )
            }
            Err(e) => {
                tracing::error!(error = %e, "ScyllaDB init failed, falling back to in-memory stores");
                memory_stores()
            }
        }
    } else {
        tracing::info!("persistence disabled, using in-memory stores");
        memory_stores()
    };

    let host = settings.server.host.clone();
    let port = settings.server.port;

    let state = AppState::build(settings, transcripts, styles, session_records)?;
    let _cleanup_shutdown = state.sessions.start_cleanup_task();

    let router = create_router(state);
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

fn memory_stores() -> (
    Arc<dyn TranscriptStore>,
    Arc<dyn StyleGenerationStore>,
    Arc<dyn SessionRecordStore>,
) {
    (
        Arc::new(MemoryTranscriptStore::new()),
        Arc::new(MemoryStyleGenerationStore::new()),
        Arc::new(MemorySessionRecordStore::new()),
    )
}

fn init_tracing(settings: &Settings) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.observability.log_level));

    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}
