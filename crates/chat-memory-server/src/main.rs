use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use chat_memory_server::config::Settings;
use chat_memory_server::services::generator::GeminiGenerator;
use chat_memory_server::services::memory::SessionStore;
use chat_memory_server::services::orchestrator::ChatOrchestrator;
use chat_memory_server::state::AppState;
use chat_memory_server::{build_router, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;
    let _log_guard = logging::init(&settings.logging)?;

    info!("Starting chat memory server...");
    info!(
        max_sessions = settings.memory.max_sessions,
        max_turns_per_session = settings.memory.max_turns_per_session,
        session_ttl_seconds = settings.memory.session_ttl_seconds,
        model = %settings.generator.model,
        "Configuration loaded"
    );

    let store = Arc::new(SessionStore::new(&settings.memory));
    let generator = GeminiGenerator::new(settings.generator.clone())
        .map_err(|e| anyhow::anyhow!("failed to build generator client: {}", e))?;

    let orchestrator = Arc::new(ChatOrchestrator::new(
        store.clone(),
        Arc::new(generator),
        settings.generator.timeout(),
        settings.chat.stream_buffer,
    ));

    if settings.memory.sweep_interval_seconds > 0 {
        spawn_sweeper(store.clone(), Duration::from_secs(settings.memory.sweep_interval_seconds));
    }

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));
    let app = build_router(AppState::new(orchestrator, settings.clone()), &settings.server);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Periodically drop expired sessions so idle memory is reclaimed.
fn spawn_sweeper(store: Arc<SessionStore>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                info!(purged, remaining = store.session_count(), "Expired sessions purged");
            } else {
                debug!("Sweep found no expired sessions");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
