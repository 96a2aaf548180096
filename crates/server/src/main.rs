use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use clap::Parser;
use netwatch_bus::EventBus;
use netwatch_engine::Engine;
use netwatch_ingest::{webhook_router, PollIngestor, TrapIngestor, WebhookState};
use netwatch_registry::Registry;
use netwatch_server::api::{router, AppState};
use netwatch_server::auth::AuthProvider;
use netwatch_server::config::Config;
use tracing::info;

/// `netwatchd`: the network alerting core's HTTP/trap/webhook server.
#[derive(Parser, Debug)]
#[command(name = "netwatchd", about = "netwatch alerting server")]
struct Cli {
    /// Override the HTTP bind port (defaults to `HTTP_PORT`, §6.5).
    #[arg(long)]
    http_port: Option<u16>,

    /// Override the SNMP trap listener port (defaults to `TRAP_PORT`, §6.5).
    #[arg(long)]
    trap_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(port) = cli.http_port {
        config.http_port = port;
    }
    if let Some(port) = cli.trap_port {
        config.trap_port = port;
    }

    #[cfg(feature = "postgres")]
    let store = {
        let pg_config = netwatch_store_postgres::PostgresConfig {
            url: config.postgres_url(),
            pool_size: config.db_pool_size,
            ..Default::default()
        };
        Arc::new(netwatch_store_postgres::PostgresStore::new(pg_config).await?)
    };
    #[cfg(not(feature = "postgres"))]
    let store = Arc::new(netwatch_store_memory::MemoryStore::new());

    #[cfg(feature = "postgres")]
    let audit: Arc<dyn netwatch_audit::AuditStore> = {
        let audit_config =
            netwatch_audit_postgres::PostgresAuditConfig { url: config.postgres_url(), ..Default::default() };
        Arc::new(netwatch_audit_postgres::PostgresAuditStore::new(audit_config).await?)
    };
    #[cfg(not(feature = "postgres"))]
    let audit: Arc<dyn netwatch_audit::AuditStore> =
        Arc::new(netwatch_audit_memory::MemoryAuditStore::new());

    let registry = Arc::new(Registry::new(store.clone()).await?);
    let bus = Arc::new(EventBus::new());
    let engine = Arc::new(Engine::new(store.clone(), bus.clone()));
    let auth = Arc::new(AuthProvider::new(store.clone(), &config.jwt_secret));

    let trap_ingestor = Arc::new(TrapIngestor::new(registry.clone(), engine.clone()));
    let poll_ingestor = Arc::new(PollIngestor::new(store.clone(), registry.clone(), engine.clone()));

    {
        let trap_ingestor = trap_ingestor.clone();
        let trap_port = config.trap_port;
        tokio::spawn(async move {
            if let Err(e) = trap_ingestor.run(trap_port).await {
                tracing::error!(error = %e, "trap ingestor stopped");
            }
        });
    }
    {
        let poll_ingestor = poll_ingestor.clone();
        tokio::spawn(async move { poll_ingestor.run().await });
    }

    let state = AppState {
        store: store.clone(),
        registry: registry.clone(),
        engine,
        bus,
        auth,
        audit,
        trap_ingestor,
        poll_ingestor,
        started_at: chrono::Utc::now(),
    };

    let webhook_state = Arc::new(WebhookState { registry, engine: state.engine.clone() });
    let app = Router::new().merge(router(state)).nest("/webhooks", webhook_router(webhook_state));

    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "netwatchd listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(config.shutdown_timeout_secs))
        .await?;

    info!("netwatchd shut down");
    Ok(())
}

/// Waits for SIGINT/SIGTERM, then arms a watchdog that force-exits the
/// process if in-flight connections haven't drained within
/// `shutdown_timeout_secs` (§5, §6.5) — `axum::serve`'s own graceful
/// shutdown has no such deadline on its own.
async fn shutdown_signal(shutdown_timeout_secs: u64) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }

    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(shutdown_timeout_secs)).await;
        tracing::warn!(timeout_secs = shutdown_timeout_secs, "shutdown drain deadline exceeded, forcing exit");
        std::process::exit(1);
    });
}
