use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use archibus_events::{
    AuditEmitter, AuditSink, BroadcastChannel, DeliveryDispatcher, DispatcherConfig,
    EventBusService, HttpWebhookSender, LogAuditSink, PgAuditSink, Stores,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use archibus_api::auth::verifier_from_config;
use archibus_api::config::ServerConfig;
use archibus_api::router::build_app_router;
use archibus_api::state::AppState;

const DEFAULT_LOG_FILTER: &str =
    "archibus_api=debug,archibus_events=debug,tower_http=debug,audit=info";

#[tokio::main]
async fn main() {
    // Load .env file (ignore if missing).
    dotenvy::dotenv().ok();

    init_tracing();

    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        identity_mode = ?config.identity_mode,
        "Loaded server configuration"
    );

    // -- Storage --
    let (stores, audit_sink, pool) = match &config.database_url {
        Some(url) => {
            let pool = archibus_db::create_pool(url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            archibus_db::health_check(&pool)
                .await
                .expect("Database health check failed");

            archibus_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            (
                Stores::postgres(pool.clone()),
                Arc::new(PgAuditSink::new(pool.clone())) as Arc<dyn AuditSink>,
                Some(pool),
            )
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage; nothing survives a restart");
            (
                Stores::in_memory(),
                Arc::new(LogAuditSink) as Arc<dyn AuditSink>,
                None,
            )
        }
    };
    let audit = AuditEmitter::new(audit_sink);

    // -- Delivery --
    let dispatch_config = DispatcherConfig::from_env();
    let sender = Arc::new(
        HttpWebhookSender::new(dispatch_config.attempt_timeout)
            .expect("Failed to build webhook HTTP client"),
    );
    let dispatcher = DeliveryDispatcher::start(
        dispatch_config,
        sender,
        stores.deliveries.clone(),
        audit.clone(),
    );

    let broadcast = Arc::new(BroadcastChannel::new(config.broadcast_capacity));
    let bus = Arc::new(EventBusService::new(
        stores,
        broadcast,
        audit,
        Arc::clone(&dispatcher),
    ));
    tracing::info!("Event bus created");

    let state = AppState {
        config: Arc::new(config.clone()),
        bus,
        identity: verifier_from_config(&config),
        pool,
    };
    let app = build_app_router(state, &config);

    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Server stopped accepting connections, draining deliveries");

    dispatcher
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;

    tracing::info!("Graceful shutdown complete");
}

/// Plain or JSON (`LOG_FORMAT=json`) output, filtered by `RUST_LOG`.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
