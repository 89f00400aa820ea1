use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clubjoin_api::config::ServerConfig;
use clubjoin_api::router::build_app_router;
use clubjoin_api::state::AppState;
use clubjoin_core::catalog::ProcedureCatalog;
use clubjoin_core::procedure::ProcedureInvoker;
use clubjoin_db::invoker::PgProcedureInvoker;
use clubjoin_db::pricing::PgPricingCatalog;
use clubjoin_db::TenantPools;
use clubjoin_events::{EmailConfig, EmailDelivery, EventBus, NotificationRouter};
use clubjoin_pipeline::archive::FsContractStore;
use clubjoin_pipeline::{EnrollmentConfig, EnrollmentWorkflow};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    init_tracing();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let enrollment_config = EnrollmentConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");
    tracing::info!(
        initiation_fee = %enrollment_config.initiation_fee,
        contract_dir = %enrollment_config.contract_dir.display(),
        compensate_on_abort = enrollment_config.compensate_on_abort,
        "Loaded enrollment configuration"
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let max_connections: u32 = std::env::var("DB_MAX_CONNECTIONS")
        .ok()
        .map(|v| v.parse().expect("DB_MAX_CONNECTIONS must be a valid u32"))
        .unwrap_or(clubjoin_db::DEFAULT_MAX_CONNECTIONS);

    let pool = clubjoin_db::create_pool(&database_url, max_connections)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    clubjoin_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    let tenant_urls = clubjoin_db::parse_tenant_urls(
        &std::env::var("TENANT_DATABASE_URLS").unwrap_or_default(),
    )
    .unwrap_or_else(|e| panic!("Invalid TENANT_DATABASE_URLS: {e}"));
    let pools = TenantPools::new(pool, &tenant_urls, max_connections)
        .expect("Failed to configure tenant pools");
    tracing::info!(tenants = tenant_urls.len(), "Tenant pools configured");

    // --- Procedure catalog ---
    let catalog = match std::env::var("PROCEDURE_DEFINITIONS_PATH") {
        Ok(path) => {
            let definitions = std::fs::read_to_string(&path)
                .unwrap_or_else(|e| panic!("Failed to read procedure definitions '{path}': {e}"));
            ProcedureCatalog::from_definitions(&definitions)
                .unwrap_or_else(|e| panic!("Invalid procedure definitions '{path}': {e}"))
        }
        Err(_) => ProcedureCatalog::defaults(),
    };
    tracing::info!("Procedure catalog resolved");

    let invoker: Arc<dyn ProcedureInvoker> =
        Arc::new(PgProcedureInvoker::new(pools.clone(), catalog));
    let pricing = Arc::new(PgPricingCatalog::new(pools));

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());

    let router_handle = match EmailConfig::from_env() {
        Some(email_config) => {
            let router = NotificationRouter::new(
                Arc::new(EmailDelivery::new(email_config)),
                config.alert_email.clone(),
            );
            tracing::info!("Email notifications enabled");
            Some(tokio::spawn(router.run(event_bus.subscribe())))
        }
        None => {
            tracing::info!("SMTP_HOST not set, email notifications disabled");
            None
        }
    };

    // --- Workflow ---
    let contracts = Arc::new(FsContractStore::new(enrollment_config.contract_dir.clone()));
    let workflow = EnrollmentWorkflow::new(Arc::clone(&invoker), contracts, enrollment_config)
        .with_events(Arc::clone(&event_bus));

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        workflow: Arc::new(workflow),
        pricing,
        invoker,
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
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

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Dropping the last sender closes the channel and stops the router.
    drop(event_bus);
    if let Some(handle) = router_handle {
        let timeout = Duration::from_secs(config.shutdown_timeout_secs);
        if tokio::time::timeout(timeout, handle).await.is_err() {
            tracing::warn!("Notification router did not drain before timeout");
        }
    }

    tracing::info!("Graceful shutdown complete");
}

/// Install the tracing subscriber. `LOG_FORMAT=json` selects JSON output.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "clubjoin_api=debug,clubjoin_pipeline=debug,clubjoin_events=info,tower_http=debug".into()
    });
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
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
