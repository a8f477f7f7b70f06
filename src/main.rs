use sfru_portal::{
    AppState,
    billing::{BillingState, StripeClient},
    config::{AppConfig, Env},
    create_router,
    email::{EmailState, ResendClient},
    repository::{PostgresRepository, RepositoryState},
    roles::{ResolverState, RoleResolver},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// The asynchronous entry point, responsible for initializing all core
/// components: configuration, logging, database, billing, role resolver, and
/// the HTTP server.
#[tokio::main]
async fn main() {
    // 1. Configuration & environment loading (fail-fast).
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging filter setup. RUST_LOG wins; otherwise sensible defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sfru_portal=debug,tower_http=info,axum=trace".into());

    // 3. Log format per environment: pretty locally, JSON in production for
    // the log aggregator.
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    if config.admins.is_empty() {
        tracing::warn!("no admin allow-list configured; only persisted admin roles grant access");
    }

    // 4. Database initialization (Postgres).
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // 5. Billing collaborator (Stripe).
    let billing = Arc::new(StripeClient::new(&config.stripe_secret_key)) as BillingState;

    // 6. Email collaborator (Resend).
    let email = Arc::new(ResendClient::new(&config.resend_api_key)) as EmailState;

    // 7. Role resolver, constructed once from the configured allow-list.
    let resolver = Arc::new(RoleResolver::new(config.admins.clone())) as ResolverState;

    // 8. Unified state assembly.
    let app_state = AppState {
        repo,
        billing,
        email,
        resolver,
        config,
    };

    // 9. Router and server startup.
    let app = create_router(app_state);

    let listener = TcpListener::bind("0.0.0.0:3000")
        .await
        .expect("FATAL: Failed to bind 0.0.0.0:3000");

    tracing::info!("HTTP server bound successfully.");
    tracing::info!("Listening on 0.0.0.0:3000");
    tracing::info!("API documentation (Swagger UI) available at: http://localhost:3000/swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly");
}
