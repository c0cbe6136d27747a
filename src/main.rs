use health_dashboard::{
    AppState,
    auth::{IdentityState, JwtIdentityProvider, SupabaseIdentityProvider},
    config::{AppConfig, AuthMode, Env},
    create_router,
    repository::{PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Startup order: configuration, logging, database pool, identity provider, HTTP
/// server. Any failure before the server is listening aborts the process.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast on missing production secrets)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "health_dashboard=debug,tower_http=info".into());

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

    tracing::info!(
        env = ?config.env,
        auth_mode = ?config.auth_mode,
        "application starting"
    );

    // 3. Database pool. The schema is managed by Supabase; no migrations run here.
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // 4. Session provider
    let identity: IdentityState = match config.auth_mode {
        AuthMode::Jwt => Arc::new(JwtIdentityProvider::new(&config.jwt_secret)),
        AuthMode::Remote => Arc::new(
            SupabaseIdentityProvider::new(
                &config.supabase_url,
                &config.supabase_anon_key,
                config.auth_timeout,
            )
            .expect("FATAL: Failed to build the Supabase auth client."),
        ),
    };

    if config.env == Env::Local {
        tracing::warn!("local mode: x-user-id header bypass is enabled for existing profiles");
    }

    // 5. Router and server
    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState {
        repo,
        identity,
        config,
    });

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind HTTP listener. Check BIND_ADDR.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly");
}
