//! BrewHub API server binary.
//!
//! Connects to PostgreSQL, runs migrations, optionally provisions a first
//! ADMIN user, then serves the REST API until Ctrl-C.

use std::time::Duration;

use brewhub_api::AppState;
use brewhub_api::config::ApiConfig;
use brewhub_core::auth::password::hash_password;
use brewhub_core::auth::sessions::purge_expired;
use brewhub_core::models::auth::{Role, User};
use brewhub_core::store::postgres::PgStore;
use brewhub_core::uuid::uuidv7;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "brewhub_api_server", about = "BrewHub API server")]
struct Args {
    /// Port to listen on. Overrides the port in `BIND_ADDR`.
    #[arg(long)]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/brewhub"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Seconds between purges of expired sessions (0 disables).
    #[arg(long, env = "SESSION_PURGE_INTERVAL_SECS", default_value_t = 300)]
    purge_interval_secs: u64,

    /// Email of the ADMIN to create when no ADMIN exists yet.
    #[arg(long, env = "BOOTSTRAP_ADMIN_EMAIL")]
    bootstrap_admin_email: Option<String>,

    /// Password for the bootstrap ADMIN.
    #[arg(long, env = "BOOTSTRAP_ADMIN_PASSWORD", hide_env_values = true)]
    bootstrap_admin_password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,brewhub_api=debug,brewhub_core=debug".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env();
    config.pg_connection_url = args.database_url.clone();
    if let Some(port) = args.port {
        let host = config
            .bind_addr
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "127.0.0.1".into());
        config.bind_addr = format!("{host}:{port}");
    }

    info!(
        bind_addr = %config.bind_addr,
        max_connections = args.max_connections,
        uniqueness = ?config.session_uniqueness,
        "starting brewhub_api_server"
    );

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&args.database_url)
        .await?;

    info!("running database migrations");
    brewhub_api::migrate(&pool).await?;

    let store = PgStore::new(pool.clone());
    if let (Some(email), Some(password)) = (
        args.bootstrap_admin_email.as_deref(),
        args.bootstrap_admin_password.as_deref(),
    ) {
        bootstrap_admin(&store, email, password).await?;
    }

    if args.purge_interval_secs > 0 {
        tokio::spawn(purge_loop(
            store,
            Duration::from_secs(args.purge_interval_secs),
        ));
    }

    let app = brewhub_api::router(AppState::postgres(pool, config.clone()));
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

/// Create the first ADMIN unless one exists.
async fn bootstrap_admin(
    store: &PgStore,
    email: &str,
    password: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if store.admin_exists().await? {
        return Ok(());
    }
    let user = User {
        id: uuidv7(),
        email: email.trim().to_lowercase(),
        name: Some("Administrator".into()),
        role: Role::Admin,
        shop_id: None,
        branch_id: None,
    };
    let id = store.create_user(&user, &hash_password(password)?).await?;
    info!(user_id = %id, email = %user.email, "bootstrap ADMIN created");
    Ok(())
}

async fn purge_loop(store: PgStore, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        if let Err(e) = purge_expired(&store, chrono::Utc::now()).await {
            warn!(error = %e, "session purge failed");
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
