use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yatube::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    models::ROLE_ADMIN,
    repository::{PostgresRepository, Repository, RepositoryState},
    storage::{S3StorageClient, StorageService, StorageState},
};

/// main
///
/// Entry point: configuration, logging, database (with migrations), storage and the
/// HTTP server. `yatube promote <username>` grants the admin role and exits instead
/// of serving.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Configuration (fail-fast on missing production secrets)
    dotenv::dotenv().ok();
    let config = AppConfig::load().context("invalid configuration")?;

    // 2. Logging: RUST_LOG wins, otherwise debug for the crate.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "yatube=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for the log aggregator.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Database
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .context("failed to connect to Postgres, check DATABASE_URL")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to apply migrations")?;

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    let mut args = std::env::args().skip(1);
    if let Some(command) = args.next() {
        return match (command.as_str(), args.next()) {
            ("promote", Some(username)) => promote(&repo, &username).await,
            _ => anyhow::bail!("usage: yatube [promote <username>]"),
        };
    }

    // 4. Storage (S3 / MinIO)
    let s3_client = S3StorageClient::from_config(&config);

    if config.env == Env::Local {
        s3_client.ensure_bucket_exists().await;
    }

    let storage = Arc::new(s3_client) as StorageState;

    // 5. Router and server
    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState::new(repo, storage, config));

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

/// Grants the admin role to an existing account.
async fn promote(repo: &RepositoryState, username: &str) -> anyhow::Result<()> {
    let user = repo
        .get_user_by_username(username)
        .await?
        .with_context(|| format!("no user named {username}"))?;

    if user.is_admin() {
        tracing::info!("{} is already an admin", user.username);
        return Ok(());
    }

    repo.set_role(user.id, ROLE_ADMIN).await?;
    tracing::info!("{} is now an admin", user.username);
    Ok(())
}
