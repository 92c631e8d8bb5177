//! services/api/src/bin/provision_users.rs
//!
//! Creates student accounts from the `USER{n}_EMAIL` / `USER{n}_PASS` pairs in
//! the environment (or `.env`). Only `DATABASE_URL` is required.

use api_lib::{
    adapters::db::DbAdapter,
    config::ConfigError,
    error::ApiError,
    provision::{accounts_from_env, provision_users},
};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Environment & Set Up Logging ---
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

    // --- 2. Connect to Database & Run Migrations ---
    let db_pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await?;
    let db_adapter = DbAdapter::new(db_pool);
    db_adapter.run_migrations().await?;

    // --- 3. Provision ---
    let accounts = accounts_from_env();
    info!("Found {} account(s) to provision", accounts.len());
    let report = provision_users(&db_adapter, &accounts).await?;

    for email in &report.created {
        println!("Created: {}", email);
    }
    for email in &report.already_existing {
        println!("User already exists: {}", email);
    }
    Ok(())
}
