//! Low-level SQLite interactions, kept as plain functions over a `&mut SqliteConnection` so callers can run them
//! from a pooled connection or inside a transaction without any changes.

use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod ledger;
pub mod orders;

const SQLITE_DB_URL: &str = "sqlite://data/mpe_store.db";

pub fn db_url() -> String {
    let result = env::var("MPE_DATABASE_URL").unwrap_or_else(|_| {
        info!("MPE_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
