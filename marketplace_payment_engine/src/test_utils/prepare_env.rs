use log::*;
use sqlx::{migrate, migrate::MigrateDatabase, Sqlite};

use crate::SqliteDatabase;

/// A unique SQLite URL in the system temp directory, so parallel test binaries never share a store.
pub fn random_db_url() -> String {
    let path = std::env::temp_dir().join(format!("mpe_test_{}.db", rand::random::<u64>()));
    format!("sqlite://{}", path.display())
}

/// Drops any leftover database at `url`, creates a fresh one, runs the migrations and hands back a connected
/// [`SqliteDatabase`]. Also initialises logging for the test binary.
pub async fn prepare_test_db(url: &str) -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    if let Err(e) = Sqlite::drop_database(url).await {
        warn!("🚀️ Could not drop test database {url}: {e:?}");
    }
    Sqlite::create_database(url).await.expect("Error creating the test database");
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error connecting to the test database");
    migrate!("./src/sqlite/migrations").run(db.pool()).await.expect("Error running migrations");
    info!("🚀️ Test database ready at {url}");
    db
}
