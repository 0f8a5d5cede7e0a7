use log::*;
use sqlx::{migrate, migrate::MigrateDatabase, Sqlite};

use crate::SqliteDatabase;

/// Creates a fresh sqlite database at `url`, runs the migrations, and initialises logging. Call this at the top of
/// every integration test, with a URL from [`random_db_path`].
pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    if let Err(e) = Sqlite::drop_database(url).await {
        debug!("🚀️ Nothing to drop at {url}: {e}");
    }
    Sqlite::create_database(url).await.expect("Error creating test database");
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error connecting to the test database");
    migrate!("./src/sqlite/migrations").run(db.pool()).await.expect("Error running migrations");
    info!("🚀️ Test database ready at {url}");
}

/// A unique sqlite URL in the system temp directory, so that concurrent tests never share state.
pub fn random_db_path() -> String {
    let dir = std::env::temp_dir().join(format!("dispatch_test_{}", rand::random::<u64>()));
    std::fs::create_dir_all(&dir).expect("Error creating test database directory");
    format!("sqlite://{}/dispatch.db", dir.display())
}
