use anyhow::Result;

use crate::config::Config;
use crate::db;

/// Create the schema for every configured store. Idempotent.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let mut names: Vec<&String> = config.stores.keys().collect();
    names.sort();
    for name in names {
        migrate_store(config, name).await?;
        println!("store '{}' initialized", name);
    }
    Ok(())
}

async fn migrate_store(config: &Config, store: &str) -> Result<()> {
    let pool = db::connect(config, store).await?;

    // One row per indexed image. `idx` is the stable item index the whole
    // engine keys on; embeddings are little-endian f32 blobs.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS images (
            idx INTEGER PRIMARY KEY,
            filename TEXT NOT NULL,
            subfolder TEXT NOT NULL DEFAULT '',
            filepath TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            imported_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_images_subfolder ON images(subfolder)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
