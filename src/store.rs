//! Embedding store boundary.
//!
//! The curation engine never computes embeddings; it consumes a read-only
//! store mapping a stable item index to a fixed-length feature vector and
//! file metadata. The store is backed by SQLite (vectors as little-endian
//! f32 BLOBs) and loaded into an in-memory [`MemoryStore`] snapshot before a
//! job starts, so an in-flight job never observes reindexing.

use std::io::BufRead;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::models::ImageMeta;

/// Read-only view of the image collection for the lifetime of one curation
/// run. All vectors share one dimensionality.
pub trait EmbeddingStore: Send + Sync {
    /// Number of indexed items.
    fn len(&self) -> usize;

    /// True when the store holds no items.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector dimensionality shared by every item.
    fn dims(&self) -> usize;

    /// Feature vector for an item index.
    fn vector(&self, index: usize) -> Result<&[f32]>;

    /// File metadata for an item index.
    fn metadata(&self, index: usize) -> Result<&ImageMeta>;
}

/// In-memory store snapshot. Items are dense: index `i` is row `i`.
pub struct MemoryStore {
    dims: usize,
    vectors: Vec<Vec<f32>>,
    meta: Vec<ImageMeta>,
}

impl MemoryStore {
    /// Build a store from parallel vector/metadata rows.
    ///
    /// # Errors
    ///
    /// Fails if the rows differ in length or the vectors are not all of the
    /// same nonzero dimensionality.
    pub fn new(vectors: Vec<Vec<f32>>, meta: Vec<ImageMeta>) -> Result<Self> {
        if vectors.len() != meta.len() {
            bail!(
                "Store rows mismatched: {} vectors vs {} metadata entries",
                vectors.len(),
                meta.len()
            );
        }
        let dims = vectors.first().map(|v| v.len()).unwrap_or(0);
        if !vectors.is_empty() && dims == 0 {
            bail!("Store vectors must have nonzero dimensionality");
        }
        for (i, v) in vectors.iter().enumerate() {
            if v.len() != dims {
                bail!(
                    "Vector {} has {} dims, expected {} (store must be uniform)",
                    i,
                    v.len(),
                    dims
                );
            }
        }
        Ok(Self {
            dims,
            vectors,
            meta,
        })
    }

    /// Borrow all vectors, index-aligned. Used by the selector, which works
    /// over the whole matrix at once.
    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }
}

impl EmbeddingStore for MemoryStore {
    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn vector(&self, index: usize) -> Result<&[f32]> {
        self.vectors
            .get(index)
            .map(|v| v.as_slice())
            .with_context(|| format!("Embedding store has no vector for index {}", index))
    }

    fn metadata(&self, index: usize) -> Result<&ImageMeta> {
        self.meta
            .get(index)
            .with_context(|| format!("Embedding store has no metadata for index {}", index))
    }
}

/// Load the full store into a [`MemoryStore`] snapshot.
///
/// Rows are read in `idx` order; the snapshot stays consistent for the
/// lifetime of the job that requested it regardless of later imports.
pub async fn load_store(pool: &SqlitePool) -> Result<MemoryStore> {
    let rows = sqlx::query(
        "SELECT idx, filename, subfolder, filepath, embedding FROM images ORDER BY idx",
    )
    .fetch_all(pool)
    .await
    .context("Embedding store unavailable")?;

    let mut vectors = Vec::with_capacity(rows.len());
    let mut meta = Vec::with_capacity(rows.len());

    for (expected, row) in rows.iter().enumerate() {
        let idx: i64 = row.get("idx");
        if idx as usize != expected {
            bail!(
                "Embedding store is not densely indexed: expected idx {}, found {}",
                expected,
                idx
            );
        }
        let blob: Vec<u8> = row.get("embedding");
        vectors.push(blob_to_vec(&blob));
        meta.push(ImageMeta {
            filename: row.get("filename"),
            subfolder: row.get("subfolder"),
            filepath: row.get("filepath"),
        });
    }

    MemoryStore::new(vectors, meta)
}

// ============ Import ============

/// One line of a `pcur import` JSONL file.
#[derive(Debug, Deserialize)]
struct ImportRecord {
    filename: String,
    #[serde(default)]
    subfolder: String,
    filepath: String,
    embedding: Vec<f32>,
}

/// Bulk-load embeddings from a JSONL file produced by the external model
/// service. Replaces the named store's contents; indices are assigned in
/// file order starting at 0.
pub async fn run_import(config: &Config, store: &str, path: &Path) -> Result<()> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open import file: {}", path.display()))?;
    let reader = std::io::BufReader::new(file);

    let mut records: Vec<ImportRecord> = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ImportRecord = serde_json::from_str(&line)
            .with_context(|| format!("Invalid import record on line {}", line_no + 1))?;
        if record.embedding.is_empty() {
            bail!("Empty embedding on line {}", line_no + 1);
        }
        records.push(record);
    }

    if records.is_empty() {
        bail!("Import file contains no records");
    }

    let dims = records[0].embedding.len();
    for (i, r) in records.iter().enumerate() {
        if r.embedding.len() != dims {
            bail!(
                "Record {} has {} dims, expected {} (all embeddings must match)",
                i,
                r.embedding.len(),
                dims
            );
        }
    }

    let pool = db::connect(config, store).await?;
    let now = chrono::Utc::now().timestamp();

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM images").execute(&mut *tx).await?;
    for (idx, r) in records.iter().enumerate() {
        sqlx::query(
            "INSERT INTO images (idx, filename, subfolder, filepath, dims, embedding, imported_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(idx as i64)
        .bind(&r.filename)
        .bind(&r.subfolder)
        .bind(&r.filepath)
        .bind(dims as i64)
        .bind(vec_to_blob(&r.embedding))
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    println!("import {} into '{}'", path.display(), store);
    println!("  images: {}", records.len());
    println!("  dims: {}", dims);

    pool.close().await;
    Ok(())
}

/// Print row count and dimensionality of the named store.
pub async fn run_stats(config: &Config, store: &str) -> Result<()> {
    let pool = db::connect(config, store).await?;

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM images")
        .fetch_one(&pool)
        .await?;
    let dims: Option<i64> = sqlx::query_scalar("SELECT dims FROM images LIMIT 1")
        .fetch_optional(&pool)
        .await?;

    println!("store '{}' ({})", store, config.store_path(store)?.display());
    println!("  images: {}", count);
    match dims {
        Some(d) => println!("  dims: {}", d),
        None => println!("  dims: (empty store)"),
    }

    pool.close().await;
    Ok(())
}

// ============ BLOB codec ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str) -> ImageMeta {
        ImageMeta {
            filename: name.to_string(),
            subfolder: "set".to_string(),
            filepath: format!("/photos/set/{}", name),
        }
    }

    #[test]
    fn blob_round_trip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn memory_store_lookup() {
        let store = MemoryStore::new(
            vec![vec![0.0, 1.0], vec![1.0, 0.0]],
            vec![meta("a.png"), meta("b.png")],
        )
        .unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.dims(), 2);
        assert_eq!(store.vector(1).unwrap(), &[1.0, 0.0]);
        assert_eq!(store.metadata(0).unwrap().filename, "a.png");
    }

    #[test]
    fn memory_store_rejects_missing_index() {
        let store = MemoryStore::new(vec![vec![0.0]], vec![meta("a.png")]).unwrap();
        assert!(store.vector(5).is_err());
        assert!(store.metadata(5).is_err());
    }

    #[test]
    fn memory_store_rejects_ragged_vectors() {
        let result = MemoryStore::new(
            vec![vec![0.0, 1.0], vec![1.0]],
            vec![meta("a.png"), meta("b.png")],
        );
        assert!(result.is_err());
    }

    #[test]
    fn memory_store_rejects_row_mismatch() {
        let result = MemoryStore::new(vec![vec![0.0]], vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn empty_store_is_valid() {
        let store = MemoryStore::new(vec![], vec![]).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.dims(), 0);
    }
}
