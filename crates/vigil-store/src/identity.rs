use std::path::Path;

use tokio_rusqlite::Connection;
use vigil_core::{Embedding, Identity};

use crate::StoreError;

/// SQLite-backed identity storage.
///
/// Each enrolled identity carries one or more embedding vectors stored as
/// little-endian f32 blobs. Enrollment is append-only: registering the same
/// name twice produces two independent identity rows, and matching iterates
/// all of them. The expected embedding dimension is fixed at open time so a
/// backend swap cannot silently mix vector sizes in one database.
#[derive(Clone)]
pub struct IdentityStore {
    conn: Connection,
    dim: usize,
}

impl IdentityStore {
    /// Open (or create) the database at the given path and run migrations.
    pub async fn open(db_path: &Path, dim: usize) -> Result<Self, StoreError> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA foreign_keys = ON;
                 CREATE TABLE IF NOT EXISTS identities (
                     id INTEGER PRIMARY KEY AUTOINCREMENT,
                     name TEXT NOT NULL,
                     created_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS embeddings (
                     identity_id INTEGER NOT NULL REFERENCES identities(id) ON DELETE CASCADE,
                     position INTEGER NOT NULL,
                     vector BLOB NOT NULL,
                     PRIMARY KEY (identity_id, position)
                 );",
            )?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, dim })
    }

    /// Insert a new identity with its embeddings. Returns the row id.
    ///
    /// Always inserts a fresh row, even when the name is already enrolled.
    pub async fn enroll(&self, name: &str, embeddings: &[Embedding]) -> Result<i64, StoreError> {
        if embeddings.is_empty() {
            return Err(StoreError::NoEmbeddings);
        }
        let mut blobs = Vec::with_capacity(embeddings.len());
        for embedding in embeddings {
            validate_values(&embedding.values, self.dim)?;
            blobs.push(embedding_to_bytes(&embedding.values));
        }

        let name = name.to_string();
        let created_at = chrono::Utc::now().to_rfc3339();

        let id = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO identities (name, created_at) VALUES (?1, ?2)",
                    rusqlite::params![name, created_at],
                )?;
                let id = tx.last_insert_rowid();
                for (position, blob) in blobs.iter().enumerate() {
                    tx.execute(
                        "INSERT INTO embeddings (identity_id, position, vector)
                         VALUES (?1, ?2, ?3)",
                        rusqlite::params![id, position as i64, blob],
                    )?;
                }
                tx.commit()?;
                Ok(id)
            })
            .await?;

        tracing::info!(id, count = embeddings.len(), "identity enrolled");
        Ok(id)
    }

    /// Load every enrolled identity with its embeddings, in insertion order.
    pub async fn fetch_all(&self) -> Result<Vec<Identity>, StoreError> {
        // Fetch raw rows from SQLite; decode blobs outside the closure
        let rows: Vec<(i64, String, String, Vec<Vec<u8>>)> = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, created_at FROM identities ORDER BY id",
                )?;
                let mut emb_stmt = conn.prepare(
                    "SELECT vector FROM embeddings WHERE identity_id = ?1 ORDER BY position",
                )?;
                let idents = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                let mut out = Vec::with_capacity(idents.len());
                for (id, name, created_at) in idents {
                    let blobs = emb_stmt
                        .query_map([id], |row| row.get::<_, Vec<u8>>(0))?
                        .collect::<Result<Vec<_>, _>>()?;
                    out.push((id, name, created_at, blobs));
                }
                Ok(out)
            })
            .await?;

        let mut identities = Vec::with_capacity(rows.len());
        for (id, name, created_at, blobs) in rows {
            let mut embeddings = Vec::with_capacity(blobs.len());
            for blob in blobs {
                embeddings.push(Embedding::new(bytes_to_embedding(&blob, self.dim)?));
            }
            identities.push(Identity {
                id,
                name,
                embeddings,
                created_at,
            });
        }
        Ok(identities)
    }

    /// Count enrolled identities.
    pub async fn count(&self) -> Result<u64, StoreError> {
        self.conn
            .call(|conn| {
                let count: u64 =
                    conn.query_row("SELECT COUNT(*) FROM identities", [], |row| row.get(0))?;
                Ok(count)
            })
            .await
            .map_err(StoreError::from)
    }
}

// ── Serialization helpers ─────────────────────────────────────────────────────

fn embedding_to_bytes(values: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for &v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn bytes_to_embedding(bytes: &[u8], dim: usize) -> Result<Vec<f32>, StoreError> {
    if bytes.len() != dim * 4 {
        return Err(StoreError::InvalidBlob(bytes.len()));
    }

    let mut values = Vec::with_capacity(dim);
    for chunk in bytes.chunks_exact(4) {
        let arr: [u8; 4] = chunk
            .try_into()
            .map_err(|_| StoreError::InvalidBlob(bytes.len()))?;
        let v = f32::from_le_bytes(arr);
        if !v.is_finite() {
            return Err(StoreError::InvalidValue);
        }
        values.push(v);
    }
    Ok(values)
}

fn validate_values(values: &[f32], dim: usize) -> Result<(), StoreError> {
    if values.len() != dim {
        return Err(StoreError::InvalidDim(values.len(), dim));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(StoreError::InvalidValue);
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
