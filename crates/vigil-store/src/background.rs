use std::path::Path;

use image::GrayImage;
use tokio_rusqlite::Connection;

use crate::StoreError;

/// Persistence for the single reference background frame.
///
/// The table holds at most one row; saving a new background replaces the
/// previous one wholesale inside a transaction, so a reader never observes
/// a half-updated reference.
#[derive(Clone)]
pub struct BackgroundStore {
    conn: Connection,
}

impl BackgroundStore {
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 CREATE TABLE IF NOT EXISTS background (
                     pixels BLOB NOT NULL,
                     width INTEGER NOT NULL,
                     height INTEGER NOT NULL,
                     created_at TEXT NOT NULL
                 );",
            )?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Replace the stored background with the given grayscale frame.
    pub async fn save(&self, frame: &GrayImage) -> Result<(), StoreError> {
        let pixels = frame.as_raw().clone();
        let (width, height) = frame.dimensions();
        let created_at = chrono::Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM background", [])?;
                tx.execute(
                    "INSERT INTO background (pixels, width, height, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![pixels, width, height, created_at],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;

        tracing::info!(width, height, "background reference saved");
        Ok(())
    }

    /// Load the stored background, if any.
    pub async fn load(&self) -> Result<Option<GrayImage>, StoreError> {
        let row: Option<(Vec<u8>, u32, u32)> = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT pixels, width, height FROM background LIMIT 1")?;
                let mut rows = stmt.query_map([], |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, u32>(2)?,
                    ))
                })?;
                Ok(rows.next().transpose()?)
            })
            .await?;

        match row {
            Some((pixels, width, height)) => GrayImage::from_raw(width, height, pixels)
                .map(Some)
                .ok_or(StoreError::InvalidBaseline(width, height)),
            None => Ok(None),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_empty() {
        let store = BackgroundStore::open(Path::new(":memory:")).await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = BackgroundStore::open(Path::new(":memory:")).await.unwrap();
        let frame = GrayImage::from_pixel(320, 240, image::Luma([77u8]));

        store.save(&frame).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.dimensions(), (320, 240));
        assert_eq!(loaded.as_raw(), frame.as_raw());
    }

    #[tokio::test]
    async fn test_save_replaces_wholesale() {
        let store = BackgroundStore::open(Path::new(":memory:")).await.unwrap();

        store
            .save(&GrayImage::from_pixel(320, 240, image::Luma([10u8])))
            .await
            .unwrap();
        store
            .save(&GrayImage::from_pixel(320, 240, image::Luma([200u8])))
            .await
            .unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert!(loaded.as_raw().iter().all(|&p| p == 200));

        // Only one row survives
        let count: i64 = store
            .conn
            .call(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM background", [], |row| row.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
