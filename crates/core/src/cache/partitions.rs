//! Partition management.
//!
//! A partition is created lazily on first write (or explicitly on open) and
//! deleted as a unit; deleting it drops every entry it holds.

use super::connection::CacheDb;
use crate::Error;
use tokio_rusqlite::params;

impl CacheDb {
    /// Create the partition if it does not exist yet.
    pub async fn open_partition(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
                    params![name, chrono::Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// List partition names in creation order.
    pub async fn partition_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM partitions ORDER BY rowid ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a partition and all of its entries.
    ///
    /// Returns false if the partition did not exist.
    pub async fn delete_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM partitions WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every partition except those named in `keep`.
    ///
    /// Returns the names that were deleted.
    pub async fn retain_partitions(&self, keep: &[&str]) -> Result<Vec<String>, Error> {
        let mut deleted = Vec::new();
        for name in self.partition_names().await? {
            if keep.contains(&name.as_str()) {
                continue;
            }
            if self.delete_partition(&name).await? {
                deleted.push(name);
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_partition("pocketgnu-static-v1").await.unwrap();
        db.open_partition("pocketgnu-static-v1").await.unwrap();

        assert_eq!(db.partition_names().await.unwrap(), vec!["pocketgnu-static-v1"]);
    }

    #[tokio::test]
    async fn test_names_in_creation_order() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_partition("b-static").await.unwrap();
        db.open_partition("a-dynamic").await.unwrap();

        assert_eq!(db.partition_names().await.unwrap(), vec!["b-static", "a-dynamic"]);
    }

    #[tokio::test]
    async fn test_delete_partition() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_partition("old").await.unwrap();

        assert!(db.delete_partition("old").await.unwrap());
        assert!(!db.delete_partition("old").await.unwrap());
        assert!(db.partition_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retain_partitions() {
        let db = CacheDb::open_in_memory().await.unwrap();
        for name in ["pocketgnu-static-v1", "pocketgnu-dynamic-v1", "pocketgnu-static-v2", "pocketgnu-dynamic-v2"] {
            db.open_partition(name).await.unwrap();
        }

        let deleted = db
            .retain_partitions(&["pocketgnu-static-v2", "pocketgnu-dynamic-v2"])
            .await
            .unwrap();

        assert_eq!(deleted, vec!["pocketgnu-static-v1", "pocketgnu-dynamic-v1"]);
        assert_eq!(db.partition_names().await.unwrap(), vec!["pocketgnu-static-v2", "pocketgnu-dynamic-v2"]);
    }
}
