//! Response snapshots and entry CRUD.
//!
//! A [`Snapshot`] is the stored copy of a response: status, lower-cased
//! headers and body bytes. Its freshness timestamp is the `date` header,
//! which drives age-based eviction.

use std::collections::BTreeMap;

use super::connection::CacheDb;
use super::hash::compute_entry_key;
use crate::Error;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A stored (or storable) response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Snapshot {
    /// Request URL the response answers.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response headers with lower-cased names.
    pub headers: BTreeMap<String, String>,
    /// Response body.
    pub body: Vec<u8>,
    /// RFC 3339 time the entry was written; `None` until stored.
    pub cached_at: Option<String>,
}

impl Snapshot {
    pub fn new(url: impl Into<String>, status: u16) -> Self {
        Self { url: url.into(), status, headers: BTreeMap::new(), body: Vec::new(), cached_at: None }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Synthetic 408 returned when request handling fails outright.
    pub fn request_timeout(url: impl Into<String>) -> Self {
        Self::new(url, 408)
            .with_header("content-type", "text/plain; charset=utf-8")
            .with_body("Request Timeout")
    }

    /// 2xx-class status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Parsed `date` header, if present and a valid HTTP-date.
    pub fn freshness_timestamp(&self) -> Option<DateTime<Utc>> {
        let raw = self.header("date")?;
        DateTime::parse_from_rfc2822(raw.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Whether the entry is older than `max_age` at `now`.
    ///
    /// Entries without a usable freshness timestamp never expire.
    pub fn is_expired(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        self.freshness_timestamp()
            .is_some_and(|stamped| now.signed_duration_since(stamped) > max_age)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Raw column values of one `entries` row.
type EntryRow = (String, i64, String, Vec<u8>, String);

fn decode_row(row: EntryRow) -> Result<Snapshot, Error> {
    let (url, status, headers_json, body, cached_at) = row;
    let headers = serde_json::from_str(&headers_json)
        .map_err(|e| Error::CorruptEntry(format!("{url}: headers: {e}")))?;
    let status = u16::try_from(status).map_err(|_| Error::CorruptEntry(format!("{url}: status {status}")))?;
    Ok(Snapshot { url, status, headers, body, cached_at: Some(cached_at) })
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn insert_entry(conn: &rusqlite::Connection, partition: &str, snapshot: &Snapshot, now: &str) -> Result<(), Error> {
    let headers_json =
        serde_json::to_string(&snapshot.headers).map_err(|e| Error::CorruptEntry(format!("{}: {e}", snapshot.url)))?;

    conn.execute(
        "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
        params![partition, now],
    )?;
    conn.execute(
        "INSERT INTO entries (key, partition_name, url, status, headers_json, body, cached_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(key) DO UPDATE SET
            status = excluded.status,
            headers_json = excluded.headers_json,
            body = excluded.body,
            cached_at = excluded.cached_at",
        params![
            compute_entry_key(partition, &snapshot.url),
            partition,
            &snapshot.url,
            snapshot.status as i64,
            headers_json,
            &snapshot.body,
            now,
        ],
    )?;
    Ok(())
}

impl CacheDb {
    /// Insert or overwrite the entry for `snapshot.url` in `partition`.
    ///
    /// The partition is created if missing.
    pub async fn put_snapshot(&self, partition: &str, snapshot: &Snapshot) -> Result<(), Error> {
        let partition = partition.to_string();
        let snapshot = snapshot.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                insert_entry(conn, &partition, &snapshot, &Utc::now().to_rfc3339())
            })
            .await
            .map_err(Error::from)
    }

    /// Write several entries in one transaction: either all land or none do.
    pub async fn put_snapshots(&self, partition: &str, snapshots: Vec<Snapshot>) -> Result<(), Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let now = Utc::now().to_rfc3339();
                let tx = conn.transaction()?;
                for snapshot in &snapshots {
                    insert_entry(&tx, &partition, snapshot, &now)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get the entry for `url` in one partition.
    pub async fn get_snapshot(&self, partition: &str, url: &str) -> Result<Option<Snapshot>, Error> {
        let key = compute_entry_key(partition, url);
        let row = self
            .conn
            .call(move |conn| -> Result<Option<EntryRow>, Error> {
                let result = conn.query_row(
                    "SELECT url, status, headers_json, body, cached_at FROM entries WHERE key = ?1",
                    params![key],
                    read_row,
                );

                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        row.map(decode_row).transpose()
    }

    /// Find `url` in any partition, searching partitions in creation order.
    pub async fn match_snapshot(&self, url: &str) -> Result<Option<Snapshot>, Error> {
        let url = url.to_string();
        let row = self
            .conn
            .call(move |conn| -> Result<Option<EntryRow>, Error> {
                let result = conn.query_row(
                    "SELECT e.url, e.status, e.headers_json, e.body, e.cached_at
                    FROM entries e JOIN partitions p ON p.name = e.partition_name
                    WHERE e.url = ?1
                    ORDER BY p.rowid ASC
                    LIMIT 1",
                    params![url],
                    read_row,
                );

                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        row.map(decode_row).transpose()
    }

    /// URLs stored in a partition, in insertion order.
    pub async fn list_urls(&self, partition: &str) -> Result<Vec<String>, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT url FROM entries WHERE partition_name = ?1 ORDER BY rowid ASC")?;
                let urls = stmt
                    .query_map(params![partition], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in a partition.
    pub async fn count_snapshots(&self, partition: &str) -> Result<u64, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM entries WHERE partition_name = ?1",
                    params![partition],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete entries of `partition` whose `date` header is older than `max_age`.
    ///
    /// Entries without a parseable `date` header are kept. Returns the number
    /// of deleted entries.
    pub async fn purge_stale_snapshots(
        &self, partition: &str, max_age: Duration, now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let stale: Vec<String> = {
                    let mut stmt = conn.prepare("SELECT key, url, headers_json FROM entries WHERE partition_name = ?1")?;
                    let rows = stmt
                        .query_map(params![partition], |row| {
                            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
                        })?
                        .collect::<Result<Vec<_>, _>>()?;

                    rows.into_iter()
                        .filter(|(_, url, headers_json)| {
                            match serde_json::from_str::<BTreeMap<String, String>>(headers_json) {
                                Ok(headers) => {
                                    Snapshot { headers, ..Snapshot::new(url.as_str(), 200) }.is_expired(max_age, now)
                                }
                                Err(e) => {
                                    tracing::warn!(url = %url, error = %e, "skipping entry with unreadable headers");
                                    false
                                }
                            }
                        })
                        .map(|(key, _, _)| key)
                        .collect()
                };

                let tx = conn.transaction()?;
                let mut deleted = 0u64;
                for key in &stale {
                    deleted += tx.execute("DELETE FROM entries WHERE key = ?1", params![key])? as u64;
                }
                tx.commit()?;
                Ok(deleted)
            })
            .await
            .map_err(Error::from)
    }
}
