//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::listing::Listing;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{RunCounts, RunRecord, RunStatus};
use crate::HarvestError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::cell::Cell;
use std::path::Path;

/// Insert-or-refresh keyed on `source_url`; `first_seen_at` is only written on insert
const UPSERT_LISTING_SQL: &str = "
    INSERT INTO listings (
        source_url, title, price_usd, odometer_km, seller_name, phone_number,
        primary_image_url, image_count, plate_number, vin, first_seen_at, last_seen_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
    ON CONFLICT(source_url) DO UPDATE SET
        title = excluded.title,
        price_usd = excluded.price_usd,
        odometer_km = excluded.odometer_km,
        seller_name = excluded.seller_name,
        phone_number = excluded.phone_number,
        primary_image_url = excluded.primary_image_url,
        image_count = excluded.image_count,
        plate_number = excluded.plate_number,
        vin = excluded.vin,
        last_seen_at = excluded.last_seen_at
";

const SELECT_LISTING_SQL: &str = "
    SELECT source_url, title, price_usd, odometer_km, seller_name, phone_number,
           primary_image_url, image_count, plate_number, vin, last_seen_at
    FROM listings WHERE source_url = ?1
";

const SELECT_RUN_COLUMNS: &str = "SELECT id, started_at, finished_at, config_hash, status,
    pages_scanned, links_queued, listings_saved, links_dropped FROM runs";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
    schema_ready: Cell<bool>,
}

impl SqliteStorage {
    /// Opens (or creates) the database file at `path`, creating missing parent directories
    ///
    /// Tables are created lazily on first use.
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        Ok(Self {
            conn,
            schema_ready: Cell::new(false),
        })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn,
            schema_ready: Cell::new(false),
        })
    }

    /// Creates the schema the first time the database is touched
    fn ensure_schema(&self) -> StorageResult<()> {
        if !self.schema_ready.get() {
            initialize_schema(&self.conn)?;
            self.schema_ready.set(true);
            tracing::debug!("Database schema initialized");
        }
        Ok(())
    }
}

fn to_db_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_db_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Failed),
        counts: RunCounts {
            pages_scanned: from_db_int(row.get(5)?),
            links_queued: from_db_int(row.get(6)?),
            listings_saved: from_db_int(row.get(7)?),
            links_dropped: from_db_int(row.get(8)?),
        },
    })
}

fn listing_from_row(row: &Row<'_>) -> rusqlite::Result<Listing> {
    let last_seen: String = row.get(10)?;
    Ok(Listing {
        source_url: row.get(0)?,
        title: row.get(1)?,
        price_usd: from_db_int(row.get(2)?),
        odometer_km: from_db_int(row.get(3)?),
        seller_name: row.get(4)?,
        phone_number: row.get(5)?,
        primary_image_url: row.get(6)?,
        image_count: row.get(7)?,
        plate_number: row.get(8)?,
        vin: row.get(9)?,
        last_seen_at: last_seen.parse::<DateTime<Utc>>().ok(),
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn begin_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        self.ensure_schema()?;
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        counts: &RunCounts,
    ) -> StorageResult<()> {
        self.ensure_schema()?;
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, pages_scanned = ?3,
             links_queued = ?4, listings_saved = ?5, links_dropped = ?6 WHERE id = ?7",
            params![
                status.to_db_string(),
                now,
                to_db_int(counts.pages_scanned),
                to_db_int(counts.links_queued),
                to_db_int(counts.listings_saved),
                to_db_int(counts.links_dropped),
                run_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.ensure_schema()?;
        self.conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_RUN_COLUMNS),
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        self.ensure_schema()?;
        let run = self
            .conn
            .query_row(
                &format!("{} ORDER BY id DESC LIMIT 1", SELECT_RUN_COLUMNS),
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    // ===== Listings =====

    fn upsert_listings(&mut self, listings: &[Listing]) -> StorageResult<usize> {
        self.ensure_schema()?;
        if listings.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT_LISTING_SQL)?;
            for listing in listings {
                stmt.execute(params![
                    listing.source_url,
                    listing.title,
                    to_db_int(listing.price_usd),
                    to_db_int(listing.odometer_km),
                    listing.seller_name,
                    listing.phone_number,
                    listing.primary_image_url,
                    listing.image_count,
                    listing.plate_number,
                    listing.vin,
                    now,
                ])?;
            }
        }
        tx.commit()?;

        Ok(listings.len())
    }

    fn get_listing(&self, source_url: &str) -> StorageResult<Option<Listing>> {
        self.ensure_schema()?;
        let listing = self
            .conn
            .query_row(SELECT_LISTING_SQL, params![source_url], listing_from_row)
            .optional()?;
        Ok(listing)
    }

    fn count_listings(&self) -> StorageResult<u64> {
        self.ensure_schema()?;
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM listings", [], |row| row.get(0))?;
        Ok(from_db_int(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_listing(url: &str) -> Listing {
        Listing {
            source_url: url.to_string(),
            title: "Skoda Octavia 2019".to_string(),
            price_usd: 14200,
            odometer_km: 120000,
            seller_name: Some("Ірина".to_string()),
            phone_number: Some(501112233),
            primary_image_url: Some("https://cdn.example.com/1.jpg".to_string()),
            image_count: 12,
            plate_number: Some("KA 0001 AB".to_string()),
            vin: Some("TMBJJ7NE0K0000001".to_string()),
            last_seen_at: None,
        }
    }

    #[test]
    fn test_create_in_memory() {
        assert!(SqliteStorage::open_in_memory().is_ok());
    }

    #[test]
    fn test_schema_created_lazily() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        assert_eq!(storage.count_listings().unwrap(), 0);
    }

    #[test]
    fn test_upsert_inserts_new_listing() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let listing = sample_listing("https://cars.example.com/auto_1.html");

        let written = storage.upsert_listings(&[listing.clone()]).unwrap();
        assert_eq!(written, 1);

        let stored = storage.get_listing(&listing.source_url).unwrap().unwrap();
        assert_eq!(stored.title, listing.title);
        assert_eq!(stored.price_usd, 14200);
        assert_eq!(stored.phone_number, Some(501112233));
        assert_eq!(stored.vin.as_deref(), Some("TMBJJ7NE0K0000001"));
        assert!(stored.last_seen_at.is_some());
    }

    #[test]
    fn test_upsert_same_url_refreshes_single_row() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let url = "https://cars.example.com/auto_1.html";

        storage.upsert_listings(&[sample_listing(url)]).unwrap();
        let first = storage.get_listing(url).unwrap().unwrap();

        let mut changed = sample_listing(url);
        changed.price_usd = 13500;
        changed.seller_name = None;
        changed.image_count = 9;
        changed.primary_image_url = Some("https://cdn.example.com/2.jpg".to_string());
        storage.upsert_listings(&[changed]).unwrap();

        assert_eq!(storage.count_listings().unwrap(), 1);

        let second = storage.get_listing(url).unwrap().unwrap();
        assert_eq!(second.price_usd, 13500);
        assert_eq!(second.seller_name, None);
        assert_eq!(second.image_count, 9);
        assert_eq!(
            second.primary_image_url.as_deref(),
            Some("https://cdn.example.com/2.jpg")
        );
        assert!(second.last_seen_at.unwrap() >= first.last_seen_at.unwrap());
    }

    #[test]
    fn test_first_seen_is_kept_on_refresh() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let url = "https://cars.example.com/auto_1.html";

        storage.upsert_listings(&[sample_listing(url)]).unwrap();
        let first_seen: String = storage
            .conn
            .query_row("SELECT first_seen_at FROM listings", [], |row| row.get(0))
            .unwrap();

        storage.upsert_listings(&[sample_listing(url)]).unwrap();
        let (first_after, last_after): (String, String) = storage
            .conn
            .query_row("SELECT first_seen_at, last_seen_at FROM listings", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();

        assert_eq!(first_seen, first_after);
        assert!(last_after >= first_after);
    }

    #[test]
    fn test_upsert_batch_with_duplicate_urls() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let url = "https://cars.example.com/auto_1.html";

        let mut later = sample_listing(url);
        later.title = "Updated".to_string();

        storage
            .upsert_listings(&[
                sample_listing(url),
                later,
                sample_listing("https://cars.example.com/auto_2.html"),
            ])
            .unwrap();

        assert_eq!(storage.count_listings().unwrap(), 2);
        assert_eq!(storage.get_listing(url).unwrap().unwrap().title, "Updated");
    }

    #[test]
    fn test_upsert_empty_batch() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        assert_eq!(storage.upsert_listings(&[]).unwrap(), 0);
    }

    #[test]
    fn test_get_missing_listing() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        assert!(storage
            .get_listing("https://cars.example.com/none.html")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_run_lifecycle() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let run_id = storage.begin_run("test_hash").unwrap();
        assert!(run_id > 0);

        let run = storage.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.finished_at.is_none());

        let counts = RunCounts {
            pages_scanned: 2,
            links_queued: 40,
            listings_saved: 38,
            links_dropped: 2,
        };
        storage
            .finish_run(run_id, RunStatus::Completed, &counts)
            .unwrap();

        let run = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(run.id, run_id);
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.counts, counts);
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_finish_unknown_run() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let result = storage.finish_run(42, RunStatus::Completed, &RunCounts::default());
        assert!(matches!(result, Err(StorageError::RunNotFound(42))));
    }

    #[test]
    fn test_get_unknown_run() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        assert!(matches!(
            storage.get_run(7),
            Err(StorageError::RunNotFound(7))
        ));
    }

    #[test]
    fn test_on_disk_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listings.db");
        let url = "https://cars.example.com/auto_1.html";

        {
            let mut storage = SqliteStorage::new(&path).unwrap();
            storage.upsert_listings(&[sample_listing(url)]).unwrap();
        }

        let storage = SqliteStorage::new(&path).unwrap();
        assert_eq!(storage.count_listings().unwrap(), 1);
    }

    #[test]
    fn test_new_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("nested").join("listings.db");

        let storage = SqliteStorage::new(&path).unwrap();
        assert_eq!(storage.count_listings().unwrap(), 0);
        assert!(path.exists());
    }
}
