//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Lot-Harvester database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track harvest runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    pages_scanned INTEGER NOT NULL DEFAULT 0,
    links_queued INTEGER NOT NULL DEFAULT 0,
    listings_saved INTEGER NOT NULL DEFAULT 0,
    links_dropped INTEGER NOT NULL DEFAULT 0
);

-- One row per listing, keyed by its detail-page URL
CREATE TABLE IF NOT EXISTS listings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_url TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    price_usd INTEGER NOT NULL DEFAULT 0,
    odometer_km INTEGER NOT NULL DEFAULT 0,
    seller_name TEXT,
    phone_number INTEGER,
    primary_image_url TEXT,
    image_count INTEGER NOT NULL DEFAULT 0,
    plate_number TEXT,
    vin TEXT,
    first_seen_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_listings_plate ON listings(plate_number);
CREATE INDEX IF NOT EXISTS idx_listings_vin ON listings(vin);
CREATE INDEX IF NOT EXISTS idx_listings_last_seen ON listings(last_seen_at);
"#;

/// Initializes the database schema
///
/// Safe to call repeatedly; every statement is `IF NOT EXISTS`.
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
