//! Listing records and detail-page extraction
//!
//! A [`Listing`] is one car-for-sale record. Its `source_url` is the only identity:
//! two records with the same URL are the same listing observed at different times.

mod parser;

pub use parser::{
    extract_image_count, extract_odometer_km, extract_phone_number, extract_plate_and_vin,
    extract_price_usd, extract_primary_image_url, extract_seller_name, extract_title,
    parse_listing,
};

use chrono::{DateTime, Utc};

/// One scraped car listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    /// Absolute detail-page URL (natural key)
    pub source_url: String,

    pub title: String,

    /// Asking price in whole US dollars
    pub price_usd: u64,

    /// Odometer reading in kilometres, with thousands markers expanded
    pub odometer_km: u64,

    pub seller_name: Option<String>,

    /// Seller phone as a bare national number
    pub phone_number: Option<i64>,

    pub primary_image_url: Option<String>,

    pub image_count: u32,

    pub plate_number: Option<String>,

    pub vin: Option<String>,

    /// Set by storage on every insert and refresh; `None` until persisted
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl Listing {
    /// Creates an empty listing for the given URL
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            ..Default::default()
        }
    }
}
