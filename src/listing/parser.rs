//! Detail-page field extraction
//!
//! Every extractor is a total function over any document: a missing element,
//! unexpected text, or an unparsable number yields the field's default instead
//! of an error. Network and retry concerns live in the crawler, not here.

use crate::listing::Listing;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

const TITLE_SELECTOR: &str = "#sideTitleTitle";
const PRICE_SELECTOR: &str = "#sidePrice";
const ODOMETER_SELECTOR: &str = "#basicInfoTableMainInfo0";
const SELLER_SELECTOR: &str = "#sellerInfoUserName";
const PHONE_SELECTOR: &str = "#sellerInfo button.size-large.conversion";
const GALLERY_IMAGE_SELECTOR: &str = "#photoSlider img";
const PHOTO_COUNT_SELECTOR: &str = "span.common-badge.alpha.medium";
const BADGES_SELECTOR: &str = "#badges";

/// Lowercase markers meaning the odometer figure is in thousands
const THOUSANDS_MARKERS: &[&str] = &["тис", "тыс", "thousand"];

/// Plate (`AA 1234 BB`) immediately followed by a 17-character VIN
static PLATE_VIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Z]{2}\s\d{4}\s[A-Z]{2})([A-Z0-9]{17})").expect("plate/VIN pattern is valid")
});

static NUMBER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+").expect("number pattern is valid"));

/// Parses a fetched detail page into a listing record
///
/// Never fails: fields that cannot be found keep their zero value.
///
/// # Example
///
/// ```
/// use lot_harvester::listing::parse_listing;
///
/// let html = r#"<div id="sideTitleTitle">Skoda Octavia 2019</div>"#;
/// let listing = parse_listing(html, "https://cars.example.com/auto_1.html");
/// assert_eq!(listing.title, "Skoda Octavia 2019");
/// assert_eq!(listing.odometer_km, 0);
/// ```
pub fn parse_listing(html: &str, source_url: &str) -> Listing {
    let document = Html::parse_document(html);
    let (plate_number, vin) = extract_plate_and_vin(&document);

    Listing {
        source_url: source_url.to_string(),
        title: extract_title(&document),
        price_usd: extract_price_usd(&document),
        odometer_km: extract_odometer_km(&document),
        seller_name: extract_seller_name(&document),
        phone_number: extract_phone_number(&document),
        primary_image_url: extract_primary_image_url(&document),
        image_count: extract_image_count(&document),
        plate_number,
        vin,
        last_seen_at: None,
    }
}

/// Returns the concatenated text of the first element matching `selector`
fn first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>())
}

fn digits_only(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

pub fn extract_title(document: &Html) -> String {
    first_text(document, TITLE_SELECTOR)
        .map(|text| text.trim().to_string())
        .unwrap_or_default()
}

/// Extracts the USD price from text such as `"15 500 $ · 620 000 грн"`
///
/// Only the part before the first `$` is used; prices without a dollar amount are 0.
pub fn extract_price_usd(document: &Html) -> u64 {
    let Some(text) = first_text(document, PRICE_SELECTOR) else {
        return 0;
    };

    match text.split_once('$') {
        Some((amount, _)) => {
            let cleaned: String = amount.chars().filter(|c| !c.is_whitespace()).collect();
            cleaned.parse().unwrap_or(0)
        }
        None => 0,
    }
}

/// Extracts the odometer in kilometres
///
/// All digits in the element are joined; a thousands marker (`"95 тис. км"`)
/// multiplies the value by 1000.
pub fn extract_odometer_km(document: &Html) -> u64 {
    let Some(text) = first_text(document, ODOMETER_SELECTOR) else {
        return 0;
    };

    let value: u64 = match digits_only(&text).parse() {
        Ok(value) => value,
        Err(_) => return 0,
    };

    let lowered = text.to_lowercase();
    if THOUSANDS_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
    {
        value.saturating_mul(1000)
    } else {
        value
    }
}

pub fn extract_seller_name(document: &Html) -> Option<String> {
    first_text(document, SELLER_SELECTOR)
        .map(|text| text.trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Extracts the seller phone when it is rendered in the page
///
/// Numbers revealed by a script-driven button are not present in the HTML and
/// come back as `None`.
pub fn extract_phone_number(document: &Html) -> Option<i64> {
    let text = first_text(document, PHONE_SELECTOR)?;
    digits_only(&text).parse().ok()
}

/// Extracts the first gallery image (lazy-loaded via `data-src`)
pub fn extract_primary_image_url(document: &Html) -> Option<String> {
    let selector = Selector::parse(GALLERY_IMAGE_SELECTOR).ok()?;
    document
        .select(&selector)
        .find_map(|img| img.value().attr("data-src"))
        .map(|src| src.trim().to_string())
        .filter(|src| !src.is_empty())
}

/// Extracts the photo total from a badge such as `"1 з 24"`
///
/// The badge shows a position and a total; the second number is the total.
pub fn extract_image_count(document: &Html) -> u32 {
    let Some(text) = first_text(document, PHOTO_COUNT_SELECTOR) else {
        return 0;
    };

    NUMBER_PATTERN
        .find_iter(&text)
        .nth(1)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Extracts the registration plate and VIN from the badge strip
///
/// The badge text runs the plate and VIN together (`"AA 1234 BBWVWZZZ1JZXW000001"`).
pub fn extract_plate_and_vin(document: &Html) -> (Option<String>, Option<String>) {
    let Some(text) = first_text(document, BADGES_SELECTOR) else {
        return (None, None);
    };

    match PLATE_VIN_PATTERN.captures(&text) {
        Some(captures) => (
            captures.get(1).map(|m| m.as_str().to_string()),
            captures.get(2).map(|m| m.as_str().to_string()),
        ),
        None => (None, None),
    }
}
