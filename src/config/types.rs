use serde::Deserialize;

/// Main configuration structure for Lot-Harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub output: OutputConfig,
}

/// Where listings are discovered and how search pages are laid out
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Search URL; the `page` query parameter is appended per listing page
    #[serde(rename = "search-url")]
    pub search_url: String,

    /// Origin used to resolve relative card links (defaults to the search URL origin)
    #[serde(rename = "site-origin", default)]
    pub site_origin: Option<String>,

    /// Number of listings shown per search page
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    /// CSS selector matching detail-page anchors on a search page
    #[serde(rename = "card-selector", default = "default_card_selector")]
    pub card_selector: String,

    /// CSS selector for the element displaying the total result count
    #[serde(rename = "total-count-selector", default = "default_total_count_selector")]
    pub total_count_selector: String,
}

/// Worker pool and retry behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct ScraperConfig {
    /// Number of extraction workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Upper bound on search pages to scan (unbounded when absent)
    #[serde(rename = "page-limit", default)]
    pub page_limit: Option<u32>,

    /// Records accumulated per worker before flushing to storage
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// Fetch attempts per detail page
    #[serde(rename = "max-detail-attempts", default = "default_detail_attempts")]
    pub max_detail_attempts: u32,

    /// Fetch attempts per search page
    #[serde(rename = "max-discovery-attempts", default = "default_discovery_attempts")]
    pub max_discovery_attempts: u32,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            page_limit: None,
            batch_size: default_batch_size(),
            max_detail_attempts: default_detail_attempts(),
            max_discovery_attempts: default_discovery_attempts(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Request header profile
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// User agents rotated across the discovery client and workers
    #[serde(rename = "user-agents", default = "default_user_agents")]
    pub user_agents: Vec<String>,

    #[serde(default = "default_accept")]
    pub accept: String,

    #[serde(rename = "accept-language", default = "default_accept_language")]
    pub accept_language: String,

    #[serde(default = "default_referer")]
    pub referer: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agents: default_user_agents(),
            accept: default_accept(),
            accept_language: default_accept_language(),
            referer: default_referer(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

fn default_page_size() -> u32 {
    100
}

fn default_card_selector() -> String {
    "a.link.product-card.horizontal".to_string()
}

fn default_total_count_selector() -> String {
    "#SortButtonContentCount".to_string()
}

fn default_workers() -> usize {
    3
}

fn default_batch_size() -> usize {
    20
}

fn default_detail_attempts() -> u32 {
    3
}

fn default_discovery_attempts() -> u32 {
    5
}

fn default_request_timeout() -> u64 {
    30
}

fn default_user_agents() -> Vec<String> {
    [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2.1 Safari/605.1.15",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_accept() -> String {
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"
        .to_string()
}

fn default_accept_language() -> String {
    "uk-UA,uk;q=0.9,en-US;q=0.8,en;q=0.7".to_string()
}

fn default_referer() -> String {
    "https://auto.ria.com/".to_string()
}
