use crate::error::{AppError, Result};

pub const MARKETPLACE_URL: &str = "https://auctions.yahoo.co.jp";
pub const WEBHOOK_URL: &str = "http://localhost:8002";

/// Durable store connection: attempts per budget, delay between attempts,
/// and the per-attempt timeout.
pub const STORE_CONNECT_ATTEMPTS: u32 = 3;
pub const STORE_CONNECT_DELAY_SECS: u64 = 5;
pub const STORE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Minimum gap between lazy reconnect probes while Degraded, so a dead store
/// cannot stall every operation in a cycle.
pub const STORE_RECONNECT_COOLDOWN_SECS: u64 = 30;

/// Per-request timeout for marketplace fetches and webhook delivery.
pub const HTTP_TIMEOUT_SECS: u64 = 10;

/// Webhook delivery retry budget and fixed backoff between attempts.
pub const DISPATCH_ATTEMPTS: u32 = 3;
pub const DISPATCH_BACKOFF_MS: u64 = 2_000;

/// Search result page size requested from the marketplace.
pub const FETCH_PAGE_SIZE: usize = 50;

/// Pages fetched per search term before moving on.
pub const FETCH_MAX_PAGES: usize = 3;

/// Titles containing any of these are dropped before any other filtering.
/// Knock-off brands and fast-fashion noise that pollute brand searches.
pub const BANNED_KEYWORDS: &[&str] = &[
    "de travail", "julius", "kmrii", "ifsixwasnine", "groundy", "fred perry",
    "tornado", "midas", "civarize", "l.g.b.", "yeezy", "yzy",
    "gap", "zara", "uniqlo", "ユニクロ", "ザラ", "ギャップ", "フレッドペリー",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub marketplace_url: String,
    pub webhook_url: String,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Ordered search terms polled each cycle (SEARCH_TERMS, comma-separated).
    pub search_terms: Vec<String>,
    /// Inclusive price band in normalized USD.
    pub min_price_usd: f64,
    pub max_price_usd: f64,
    /// Path to the brand table JSON (BRANDS_FILE).
    pub brands_file: String,
    /// Fixed sleep between cycles (POLL_INTERVAL_SECONDS).
    pub poll_interval_secs: u64,
    /// Exchange rate used to normalize marketplace JPY prices (JPY_PER_USD).
    pub jpy_per_usd: f64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let search_terms: Vec<String> = std::env::var("SEARCH_TERMS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if search_terms.is_empty() {
            return Err(AppError::Config(
                "SEARCH_TERMS must list at least one search term".to_string(),
            ));
        }

        let min_price_usd = std::env::var("MIN_PRICE_USD")
            .unwrap_or_else(|_| "0.50".to_string())
            .parse::<f64>()
            .map_err(|_| AppError::Config("MIN_PRICE_USD must be a number".to_string()))?;
        let max_price_usd = std::env::var("MAX_PRICE_USD")
            .unwrap_or_else(|_| "60".to_string())
            .parse::<f64>()
            .map_err(|_| AppError::Config("MAX_PRICE_USD must be a number".to_string()))?;
        if min_price_usd < 0.0 || max_price_usd <= min_price_usd {
            return Err(AppError::Config(format!(
                "invalid price band: min={min_price_usd} max={max_price_usd}"
            )));
        }

        let jpy_per_usd = std::env::var("JPY_PER_USD")
            .unwrap_or_else(|_| "147.0".to_string())
            .parse::<f64>()
            .map_err(|_| AppError::Config("JPY_PER_USD must be a number".to_string()))?;
        if jpy_per_usd <= 0.0 {
            return Err(AppError::Config("JPY_PER_USD must be positive".to_string()));
        }

        Ok(Self {
            marketplace_url: std::env::var("MARKETPLACE_URL")
                .unwrap_or_else(|_| MARKETPLACE_URL.to_string()),
            webhook_url: std::env::var("WEBHOOK_URL")
                .unwrap_or_else(|_| WEBHOOK_URL.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "sniper.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "8003".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            search_terms,
            min_price_usd,
            max_price_usd,
            brands_file: std::env::var("BRANDS_FILE")
                .unwrap_or_else(|_| "brands.json".to_string()),
            poll_interval_secs: std::env::var("POLL_INTERVAL_SECONDS")
                .unwrap_or_else(|_| "300".to_string())
                .parse::<u64>()
                .map_err(|_| {
                    AppError::Config(
                        "POLL_INTERVAL_SECONDS must be a whole number of seconds".to_string(),
                    )
                })?,
            jpy_per_usd,
        })
    }
}
