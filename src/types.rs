use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// Sale mechanism of a marketplace listing. Assigned by the poller that
/// produced the record and immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    /// Fixed-price "buy it now" listings — immediately actionable.
    #[serde(rename = "buy_it_now")]
    InstantPurchase,
    /// Bid-based auction listings with an end time.
    #[serde(rename = "auction")]
    BidBased,
}

impl Category {
    /// Cycle order: instant-purchase listings are time-sensitive, so they are
    /// polled and dispatched before bid-based listings every cycle.
    pub const CYCLE_ORDER: [Category; 2] = [Category::InstantPurchase, Category::BidBased];

    /// Server-side sale-type query value for the marketplace search endpoint.
    pub fn query_param(self) -> &'static str {
        match self {
            Category::InstantPurchase => "buy_it_now",
            Category::BidBased => "auction",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Category::InstantPurchase => "buy_it_now",
            Category::BidBased => "auction",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// One observed marketplace item. Created by a category poller, enriched with
/// a score, then read-only through dedup and dispatch. Not retained past the
/// cycle — durability lives in the seen_listings table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    /// Marketplace-assigned auction id; the dedup key.
    pub id: String,
    pub title: String,
    /// Raw marketplace price in JPY.
    pub price_jpy: i64,
    /// Normalized price via the configured exchange rate.
    pub price_usd: f64,
    pub url: String,
    pub image_url: Option<String>,
    /// Present only for bid-based listings.
    pub end_time: Option<String>,
    /// Brand matched against the configured vocabulary; None if no variant hit.
    pub brand: Option<String>,
    /// The search term that surfaced this listing.
    pub search_term: String,
    pub category: Category,
    /// Assigned by the deal scorer; absent until scoring completes.
    pub score: Option<f64>,
}

// ---------------------------------------------------------------------------
// Webhook payload
// ---------------------------------------------------------------------------

/// Wire shape POSTed to the presentation layer's listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingPayload {
    pub id: String,
    pub title: String,
    pub price: f64,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub brand: Option<String>,
    pub category: Category,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

impl ListingPayload {
    pub fn from_listing(listing: &Listing) -> Self {
        Self {
            id: listing.id.clone(),
            title: listing.title.clone(),
            price: listing.price_usd,
            url: listing.url.clone(),
            image_url: listing.image_url.clone(),
            brand: listing.brand.clone(),
            category: listing.category,
            score: listing.score.unwrap_or(0.0),
            end_time: listing.end_time.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// Aggregated outcome of one full scheduler pass across both categories.
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleReport {
    pub found: u64,
    pub notified: u64,
    pub fetch_failures: u64,
    pub dispatch_failures: u64,
}

impl CycleReport {
    pub fn failures(&self) -> u64 {
        self.fetch_failures + self.dispatch_failures
    }
}
