use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::health::HealthState;
use crate::error::AppError;
use crate::store::DedupStore;
use crate::types::Category;

#[derive(Clone)]
pub struct ApiState {
    pub dedup: Arc<DedupStore>,
    pub health: Arc<HealthState>,
    pub brands_tracked: usize,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/stats/summary", get(get_stats_summary))
        .route("/listings/recent", get(get_recent_listings))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RecentListingsQuery {
    pub limit: Option<i64>,
    pub category: Option<String>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub polling: &'static str,
    pub persistence: String,
    pub last_cycle_failures: u64,
    pub items_seen: u64,
    pub brands_tracked: usize,
}

#[derive(Serialize)]
pub struct SummaryResponse {
    pub cycles_completed: u64,
    pub total_found: u64,
    pub total_notified: u64,
    pub last_cycle_at_ns: u64,
    pub buy_it_now_finds: Option<i64>,
    pub auction_finds: Option<i64>,
}

#[derive(Serialize)]
pub struct ListingResponse {
    pub listing_id: String,
    pub title: String,
    pub brand: Option<String>,
    pub price_usd: f64,
    pub url: String,
    pub image_url: Option<String>,
    pub category: String,
    pub score: Option<f64>,
    pub search_term: String,
    pub found_at: i64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let adapter = state.dedup.adapter();

    // Durable count when the store is reachable, in-process count otherwise.
    let items_seen = match adapter.seen_count().await {
        Ok(n) => n.max(0) as u64,
        Err(_) => state.dedup.in_process_len() as u64,
    };

    Json(HealthResponse {
        status: "healthy",
        polling: if state.health.polling_up() { "up" } else { "down" },
        persistence: adapter.state().to_string(),
        last_cycle_failures: state.health.last_cycle_failures(),
        items_seen,
        brands_tracked: state.brands_tracked,
    })
}

async fn get_stats_summary(State(state): State<ApiState>) -> Json<SummaryResponse> {
    let adapter = state.dedup.adapter();
    let buy_it_now_finds = adapter
        .finds_count_by_category(Category::InstantPurchase)
        .await
        .ok();
    let auction_finds = adapter.finds_count_by_category(Category::BidBased).await.ok();

    Json(SummaryResponse {
        cycles_completed: state.health.cycles_completed(),
        total_found: state.health.total_found(),
        total_notified: state.health.total_notified(),
        last_cycle_at_ns: state.health.last_cycle_at_ns(),
        buy_it_now_finds,
        auction_finds,
    })
}

async fn get_recent_listings(
    State(state): State<ApiState>,
    Query(params): Query<RecentListingsQuery>,
) -> Result<Json<Vec<ListingResponse>>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);

    let rows = state
        .dedup
        .adapter()
        .recent_finds(limit, params.category.as_deref())
        .await?;

    let listings = rows
        .into_iter()
        .map(|r| ListingResponse {
            listing_id: r.listing_id,
            title: r.title,
            brand: r.brand,
            price_usd: r.price_usd,
            url: r.url,
            image_url: r.image_url,
            category: r.category,
            score: r.score,
            search_term: r.search_term,
            found_at: r.found_at,
        })
        .collect();

    Ok(Json(listings))
}
