//! Category pollers. One instance per sale mechanism; both share the same
//! fetch/parse/filter pipeline and differ only in the server-side sale-type
//! query parameter and the category stamped on surviving records.

pub mod parse;

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::brands::BrandBook;
use crate::config::{Config, FETCH_MAX_PAGES, FETCH_PAGE_SIZE};
use crate::error::{AppError, Result};
use crate::poller::parse::{parse_entry, ParseContext, PollStats, Rejection};
use crate::types::{Category, Listing};

pub struct CategoryPoller {
    category: Category,
    client: reqwest::Client,
    ctx: ParseContext,
}

impl CategoryPoller {
    pub fn new(category: Category, client: reqwest::Client, cfg: &Config, brands: Arc<BrandBook>) -> Self {
        Self {
            category,
            client,
            ctx: ParseContext {
                base_url: cfg.marketplace_url.trim_end_matches('/').to_string(),
                min_price_usd: cfg.min_price_usd,
                max_price_usd: cfg.max_price_usd,
                jpy_per_usd: cfg.jpy_per_usd,
                brands,
            },
        }
    }

    /// Poll every term in order. A term's fetch failure is counted and skipped,
    /// never propagated — the remaining terms still run.
    pub async fn poll(&self, terms: &[String]) -> (Vec<Listing>, PollStats) {
        let mut listings = Vec::new();
        let mut stats = PollStats::default();
        for term in terms {
            let (mut found, term_stats) = self.poll_term(term).await;
            listings.append(&mut found);
            stats.merge(&term_stats);
        }
        info!(
            category = %self.category,
            accepted = stats.accepted,
            api_total = stats.api_total,
            failures = stats.term_failures,
            "Poll pass complete"
        );
        (listings, stats)
    }

    /// Fetch and parse all result pages for one search term.
    pub async fn poll_term(&self, term: &str) -> (Vec<Listing>, PollStats) {
        let mut listings = Vec::new();
        let mut stats = PollStats::default();

        for page in 1..=FETCH_MAX_PAGES {
            let items = match self.fetch_page(term, page).await {
                Ok(items) => items,
                Err(e) => {
                    warn!("Fetch failed for {:?} ({}, page {page}): {e}", term, self.category);
                    stats.term_failures += 1;
                    break;
                }
            };
            if items.is_empty() {
                break;
            }
            stats.api_total += items.len() as u64;

            for item in &items {
                match parse_entry(item, self.category, term, &self.ctx) {
                    Ok(listing) => {
                        stats.accepted += 1;
                        listings.push(listing);
                    }
                    Err(rejection) => {
                        stats.count_rejection(&rejection);
                        if let Rejection::Banned(kw) = rejection {
                            debug!("Banned keyword {kw:?} in entry for {term:?}");
                        }
                    }
                }
            }

            if items.len() < FETCH_PAGE_SIZE {
                break;
            }
        }

        (listings, stats)
    }

    async fn fetch_page(&self, term: &str, page: usize) -> Result<Vec<Value>> {
        // Server-side category and price band: cheaper and more accurate than
        // classifying client-side. Band limits are pushed in JPY.
        let min_jpy = (self.ctx.min_price_usd * self.ctx.jpy_per_usd).floor().max(1.0) as i64;
        let max_jpy = (self.ctx.max_price_usd * self.ctx.jpy_per_usd).ceil() as i64;
        let url = format!(
            "{}/search/json?query={}&sale={}&page={}&per_page={}&min_price={}&max_price={}&sort=new",
            self.ctx.base_url,
            encode_term(term),
            self.category.query_param(),
            page,
            FETCH_PAGE_SIZE,
            min_jpy,
            max_jpy,
        );

        let resp: Value = self.client.get(&url).send().await?.json().await?;
        match resp.as_array() {
            Some(items) => Ok(items.clone()),
            None => Err(AppError::Fetch(format!(
                "search response for {term:?} was not an array"
            ))),
        }
    }
}

fn encode_term(term: &str) -> String {
    term.trim().replace(' ', "+")
}
