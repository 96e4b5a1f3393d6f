//! Webhook delivery to the presentation layer. At-least-once with a bounded
//! retry budget; exhausting the budget is logged and counted, never retried
//! later — deduplication is exact, delivery is best-effort.

use std::time::Duration;

use tracing::{info, warn};

use crate::config::{DISPATCH_ATTEMPTS, DISPATCH_BACKOFF_MS};
use crate::error::{AppError, Result};
use crate::types::{Listing, ListingPayload};

pub struct Dispatcher {
    client: reqwest::Client,
    endpoint: String,
}

impl Dispatcher {
    pub fn new(client: reqwest::Client, webhook_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/webhook/listing", webhook_url.trim_end_matches('/')),
        }
    }

    pub async fn dispatch(&self, listing: &Listing) -> Result<()> {
        let payload = ListingPayload::from_listing(listing);
        let mut last_failure = String::new();

        for attempt in 1..=DISPATCH_ATTEMPTS {
            match self.client.post(&self.endpoint).json(&payload).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!(
                        listing_id = %listing.id,
                        category = %listing.category,
                        "Dispatched {:?} (${:.2})",
                        truncate(&listing.title, 50),
                        listing.price_usd,
                    );
                    return Ok(());
                }
                Ok(resp) => {
                    last_failure = format!("status {}", resp.status());
                }
                Err(e) => {
                    last_failure = e.to_string();
                }
            }
            warn!(
                "Dispatch attempt {attempt}/{DISPATCH_ATTEMPTS} for {} failed: {last_failure}",
                listing.id
            );
            if attempt < DISPATCH_ATTEMPTS {
                tokio::time::sleep(Duration::from_millis(DISPATCH_BACKOFF_MS)).await;
            }
        }

        Err(AppError::Delivery {
            attempts: DISPATCH_ATTEMPTS,
            reason: last_failure,
        })
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
