//! The correctness boundary for exactly-once notification.
//!
//! Durable seen_listings rows are the authority across restarts; a DashSet
//! populated since process start is the authority within the process. When the
//! durable store degrades, dedup keeps working on the set alone — exact for
//! this process lifetime, best-effort across restarts.

use std::sync::Arc;

use dashmap::DashSet;
use tracing::warn;

use crate::store::persistence::PersistenceAdapter;
use crate::types::{Category, Listing};

pub struct DedupStore {
    adapter: Arc<PersistenceAdapter>,
    /// Listing ids seen since process start. Checked first so a second
    /// sighting of the same id in this process can never dispatch, whatever
    /// the durable store is doing.
    seen: DashSet<String>,
}

impl DedupStore {
    pub fn new(adapter: Arc<PersistenceAdapter>) -> Self {
        Self {
            adapter,
            seen: DashSet::new(),
        }
    }

    pub fn adapter(&self) -> &PersistenceAdapter {
        &self.adapter
    }

    /// True if this id has not been notified before, consulting the in-process
    /// set first and the durable store when reachable. A store error counts as
    /// "not seen durably" — the in-process set still protects this lifetime.
    pub async fn is_new(&self, listing_id: &str) -> bool {
        if self.seen.contains(listing_id) {
            return false;
        }

        match self.adapter.has_seen(listing_id).await {
            Ok(true) => {
                // Cache the durable hit so later cycles skip the query.
                self.seen.insert(listing_id.to_string());
                false
            }
            Ok(false) => true,
            Err(e) => {
                warn!("Dedup falling back to in-process set: {e}");
                true
            }
        }
    }

    /// Mark an id notified. The in-process insert happens first and always
    /// succeeds; the durable write-through is best-effort and a failure is
    /// logged, never propagated to the caller.
    pub async fn mark_notified(&self, listing_id: &str, category: Category) {
        self.seen.insert(listing_id.to_string());
        if let Err(e) = self.adapter.record_seen(listing_id, category).await {
            warn!("Seen entry for {listing_id} not persisted ({e}) — in-process only");
        }
    }

    /// Persist the full find for the review API. Observational; failures are
    /// logged and dropped.
    pub async fn record_find(&self, listing: &Listing) {
        if let Err(e) = self.adapter.record_find(listing).await {
            warn!("Find for {} not persisted: {e}", listing.id);
        }
    }

    /// Ids known to this process lifetime.
    pub fn in_process_len(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::persistence::{fast_policy, temp_db_path};

    fn degraded_adapter() -> Arc<PersistenceAdapter> {
        // Never connected; every durable operation fails fast.
        Arc::new(PersistenceAdapter::new("/nonexistent-dir/sub/x.db", fast_policy()))
    }

    #[tokio::test]
    async fn second_sighting_is_not_new_after_mark() {
        let dedup = DedupStore::new(degraded_adapter());

        assert!(dedup.is_new("a1").await);
        dedup.mark_notified("a1", Category::InstantPurchase).await;
        assert!(!dedup.is_new("a1").await);
        // Repeated marks stay idempotent.
        dedup.mark_notified("a1", Category::InstantPurchase).await;
        assert!(!dedup.is_new("a1").await);
        assert_eq!(dedup.in_process_len(), 1);
    }

    #[tokio::test]
    async fn degraded_store_does_not_break_dedup() {
        let dedup = DedupStore::new(degraded_adapter());

        // mark_notified must not error even though every durable write fails.
        dedup.mark_notified("b1", Category::BidBased).await;
        dedup.mark_notified("b2", Category::BidBased).await;
        assert!(!dedup.is_new("b1").await);
        assert!(!dedup.is_new("b2").await);
        assert!(dedup.is_new("b3").await);
    }

    #[tokio::test]
    async fn durable_hits_survive_into_memory() {
        let adapter = Arc::new(PersistenceAdapter::new(&temp_db_path("dedup"), fast_policy()));
        adapter.connect().await.unwrap();

        // Simulate a previous process lifetime having notified c1.
        adapter.record_seen("c1", Category::InstantPurchase).await.unwrap();

        let dedup = DedupStore::new(Arc::clone(&adapter));
        assert!(!dedup.is_new("c1").await);
        // The durable hit is now cached in-process.
        assert_eq!(dedup.in_process_len(), 1);
        assert!(dedup.is_new("c2").await);
    }
}
