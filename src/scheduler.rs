//! The sequential control loop: Idle → Polling(InstantPurchase) →
//! Polling(BidBased) → Sleeping → Idle, forever. One category at a time, in
//! priority order, so time-sensitive instant-purchase finds always reach the
//! dispatcher before bid-based ones. Crash-only: no step position survives a
//! restart — deduplication makes reprocessing harmless.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{error, info};

use crate::api::health::HealthState;
use crate::brands::BrandBook;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::poller::CategoryPoller;
use crate::scorer;
use crate::store::DedupStore;
use crate::types::CycleReport;

pub struct Scheduler {
    cfg: Config,
    /// In cycle priority order: instant-purchase first.
    pollers: Vec<CategoryPoller>,
    brands: Arc<BrandBook>,
    dedup: Arc<DedupStore>,
    dispatcher: Dispatcher,
    health: Arc<HealthState>,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        cfg: Config,
        pollers: Vec<CategoryPoller>,
        brands: Arc<BrandBook>,
        dedup: Arc<DedupStore>,
        dispatcher: Dispatcher,
        health: Arc<HealthState>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            cfg,
            pollers,
            brands,
            dedup,
            dispatcher,
            health,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        self.health.set_polling(true);
        let mut cycle_num = 0u64;

        loop {
            cycle_num += 1;
            let cycle_start = Instant::now();
            info!("Cycle #{cycle_num} starting ({} terms)", self.cfg.search_terms.len());

            let report = self.run_cycle().await;

            info!(
                cycle = cycle_num,
                found = report.found,
                notified = report.notified,
                fetch_failures = report.fetch_failures,
                dispatch_failures = report.dispatch_failures,
                "Cycle #{cycle_num} complete in {:.1}s",
                cycle_start.elapsed().as_secs_f64(),
            );
            self.health.record_cycle(&report);

            if self.shutdown_requested() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(self.cfg.poll_interval_secs)) => {}
                _ = self.shutdown.changed() => {
                    if self.shutdown_requested() {
                        break;
                    }
                }
            }
            if self.shutdown_requested() {
                break;
            }
        }

        self.health.set_polling(false);
        info!("Scheduler stopped");
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// One full pass across both categories. Any single term's fetch failure
    /// or any single dispatch failure is absorbed into the report; the step
    /// always completes for the remaining terms and records.
    async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        for poller in &self.pollers {
            if self.shutdown_requested() {
                return report;
            }

            let (listings, stats) = poller.poll(&self.cfg.search_terms).await;
            report.fetch_failures += stats.term_failures;

            for mut listing in listings {
                if self.shutdown_requested() {
                    return report;
                }

                listing.score = Some(scorer::score(
                    &listing,
                    &self.brands,
                    self.cfg.min_price_usd,
                    self.cfg.max_price_usd,
                ));

                if !self.dedup.is_new(&listing.id).await {
                    continue;
                }
                report.found += 1;

                // Dispatch before marking: a crash in between re-attempts
                // delivery on restart; the reverse order would lose it.
                match self.dispatcher.dispatch(&listing).await {
                    Ok(()) => report.notified += 1,
                    Err(e) => {
                        report.dispatch_failures += 1;
                        error!("Delivery gave up for {}: {e}", listing.id);
                    }
                }
                // Marked seen whether or not delivery succeeded — failed
                // deliveries are not re-notified (no retry storms).
                self.dedup.mark_notified(&listing.id, listing.category).await;
                self.dedup.record_find(&listing).await;
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::Mutex;

    use axum::extract::{Query, State};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use crate::brands::BrandBook;
    use crate::store::persistence::fast_policy;
    use crate::store::PersistenceAdapter;
    use crate::types::Category;

    const TABLE: &str = r#"{
        "Balenciaga": { "variants": ["balenciaga"], "multiplier": 1.5 }
    }"#;

    /// Webhook payloads captured in arrival order.
    #[derive(Clone, Default)]
    struct Received(Arc<Mutex<Vec<Value>>>);

    async fn search(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
        let page: usize = params
            .get("page")
            .and_then(|p| p.parse().ok())
            .unwrap_or(1);
        if page > 1 {
            return Json(json!([]));
        }
        // One stable listing per category, every request.
        let entry = match params.get("sale").map(String::as_str) {
            Some("buy_it_now") => json!({
                "auction_id": "b111111111",
                "title": "Balenciaga oversized tee",
                "price": 5000,
                "url": "/jp/auction/b111111111"
            }),
            _ => json!({
                "auction_id": "a222222222",
                "title": "Balenciaga campaign hoodie",
                "price": 6000,
                "url": "/jp/auction/a222222222",
                "end_time": "2026-09-01T12:00:00Z"
            }),
        };
        Json(json!([entry]))
    }

    async fn webhook(State(received): State<Received>, Json(body): Json<Value>) -> &'static str {
        received.0.lock().unwrap().push(body);
        "ok"
    }

    /// Stub marketplace and webhook on one ephemeral listener.
    async fn start_stub() -> (String, Received) {
        let received = Received::default();
        let app = Router::new()
            .route("/search/json", get(search))
            .route("/webhook/listing", post(webhook))
            .with_state(received.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), received)
    }

    fn scheduler_against(base: &str, shutdown: watch::Receiver<bool>) -> Scheduler {
        let cfg = Config {
            marketplace_url: base.to_string(),
            webhook_url: base.to_string(),
            log_level: "info".to_string(),
            db_path: "unused.db".to_string(),
            api_port: 0,
            search_terms: vec!["balenciaga".to_string()],
            min_price_usd: 0.5,
            max_price_usd: 60.0,
            brands_file: "unused.json".to_string(),
            poll_interval_secs: 300,
            jpy_per_usd: 147.0,
        };
        let brands = Arc::new(BrandBook::from_json(TABLE).unwrap());
        let client = reqwest::Client::new();
        let pollers: Vec<CategoryPoller> = Category::CYCLE_ORDER
            .iter()
            .map(|&cat| CategoryPoller::new(cat, client.clone(), &cfg, Arc::clone(&brands)))
            .collect();
        // Never connected: dedup runs on the in-process set alone.
        let adapter = Arc::new(PersistenceAdapter::new("/nonexistent-dir/sub/x.db", fast_policy()));
        let dedup = Arc::new(DedupStore::new(adapter));
        let dispatcher = Dispatcher::new(client, base);
        let health = Arc::new(HealthState::new());
        Scheduler::new(cfg, pollers, brands, dedup, dispatcher, health, shutdown)
    }

    #[tokio::test]
    async fn listings_dispatch_once_in_priority_order() {
        let (base, received) = start_stub().await;
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let sched = scheduler_against(&base, shutdown_rx);

        let first = sched.run_cycle().await;
        assert_eq!(first.found, 2);
        assert_eq!(first.notified, 2);
        assert_eq!(first.dispatch_failures, 0);
        {
            let posts = received.0.lock().unwrap();
            assert_eq!(posts.len(), 2);
            // Instant-purchase reaches the webhook before bid-based.
            assert_eq!(posts[0]["category"], "buy_it_now");
            assert_eq!(posts[0]["id"], "b111111111");
            assert_eq!(posts[1]["category"], "auction");
            assert_eq!(posts[1]["id"], "a222222222");
            assert!(posts[0]["score"].as_f64().unwrap() > 0.0);
        }

        // The marketplace keeps returning the same listings; a later cycle
        // must not dispatch them again.
        let second = sched.run_cycle().await;
        assert_eq!(second.found, 0);
        assert_eq!(second.notified, 0);
        assert_eq!(received.0.lock().unwrap().len(), 2);
    }
}
