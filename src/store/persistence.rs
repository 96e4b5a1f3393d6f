//! Owns the durable store connection. All durable reads/writes go through
//! this adapter; no other component holds a second connection.
//!
//! Connection failures are never fatal: after the retry budget is exhausted
//! the adapter reports Degraded and callers fall back to in-process state.
//! The next operation after the cooldown re-probes the store, so the process
//! self-heals without operator intervention.

use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::{
    STORE_CONNECT_ATTEMPTS, STORE_CONNECT_DELAY_SECS, STORE_CONNECT_TIMEOUT_SECS,
    STORE_RECONNECT_COOLDOWN_SECS,
};
use crate::error::{AppError, Result};
use crate::types::{Category, Listing};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Available,
    Degraded,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Available,
            2 => ConnectionState::Degraded,
            _ => ConnectionState::Connecting,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Available => "available",
            ConnectionState::Degraded => "degraded",
        };
        write!(f, "{s}")
    }
}

/// Connection retry knobs. Tests shrink these to keep runtimes sane.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
    pub timeout: Duration,
    pub reconnect_cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: STORE_CONNECT_ATTEMPTS,
            delay: Duration::from_secs(STORE_CONNECT_DELAY_SECS),
            timeout: Duration::from_secs(STORE_CONNECT_TIMEOUT_SECS),
            reconnect_cooldown: Duration::from_secs(STORE_RECONNECT_COOLDOWN_SECS),
        }
    }
}

/// Row returned by the recent-finds query, consumed by the read API.
#[derive(Debug, sqlx::FromRow)]
pub struct FindRow {
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

pub struct PersistenceAdapter {
    db_path: String,
    policy: RetryPolicy,
    pool: RwLock<Option<SqlitePool>>,
    state: AtomicU8,
    /// Last reconnect probe while Degraded, for cooldown enforcement.
    last_probe: Mutex<Option<Instant>>,
}

impl PersistenceAdapter {
    pub fn new(db_path: &str, policy: RetryPolicy) -> Self {
        Self {
            db_path: db_path.to_string(),
            policy,
            pool: RwLock::new(None),
            state: AtomicU8::new(0),
            last_probe: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn is_available(&self) -> bool {
        self.state() == ConnectionState::Available
    }

    fn set_state(&self, s: ConnectionState) {
        let v = match s {
            ConnectionState::Connecting => 0,
            ConnectionState::Available => 1,
            ConnectionState::Degraded => 2,
        };
        self.state.store(v, Ordering::Relaxed);
    }

    /// Establish the initial connection with the full retry budget.
    /// Exhaustion leaves the adapter Degraded; it never aborts the process.
    pub async fn connect(&self) -> Result<()> {
        self.set_state(ConnectionState::Connecting);

        for attempt in 1..=self.policy.attempts {
            info!(
                "Durable store connect attempt {attempt}/{} ({})",
                self.policy.attempts, self.db_path
            );
            match self.try_connect_once().await {
                Ok(pool) => {
                    *self.pool.write().await = Some(pool);
                    self.set_state(ConnectionState::Available);
                    info!("Durable store ready at {}", self.db_path);
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "Durable store connect attempt {attempt}/{} failed: {e}",
                        self.policy.attempts
                    );
                }
            }
            if attempt < self.policy.attempts {
                tokio::time::sleep(self.policy.delay).await;
            }
        }

        self.set_state(ConnectionState::Degraded);
        warn!("Durable store unreachable after {} attempts — continuing degraded", self.policy.attempts);
        Err(AppError::StoreUnavailable)
    }

    async fn try_connect_once(&self) -> Result<SqlitePool> {
        let connect = async {
            let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", self.db_path))?
                .create_if_missing(true);
            let pool = SqlitePoolOptions::new()
                .max_connections(4)
                .connect_with(opts)
                .await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            Ok::<SqlitePool, AppError>(pool)
        };
        tokio::time::timeout(self.policy.timeout, connect)
            .await
            .map_err(|_| {
                AppError::StoreConnect(format!("timed out after {:?}", self.policy.timeout))
            })?
    }

    /// Get the live pool, or lazily re-probe the store if Degraded and the
    /// cooldown has elapsed. A single bounded attempt per probe — the full
    /// budget only applies at startup, so a dead store cannot stall cycles.
    async fn acquire(&self) -> Result<SqlitePool> {
        if let Some(pool) = self.pool.read().await.as_ref() {
            return Ok(pool.clone());
        }

        {
            let mut last = self.last_probe.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(at) = *last {
                if at.elapsed() < self.policy.reconnect_cooldown {
                    return Err(AppError::StoreUnavailable);
                }
            }
            *last = Some(Instant::now());
        }

        info!("Durable store degraded — probing reconnect");
        match self.try_connect_once().await {
            Ok(pool) => {
                *self.pool.write().await = Some(pool.clone());
                self.set_state(ConnectionState::Available);
                info!("Durable store reconnected");
                Ok(pool)
            }
            Err(e) => {
                warn!("Durable store reconnect probe failed: {e}");
                self.set_state(ConnectionState::Degraded);
                Err(AppError::StoreUnavailable)
            }
        }
    }

    /// Drop the pool and flag Degraded after an operation-level failure so the
    /// next operation re-probes instead of hammering a broken connection.
    async fn note_failure(&self, ctx: &str, e: &sqlx::Error) {
        warn!("Durable store {ctx} failed: {e} — entering degraded mode");
        *self.pool.write().await = None;
        self.set_state(ConnectionState::Degraded);
    }

    /// Idempotent: inserting an id that already has a row is a no-op.
    pub async fn record_seen(&self, listing_id: &str, category: Category) -> Result<()> {
        let pool = self.acquire().await?;
        let now = now_ns() as i64;
        let res = sqlx::query(
            "INSERT OR IGNORE INTO seen_listings (listing_id, category, first_seen_at) VALUES (?, ?, ?)",
        )
        .bind(listing_id)
        .bind(category.to_string())
        .bind(now)
        .execute(&pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(e) => {
                self.note_failure("record_seen", &e).await;
                Err(e.into())
            }
        }
    }

    pub async fn has_seen(&self, listing_id: &str) -> Result<bool> {
        let pool = self.acquire().await?;
        let res = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM seen_listings WHERE listing_id = ?",
        )
        .bind(listing_id)
        .fetch_one(&pool)
        .await;

        match res {
            Ok(n) => Ok(n > 0),
            Err(e) => {
                self.note_failure("has_seen", &e).await;
                Err(e.into())
            }
        }
    }

    /// Observational record of a notified find. Not consulted for dedup.
    pub async fn record_find(&self, listing: &Listing) -> Result<()> {
        let pool = self.acquire().await?;
        let now = now_ns() as i64;
        let res = sqlx::query(
            r#"
            INSERT INTO finds (
                listing_id, title, brand, price_jpy, price_usd, url, image_url,
                category, score, search_term, end_time, found_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&listing.id)
        .bind(&listing.title)
        .bind(&listing.brand)
        .bind(listing.price_jpy)
        .bind(listing.price_usd)
        .bind(&listing.url)
        .bind(&listing.image_url)
        .bind(listing.category.to_string())
        .bind(listing.score)
        .bind(&listing.search_term)
        .bind(&listing.end_time)
        .bind(now)
        .execute(&pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(e) => {
                self.note_failure("record_find", &e).await;
                Err(e.into())
            }
        }
    }

    pub async fn seen_count(&self) -> Result<i64> {
        let pool = self.acquire().await?;
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM seen_listings")
            .fetch_one(&pool)
            .await?;
        Ok(n)
    }

    pub async fn finds_count_by_category(&self, category: Category) -> Result<i64> {
        let pool = self.acquire().await?;
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM finds WHERE category = ?")
            .bind(category.to_string())
            .fetch_one(&pool)
            .await?;
        Ok(n)
    }

    pub async fn recent_finds(&self, limit: i64, category: Option<&str>) -> Result<Vec<FindRow>> {
        let pool = self.acquire().await?;
        let rows = match category {
            Some(cat) => {
                sqlx::query_as::<_, FindRow>(
                    r#"
                    SELECT listing_id, title, brand, price_usd, url, image_url,
                           category, score, search_term, found_at
                    FROM finds
                    WHERE category = ?
                    ORDER BY found_at DESC
                    LIMIT ?
                    "#,
                )
                .bind(cat)
                .bind(limit)
                .fetch_all(&pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, FindRow>(
                    r#"
                    SELECT listing_id, title, brand, price_usd, url, image_url,
                           category, score, search_term, found_at
                    FROM finds
                    ORDER BY found_at DESC
                    LIMIT ?
                    "#,
                )
                .bind(limit)
                .fetch_all(&pool)
                .await?
            }
        };
        Ok(rows)
    }

    /// Generic KV for external collaborators layering user state on the same
    /// connection.
    pub async fn put_state(&self, key: &str, value: &str) -> Result<()> {
        let pool = self.acquire().await?;
        let now = now_ns() as i64;
        let res = sqlx::query(
            r#"
            INSERT INTO user_state (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(e) => {
                self.note_failure("put_state", &e).await;
                Err(e.into())
            }
        }
    }

    pub async fn get_state(&self, key: &str) -> Result<Option<String>> {
        let pool = self.acquire().await?;
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM user_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&pool)
            .await?;
        Ok(value)
    }
}

pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

#[cfg(test)]
pub(crate) fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        attempts: 2,
        delay: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
        reconnect_cooldown: Duration::from_millis(10),
    }
}

#[cfg(test)]
pub(crate) fn temp_db_path(tag: &str) -> String {
    let dir = std::env::temp_dir();
    format!("{}/lux-sniper-{tag}-{}.db", dir.display(), now_ns())
}
