//! Defensive parsing of raw marketplace search entries. Malformed entries are
//! dropped with a tallied rejection reason, never surfaced as errors.

use std::sync::Arc;

use serde_json::Value;

use crate::brands::{has_banned_keyword, BrandBook};
use crate::types::{Category, Listing};

pub struct ParseContext {
    pub base_url: String,
    pub min_price_usd: f64,
    pub max_price_usd: f64,
    pub jpy_per_usd: f64,
    pub brands: Arc<BrandBook>,
}

#[derive(Debug)]
pub enum Rejection {
    MissingField(&'static str),
    BadPrice,
    OutOfBand,
    Banned(&'static str),
}

#[derive(Debug, Default, Clone)]
pub struct PollStats {
    pub api_total: u64,
    pub accepted: u64,
    /// Per-term fetch failures (network error, bad response shape).
    pub term_failures: u64,
    pub rejected_missing: u64,
    pub rejected_bad_price: u64,
    pub rejected_out_of_band: u64,
    pub rejected_banned: u64,
}

impl PollStats {
    pub fn count_rejection(&mut self, r: &Rejection) {
        match r {
            Rejection::MissingField(_) => self.rejected_missing += 1,
            Rejection::BadPrice => self.rejected_bad_price += 1,
            Rejection::OutOfBand => self.rejected_out_of_band += 1,
            Rejection::Banned(_) => self.rejected_banned += 1,
        }
    }

    pub fn merge(&mut self, other: &PollStats) {
        self.api_total += other.api_total;
        self.accepted += other.accepted;
        self.term_failures += other.term_failures;
        self.rejected_missing += other.rejected_missing;
        self.rejected_bad_price += other.rejected_bad_price;
        self.rejected_out_of_band += other.rejected_out_of_band;
        self.rejected_banned += other.rejected_banned;
    }
}

/// Parse one raw search entry into a Listing tagged with `category`.
pub fn parse_entry(
    v: &Value,
    category: Category,
    search_term: &str,
    ctx: &ParseContext,
) -> std::result::Result<Listing, Rejection> {
    let title = v
        .get("title")
        .and_then(|t| t.as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(Rejection::MissingField("title"))?
        .to_string();

    if let Some(kw) = has_banned_keyword(&title) {
        return Err(Rejection::Banned(kw));
    }

    let url = v
        .get("url")
        .and_then(|u| u.as_str())
        .filter(|u| !u.is_empty())
        .ok_or(Rejection::MissingField("url"))?;
    let url = if url.starts_with("http") {
        url.to_string()
    } else {
        format!("{}{}", ctx.base_url, url)
    };

    let id = v
        .get("auction_id")
        .or_else(|| v.get("id"))
        .and_then(|i| i.as_str())
        .map(str::to_string)
        .or_else(|| extract_auction_id(&url))
        .ok_or(Rejection::MissingField("auction_id"))?;

    let price_jpy = parse_price_jpy(v.get("price")).ok_or(Rejection::BadPrice)?;
    let price_usd = price_jpy as f64 / ctx.jpy_per_usd;

    // Band is inclusive on both ends.
    if price_usd < ctx.min_price_usd || price_usd > ctx.max_price_usd {
        return Err(Rejection::OutOfBand);
    }

    let image_url = v
        .get("image_url")
        .or_else(|| v.get("image"))
        .and_then(|i| i.as_str())
        .map(|i| {
            if i.starts_with("//") {
                format!("https:{i}")
            } else {
                i.to_string()
            }
        });

    let end_time = match category {
        Category::BidBased => v
            .get("end_time")
            .and_then(|e| e.as_str())
            .map(str::to_string),
        Category::InstantPurchase => None,
    };

    let brand = ctx.brands.identify(&title).map(str::to_string);

    Ok(Listing {
        id,
        title,
        price_jpy,
        price_usd,
        url,
        image_url,
        end_time,
        brand,
        search_term: search_term.to_string(),
        category,
        score: None,
    })
}

/// Accepts an integer, a float, or a display string like "8,000円" / "¥8000".
pub fn parse_price_jpy(v: Option<&Value>) -> Option<i64> {
    let v = v?;
    if let Some(n) = v.as_i64() {
        return (n > 0).then_some(n);
    }
    if let Some(f) = v.as_f64() {
        return (f > 0.0).then_some(f.round() as i64);
    }
    let s = v.as_str()?;
    let cleaned: String = s.replace([',', '¥'], "").replace('円', "");
    let digits: String = cleaned
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let n = digits.parse::<i64>().ok()?;
    (n > 0).then_some(n)
}

/// Last path segment of the listing URL, stripped of query/fragment. Short or
/// non-slug segments are rejected rather than guessed at.
pub fn extract_auction_id(url: &str) -> Option<String> {
    let tail = url.rsplit('/').next()?;
    let tail = tail.split(['?', '#']).next()?;
    let valid = tail.len() > 5
        && tail
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    valid.then(|| tail.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TABLE: &str = r#"{
        "Balenciaga": { "variants": ["balenciaga"], "multiplier": 1.5 }
    }"#;

    fn ctx() -> ParseContext {
        ParseContext {
            base_url: "https://auctions.example.jp".to_string(),
            min_price_usd: 0.5,
            max_price_usd: 60.0,
            jpy_per_usd: 147.0,
            brands: Arc::new(BrandBook::from_json(TABLE).unwrap()),
        }
    }

    fn entry(price: Value) -> Value {
        json!({
            "auction_id": "x123456789",
            "title": "Balenciaga oversized tee",
            "price": price,
            "url": "/jp/auction/x123456789",
            "image": "//img.example.jp/x123456789.jpg"
        })
    }

    #[test]
    fn parses_complete_entry() {
        let listing =
            parse_entry(&entry(json!(8000)), Category::InstantPurchase, "balenciaga", &ctx())
                .unwrap();
        assert_eq!(listing.id, "x123456789");
        assert_eq!(listing.price_jpy, 8000);
        assert!((listing.price_usd - 8000.0 / 147.0).abs() < 1e-9);
        assert_eq!(listing.brand.as_deref(), Some("Balenciaga"));
        assert_eq!(listing.category, Category::InstantPurchase);
        assert_eq!(listing.url, "https://auctions.example.jp/jp/auction/x123456789");
        assert_eq!(
            listing.image_url.as_deref(),
            Some("https://img.example.jp/x123456789.jpg")
        );
        assert!(listing.end_time.is_none());
        assert!(listing.score.is_none());
    }

    #[test]
    fn price_band_is_inclusive() {
        let c = ctx();
        // Exactly min: 0.5 USD * 147 = 73.5 → 74 JPY rounds just above; use
        // rates that land exactly on the bounds instead.
        let at_max = entry(json!((60.0 * 147.0) as i64));
        assert!(parse_entry(&at_max, Category::InstantPurchase, "t", &c).is_ok());

        let above_max = entry(json!((60.0 * 147.0) as i64 + 2));
        assert!(matches!(
            parse_entry(&above_max, Category::InstantPurchase, "t", &c),
            Err(Rejection::OutOfBand)
        ));

        let below_min = entry(json!(50));
        assert!(matches!(
            parse_entry(&below_min, Category::InstantPurchase, "t", &c),
            Err(Rejection::OutOfBand)
        ));
    }

    #[test]
    fn malformed_entries_are_dropped_not_errors() {
        let c = ctx();
        let mut no_price = entry(json!(8000));
        no_price.as_object_mut().unwrap().remove("price");
        assert!(matches!(
            parse_entry(&no_price, Category::InstantPurchase, "t", &c),
            Err(Rejection::BadPrice)
        ));

        let bad_price = entry(json!("negotiable"));
        assert!(matches!(
            parse_entry(&bad_price, Category::InstantPurchase, "t", &c),
            Err(Rejection::BadPrice)
        ));

        let mut no_title = entry(json!(8000));
        no_title.as_object_mut().unwrap().remove("title");
        assert!(matches!(
            parse_entry(&no_title, Category::InstantPurchase, "t", &c),
            Err(Rejection::MissingField("title"))
        ));
    }

    #[test]
    fn banned_keyword_rejected_before_anything_else() {
        let mut e = entry(json!(8000));
        e["title"] = json!("UNIQLO x Balenciaga parody tee");
        assert!(matches!(
            parse_entry(&e, Category::InstantPurchase, "t", &ctx()),
            Err(Rejection::Banned("uniqlo"))
        ));
    }

    #[test]
    fn bid_based_entries_keep_end_time() {
        let mut e = entry(json!(8000));
        e["end_time"] = json!("2026-09-01T12:00:00Z");
        let listing = parse_entry(&e, Category::BidBased, "t", &ctx()).unwrap();
        assert_eq!(listing.end_time.as_deref(), Some("2026-09-01T12:00:00Z"));
        assert_eq!(listing.category, Category::BidBased);

        // The same raw field is ignored for instant-purchase records.
        let listing = parse_entry(&e, Category::InstantPurchase, "t", &ctx()).unwrap();
        assert!(listing.end_time.is_none());
    }

    #[test]
    fn price_string_forms_parse() {
        assert_eq!(parse_price_jpy(Some(&json!("8,000円"))), Some(8000));
        assert_eq!(parse_price_jpy(Some(&json!("¥12000"))), Some(12000));
        assert_eq!(parse_price_jpy(Some(&json!(5999.6))), Some(6000));
        assert_eq!(parse_price_jpy(Some(&json!("free"))), None);
        assert_eq!(parse_price_jpy(Some(&json!(0))), None);
        assert_eq!(parse_price_jpy(None), None);
    }

    #[test]
    fn auction_id_from_url_fallback() {
        assert_eq!(
            extract_auction_id("https://auctions.example.jp/jp/auction/q987654321?ref=s"),
            Some("q987654321".to_string())
        );
        assert_eq!(extract_auction_id("https://auctions.example.jp/jp/"), None);
    }
}
