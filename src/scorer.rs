//! Deal scoring. Pure functions, no side effects: a listing's score is its
//! brand multiplier times a price-quality factor, so scores stay comparable
//! and sortable across both categories.

use crate::brands::BrandBook;
use crate::types::Listing;

/// Floor of the price-quality factor; keeps every score positive so brand
/// multipliers always order listings the same way.
const QUALITY_FLOOR: f64 = 0.1;

/// Monotonically decreasing over the configured band: 1.0 at min_price,
/// QUALITY_FLOOR at max_price, clamped outside it. Total for any finite price.
pub fn price_quality(price_usd: f64, min_price: f64, max_price: f64) -> f64 {
    if max_price <= min_price {
        return 1.0;
    }
    let t = (price_usd - min_price) / (max_price - min_price);
    (1.0 - (1.0 - QUALITY_FLOOR) * t).clamp(QUALITY_FLOOR, 1.0)
}

/// `brand_multiplier * price_quality`. A listing with no brand match scores
/// with multiplier 1.0.
pub fn score(listing: &Listing, brands: &BrandBook, min_price: f64, max_price: f64) -> f64 {
    brands.multiplier(listing.brand.as_deref()) * price_quality(listing.price_usd, min_price, max_price)
}
