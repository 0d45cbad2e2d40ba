use crate::snapshot::Snapshot;
use serde::Serialize;

/// Change between two consecutive snapshots of the same listing.
/// Consumed by the alerting subsystem; nothing here decides whether a
/// change is alert-worthy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delta {
    /// Kopecks; None when either side has no final price.
    pub price_change: Option<i64>,
    /// None when the previous price is zero or missing. Never NaN or
    /// infinite.
    pub price_change_pct: Option<f64>,
    pub rating_change: Option<f64>,
    pub stock_changed: bool,
}

pub fn compute_delta(new: &Snapshot, previous: &Snapshot) -> Delta {
    let price_change = match (new.price_final, previous.price_final) {
        (Some(new_price), Some(prev_price)) => Some(new_price - prev_price),
        _ => None,
    };

    let price_change_pct = match (price_change, previous.price_final) {
        (Some(change), Some(prev_price)) if prev_price != 0 => {
            Some(change as f64 / prev_price as f64 * 100.0)
        }
        _ => None,
    };

    let rating_change = match (new.rating, previous.rating) {
        (Some(new_rating), Some(prev_rating)) => Some(new_rating - prev_rating),
        _ => None,
    };

    Delta {
        price_change,
        price_change_pct,
        rating_change,
        stock_changed: new.in_stock != previous.in_stock,
    }
}
