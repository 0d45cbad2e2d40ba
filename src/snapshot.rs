use crate::alert::AlertSink;
use crate::connector::{self, RawFields, Retailer};
use crate::delta::{compute_delta, Delta};
use crate::error::Result;
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

/// Stable identity of "this product at this retailer". Snapshots for
/// one key form an append-only history ordered by scrape time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListingKey {
    pub retailer: Retailer,
    /// External product id when the URL shape carries one, otherwise
    /// the full URL.
    pub product_ref: String,
}

impl ListingKey {
    pub fn new(retailer: Retailer, product_ref: impl Into<String>) -> Self {
        Self {
            retailer,
            product_ref: product_ref.into(),
        }
    }
}

impl std::fmt::Display for ListingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.retailer.code(), self.product_ref)
    }
}

/// Normalized product state at one point in time. Immutable once
/// written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub listing_key: ListingKey,
    pub title: String,
    pub price_regular: Option<i64>,
    pub price_promo: Option<i64>,
    pub price_card: Option<i64>,
    pub price_final: Option<i64>,
    pub rating: Option<f64>,
    pub reviews_count: Option<i64>,
    pub in_stock: bool,
    pub scraped_at: DateTime<Utc>,
    pub fingerprint: String,
    /// True when this scrape returned exactly what the previous one did;
    /// recorded for history but excluded from alerting.
    pub unchanged: bool,
}

/// Content fingerprint over the economically meaningful fields. Title
/// and the raw price breakdown are deliberately excluded; a reworded
/// listing with the same final price is not a change worth alerting on.
pub fn fingerprint(
    price_final: Option<i64>,
    in_stock: bool,
    rating: Option<f64>,
    reviews_count: Option<i64>,
) -> String {
    let canonical = format!(
        "{}|{}|{}|{}",
        price_final.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
        in_stock,
        rating.map(|r| format!("{:.1}", r)).unwrap_or_else(|| "-".into()),
        reviews_count.map(|c| c.to_string()).unwrap_or_else(|| "-".into()),
    );
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Persists normalized snapshots and suppresses alert noise from
/// re-scrapes that returned identical data.
pub struct SnapshotStore {
    store: Arc<dyn Store>,
    alerts: Arc<dyn AlertSink>,
}

impl SnapshotStore {
    pub fn new(store: Arc<dyn Store>, alerts: Arc<dyn AlertSink>) -> Self {
        Self { store, alerts }
    }

    /// Normalize, fingerprint and append a snapshot for the listing.
    /// An unchanged fingerprint still appends a row (the history must
    /// show every scrape) but skips alert evaluation.
    pub async fn persist(&self, key: ListingKey, raw: RawFields) -> Result<(Snapshot, Option<Delta>)> {
        let fields = connector::normalize(raw);
        let previous = self.store.latest_snapshot(&key).await?;

        let fingerprint = fingerprint(
            fields.price_final,
            fields.in_stock,
            fields.rating,
            fields.reviews_count,
        );
        let unchanged = previous
            .as_ref()
            .map(|p| p.fingerprint == fingerprint)
            .unwrap_or(false);

        let snapshot = Snapshot {
            id: Uuid::new_v4(),
            listing_key: key,
            title: fields.title,
            price_regular: fields.price_regular,
            price_promo: fields.price_promo,
            price_card: fields.price_card,
            price_final: fields.price_final,
            rating: fields.rating,
            reviews_count: fields.reviews_count,
            in_stock: fields.in_stock,
            scraped_at: Utc::now(),
            fingerprint,
            unchanged,
        };
        self.store.save_snapshot(&snapshot).await?;

        let delta = match (&previous, unchanged) {
            (Some(prev), false) => Some(compute_delta(&snapshot, prev)),
            _ => None,
        };
        if !unchanged {
            self.alerts.on_snapshot_persisted(&snapshot, delta.as_ref()).await;
        }

        Ok((snapshot, delta))
    }
}
