use crate::delta::Delta;
use crate::snapshot::Snapshot;
use async_trait::async_trait;

/// Boundary to the alerting subsystem. Fired once per persisted
/// snapshot whose fingerprint differs from the previous one; the delta
/// is None for a listing's first snapshot.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn on_snapshot_persisted(&self, snapshot: &Snapshot, delta: Option<&Delta>);
}

/// Default sink: structured log lines. Real alert delivery lives in an
/// external subsystem.
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn on_snapshot_persisted(&self, snapshot: &Snapshot, delta: Option<&Delta>) {
        match delta {
            Some(delta) => log::info!(
                "Snapshot {}: price_change={:?} pct={:?} stock_changed={}",
                snapshot.listing_key,
                delta.price_change,
                delta.price_change_pct,
                delta.stock_changed,
            ),
            None => log::info!(
                "Snapshot {}: first observation, price_final={:?}",
                snapshot.listing_key,
                snapshot.price_final,
            ),
        }
    }
}
