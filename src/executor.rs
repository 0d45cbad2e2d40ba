use crate::connector::ConnectorRegistry;
use crate::error::ScrapeError;
use crate::limiter::RateLimiter;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::run::{Item, ItemError, ItemStatus};
use crate::snapshot::{ListingKey, Snapshot, SnapshotStore};
use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;

/// What happened to one execution attempt. Retries carry the backoff
/// delay so the orchestrator can park the item off-worker.
#[derive(Debug)]
pub enum ItemOutcome {
    Completed { unchanged: bool },
    Retry { delay: Duration },
    Failed,
}

/// Executes one item end-to-end: resolve connector, take a rate-limit
/// slot, fetch, persist the snapshot. Every failure is mapped through
/// the retry policy into an item decision; item state is the only
/// write here, run aggregates belong to the orchestrator.
pub struct JobExecutor {
    registry: Arc<ConnectorRegistry>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    snapshots: SnapshotStore,
    store: Arc<dyn Store>,
    acquire_timeout: Duration,
}

impl JobExecutor {
    pub fn new(
        registry: Arc<ConnectorRegistry>,
        limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
        snapshots: SnapshotStore,
        store: Arc<dyn Store>,
        acquire_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            limiter,
            policy,
            snapshots,
            store,
            acquire_timeout,
        }
    }

    pub async fn execute(&self, item: &mut Item) -> ItemOutcome {
        item.status = ItemStatus::Processing;
        self.persist_item(item).await;

        let attempt = item.retry_count + 1;
        match self.attempt(item).await {
            Ok(snapshot) => {
                item.status = ItemStatus::Completed;
                item.snapshot_id = Some(snapshot.id);
                item.last_error = None;
                self.persist_item(item).await;
                log::info!(
                    "Item {} completed: {} price_final={:?}{}",
                    item.id,
                    snapshot.listing_key,
                    snapshot.price_final,
                    if snapshot.unchanged { " (unchanged)" } else { "" },
                );
                ItemOutcome::Completed {
                    unchanged: snapshot.unchanged,
                }
            }
            Err(error) => {
                item.last_error = Some(ItemError::from(&error));
                match self.policy.decide(error, attempt) {
                    RetryDecision::Retry { delay } => {
                        item.retry_count += 1;
                        self.persist_item(item).await;
                        log::warn!(
                            "Item {} attempt {} failed, retrying in {:?}: {}",
                            item.id,
                            attempt,
                            delay,
                            item.last_error.as_ref().map(|e| e.message.as_str()).unwrap_or(""),
                        );
                        ItemOutcome::Retry { delay }
                    }
                    RetryDecision::Fail(final_error) => {
                        item.status = ItemStatus::Failed;
                        item.last_error = Some(ItemError::from(&final_error));
                        self.persist_item(item).await;
                        log::error!("Item {} failed: {}", item.id, final_error);
                        ItemOutcome::Failed
                    }
                }
            }
        }
    }

    async fn attempt(&self, item: &Item) -> Result<Snapshot, ScrapeError> {
        let connector = self
            .registry
            .resolve(&item.url)
            .ok_or_else(|| ScrapeError::UnsupportedRetailer(item.url.clone()))?;
        let retailer = connector.retailer();

        if !self.limiter.acquire(retailer, self.acquire_timeout).await {
            return Err(ScrapeError::RateLimitTimeout {
                retailer: retailer.code().to_string(),
                waited_ms: self.acquire_timeout.as_millis() as u64,
            });
        }

        let raw = connector.fetch(&item.url).await?;

        let product_ref = connector
            .product_id(&item.url)
            .unwrap_or_else(|| item.url.clone());
        let (snapshot, _delta) = self
            .snapshots
            .persist(ListingKey::new(retailer, product_ref), raw)
            .await
            .map_err(|e| ScrapeError::Storage(e.to_string()))?;
        Ok(snapshot)
    }

    /// Item persistence failures must not abort the attempt; the
    /// in-memory state still reaches the collector through the outcome.
    async fn persist_item(&self, item: &Item) {
        if let Err(e) = self.store.save_item(item).await {
            log::error!("Failed to persist item {}: {}", item.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertSink, LogAlertSink};
    use crate::config::{BucketConfig, RateLimitConfig, RetryConfig};
    use crate::connector::{Connector, RawFields, Retailer};
    use crate::run::{ProductType, Run};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Connector that fails a configured number of times before
    /// producing a fixed product.
    struct FlakyConnector {
        failures_before_success: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Connector for FlakyConnector {
        fn retailer(&self) -> Retailer {
            Retailer::Ozon
        }

        fn matches(&self, url: &str) -> bool {
            url.contains("flaky.example")
        }

        fn product_id(&self, _url: &str) -> Option<String> {
            Some("42".into())
        }

        async fn fetch(&self, url: &str) -> Result<RawFields, ScrapeError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(ScrapeError::Network(format!("{}: connection timed out", url)))
            } else {
                Ok(RawFields {
                    title: "Widget".into(),
                    price_current: Some(9_900),
                    in_stock: true,
                    ..Default::default()
                })
            }
        }
    }

    fn executor_with(connector: FlakyConnector) -> (JobExecutor, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(ConnectorRegistry::new(vec![Arc::new(connector)]));
        let limiter = Arc::new(RateLimiter::from_config(&RateLimitConfig {
            default: BucketConfig {
                capacity: 100,
                refill_ms: 1,
            },
            per_retailer: HashMap::new(),
        }));
        let sink: Arc<dyn AlertSink> = Arc::new(LogAlertSink);
        let snapshots = SnapshotStore::new(store.clone(), sink);
        let executor = JobExecutor::new(
            registry,
            limiter,
            RetryPolicy::from_config(&RetryConfig::default()),
            snapshots,
            store.clone(),
            Duration::from_millis(100),
        );
        (executor, store)
    }

    fn item(run: &Run, url: &str) -> Item {
        Item::new(run.id, url.into(), Retailer::Ozon, ProductType::Own)
    }

    #[tokio::test]
    async fn success_writes_exactly_one_snapshot() {
        let (executor, store) = executor_with(FlakyConnector {
            failures_before_success: 0,
            calls: AtomicUsize::new(0),
        });
        let run = Run::new(1);
        let mut item = item(&run, "https://flaky.example/p/42");

        let outcome = executor.execute(&mut item).await;
        assert!(matches!(outcome, ItemOutcome::Completed { unchanged: false }));
        assert_eq!(item.status, ItemStatus::Completed);
        assert!(item.snapshot_id.is_some());

        let key = ListingKey::new(Retailer::Ozon, "42");
        assert!(store.latest_snapshot(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn transient_failure_requests_backoff() {
        let (executor, _store) = executor_with(FlakyConnector {
            failures_before_success: 1,
            calls: AtomicUsize::new(0),
        });
        let run = Run::new(1);
        let mut item = item(&run, "https://flaky.example/p/42");

        let outcome = executor.execute(&mut item).await;
        match outcome {
            ItemOutcome::Retry { delay } => assert_eq!(delay, Duration::from_secs(2)),
            other => panic!("expected retry, got {:?}", other),
        }
        assert_eq!(item.status, ItemStatus::Processing);
        assert_eq!(item.retry_count, 1);
        assert_eq!(item.last_error.as_ref().unwrap().kind, "network_error");

        // Second attempt succeeds.
        let outcome = executor.execute(&mut item).await;
        assert!(matches!(outcome, ItemOutcome::Completed { .. }));
        assert_eq!(item.retry_count, 1);
    }

    #[tokio::test]
    async fn budget_exhaustion_fails_terminally() {
        let (executor, _store) = executor_with(FlakyConnector {
            failures_before_success: usize::MAX,
            calls: AtomicUsize::new(0),
        });
        let run = Run::new(1);
        let mut item = item(&run, "https://flaky.example/p/42");

        let mut outcome = executor.execute(&mut item).await;
        for _ in 0..2 {
            match outcome {
                ItemOutcome::Retry { .. } => outcome = executor.execute(&mut item).await,
                other => panic!("expected retry, got {:?}", other),
            }
        }
        assert!(matches!(outcome, ItemOutcome::Failed));
        assert_eq!(item.status, ItemStatus::Failed);
        assert_eq!(
            item.last_error.as_ref().unwrap().kind,
            "retry_budget_exhausted"
        );
    }

    #[tokio::test]
    async fn unsupported_url_fails_without_retry() {
        let (executor, _store) = executor_with(FlakyConnector {
            failures_before_success: 0,
            calls: AtomicUsize::new(0),
        });
        let run = Run::new(1);
        let mut item = item(&run, "https://unsupported.example/x");

        let outcome = executor.execute(&mut item).await;
        assert!(matches!(outcome, ItemOutcome::Failed));
        assert_eq!(item.retry_count, 0);
        assert_eq!(
            item.last_error.as_ref().unwrap().kind,
            "unsupported_retailer"
        );
    }
}
