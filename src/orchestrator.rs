use crate::alert::AlertSink;
use crate::config::EngineConfig;
use crate::connector::ConnectorRegistry;
use crate::error::{Error, Result};
use crate::executor::{ItemOutcome, JobExecutor};
use crate::limiter::RateLimiter;
use crate::retry::RetryPolicy;
use crate::run::{
    CreatedRun, Item, ItemStatus, ProductType, RejectedUrl, Run, RunProgress, RunStatus,
    RunStatusView,
};
use crate::snapshot::SnapshotStore;
use crate::store::Store;
use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub product_type: ProductType,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            product_type: ProductType::Competitor,
        }
    }
}

enum ItemEvent {
    Started,
    Terminal(Item),
}

/// Owns the Run aggregate: fans a URL list out into items, schedules
/// them onto a bounded worker pool and folds completions back into the
/// aggregate. The collector loop inside [`execute_run`] is the only
/// writer of run counts.
pub struct RunOrchestrator {
    store: Arc<dyn Store>,
    registry: Arc<ConnectorRegistry>,
    executor: Arc<JobExecutor>,
    max_urls_per_run: usize,
    concurrency: usize,
    progress_tx: watch::Sender<RunProgress>,
}

impl RunOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<ConnectorRegistry>,
        executor: Arc<JobExecutor>,
        config: &EngineConfig,
    ) -> Self {
        let (progress_tx, _) = watch::channel(RunProgress::default());
        Self {
            store,
            registry,
            executor,
            max_urls_per_run: config.max_urls_per_run as usize,
            concurrency: config.concurrency.max(1) as usize,
            progress_tx,
        }
    }

    /// Wire up the whole engine from config: limiter, retry policy,
    /// snapshot store and executor, sharing one store and registry.
    pub fn assemble(
        config: &EngineConfig,
        store: Arc<dyn Store>,
        registry: Arc<ConnectorRegistry>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limits));
        let snapshots = SnapshotStore::new(store.clone(), alerts);
        let executor = Arc::new(JobExecutor::new(
            registry.clone(),
            limiter,
            RetryPolicy::from_config(&config.retry),
            snapshots,
            store.clone(),
            Duration::from_secs(config.limiter_acquire_timeout_secs),
        ));
        Self::new(store, registry, executor, config)
    }

    /// Read-side progress channel for polling UIs and progress bars.
    pub fn watch_progress(&self) -> watch::Receiver<RunProgress> {
        self.progress_tx.subscribe()
    }

    /// Validate a URL list and create a run. URLs that fail shape
    /// validation or match no connector are rejected up front and never
    /// become items.
    pub async fn create_run(&self, urls: &[String], options: &RunOptions) -> Result<CreatedRun> {
        let submissions = urls
            .iter()
            .map(|url| (url.clone(), options.product_type))
            .collect();
        self.create_run_from(submissions).await
    }

    async fn create_run_from(&self, submissions: Vec<(String, ProductType)>) -> Result<CreatedRun> {
        if submissions.is_empty() {
            return Err(Error::Config("at least one URL is required".into()));
        }
        if submissions.len() > self.max_urls_per_run {
            return Err(Error::Config(format!(
                "at most {} URLs per run (got {})",
                self.max_urls_per_run,
                submissions.len()
            )));
        }

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for (index, (raw_url, product_type)) in submissions.into_iter().enumerate() {
            let line = index + 1;
            let url = raw_url.trim().to_string();

            match url::Url::parse(&url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                _ => {
                    rejected.push(RejectedUrl {
                        line,
                        url,
                        reason: "invalid URL".into(),
                    });
                    continue;
                }
            }

            match self.registry.detect(&url) {
                Some(retailer) => accepted.push((url, retailer, product_type)),
                None => rejected.push(RejectedUrl {
                    line,
                    url,
                    reason: "unsupported retailer".into(),
                }),
            }
        }

        let mut run = Run::new(accepted.len() as u32);
        if accepted.is_empty() {
            // Nothing survived validation; the run is born terminal.
            run.status = RunStatus::Failed;
            run.finished_at = Some(Utc::now());
        }
        self.store.save_run(&run).await?;

        for (url, retailer, product_type) in accepted {
            let item = Item::new(run.id, url, retailer, product_type);
            self.store.save_item(&item).await?;
        }

        log::info!(
            "Run {} created: {} items, {} rejected",
            run.id,
            run.total,
            rejected.len()
        );
        Ok(CreatedRun { run, rejected })
    }

    /// Consistent point-in-time view: the aggregate plus every item row.
    pub async fn get_run(&self, id: Uuid) -> Result<RunStatusView> {
        let run = self.store.load_run(id).await?.ok_or(Error::RunNotFound(id))?;
        let items = self.store.load_items(id).await?;
        Ok(RunStatusView::build(&run, &items))
    }

    /// Clone every failed item of a run into a brand-new run, submitted
    /// through the normal creation path so validation and dispatch are
    /// identical to a fresh submission.
    pub async fn retry_failed(&self, run_id: Uuid) -> Result<CreatedRun> {
        self.store
            .load_run(run_id)
            .await?
            .ok_or(Error::RunNotFound(run_id))?;
        let items = self.store.load_items(run_id).await?;

        let failed: Vec<(String, ProductType)> = items
            .iter()
            .filter(|item| item.status == ItemStatus::Failed)
            .map(|item| (item.url.clone(), item.product_type))
            .collect();
        if failed.is_empty() {
            return Err(Error::NothingToRetry(run_id));
        }

        log::info!("Retrying {} failed items from run {}", failed.len(), run_id);
        self.create_run_from(failed).await
    }

    /// Drive a run to its terminal state. Items flow through a bounded
    /// worker pool; retries are parked on sleeping tasks instead of
    /// occupying workers; the collector below is the single writer of
    /// aggregate counts.
    pub async fn execute_run(&self, run_id: Uuid) -> Result<Run> {
        let mut run = self
            .store
            .load_run(run_id)
            .await?
            .ok_or(Error::RunNotFound(run_id))?;
        if run.status.is_terminal() {
            return Ok(run);
        }

        let pending: Vec<Item> = self
            .store
            .load_items(run_id)
            .await?
            .into_iter()
            .filter(|item| !item.status.is_terminal())
            .collect();

        if pending.is_empty() {
            run.status = run.terminal_status();
            run.finished_at = Some(Utc::now());
            self.store.save_run(&run).await?;
            self.publish_progress(&run);
            return Ok(run);
        }

        // Buffer sized to the whole run so re-enqueued retries can never
        // deadlock against full channels.
        let (work_tx, work_rx) = mpsc::channel::<Item>(run.total.max(1) as usize);
        let (event_tx, mut event_rx) = mpsc::channel::<ItemEvent>(run.total.max(1) as usize);

        for item in pending {
            work_tx
                .send(item)
                .await
                .map_err(|_| Error::Internal("work queue closed before dispatch".into()))?;
        }

        let executor = self.executor.clone();
        let retry_tx = work_tx.clone();
        drop(work_tx);
        let worker_events = event_tx.clone();
        drop(event_tx);
        let concurrency = self.concurrency;

        let workers = tokio::spawn(async move {
            ReceiverStream::new(work_rx)
                .for_each_concurrent(concurrency, |mut item| {
                    let executor = executor.clone();
                    let events = worker_events.clone();
                    let retry_tx = retry_tx.clone();
                    async move {
                        let _ = events.send(ItemEvent::Started).await;
                        match executor.execute(&mut item).await {
                            ItemOutcome::Retry { delay } => {
                                // Park the item; the worker slot frees up
                                // for the rest of the run.
                                tokio::spawn(async move {
                                    tokio::time::sleep(delay).await;
                                    let _ = retry_tx.send(item).await;
                                });
                            }
                            ItemOutcome::Completed { .. } | ItemOutcome::Failed => {
                                let _ = events.send(ItemEvent::Terminal(item)).await;
                            }
                        }
                    }
                })
                .await;
        });

        let result = self.collect(&mut run, &mut event_rx).await;
        workers.abort();
        result?;
        Ok(run)
    }

    async fn collect(
        &self,
        run: &mut Run,
        events: &mut mpsc::Receiver<ItemEvent>,
    ) -> Result<()> {
        while let Some(event) = events.recv().await {
            match event {
                ItemEvent::Started => {
                    if run.status == RunStatus::Pending {
                        run.status = RunStatus::Processing;
                        run.started_at = Some(Utc::now());
                        self.store.save_run(run).await?;
                        self.publish_progress(run);
                    }
                }
                ItemEvent::Terminal(item) => {
                    match item.status {
                        ItemStatus::Completed => run.completed += 1,
                        ItemStatus::Failed => run.failed += 1,
                        other => {
                            log::error!("Item {} reported non-terminal status {:?}", item.id, other);
                            continue;
                        }
                    }
                    if run.terminal_count() >= run.total {
                        run.status = run.terminal_status();
                        run.finished_at = Some(Utc::now());
                        self.store.save_run(run).await?;
                        self.publish_progress(run);
                        log::info!(
                            "Run {} finished: {} ({}/{} completed, {} failed)",
                            run.id,
                            run.status.as_str(),
                            run.completed,
                            run.total,
                            run.failed
                        );
                        return Ok(());
                    }
                    self.store.save_run(run).await?;
                    self.publish_progress(run);
                }
            }
        }
        Err(Error::Internal("worker pool stopped before the run finished".into()))
    }

    fn publish_progress(&self, run: &Run) {
        let _ = self.progress_tx.send(RunProgress::from(run));
    }
}
