use crate::connector::Retailer;
use crate::error::ScrapeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Processing,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::CompletedWithErrors | RunStatus::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Processing => "processing",
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithErrors => "completed_with_errors",
            RunStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<RunStatus> {
        match s {
            "pending" => Some(RunStatus::Pending),
            "processing" => Some(RunStatus::Processing),
            "completed" => Some(RunStatus::Completed),
            "completed_with_errors" => Some(RunStatus::CompletedWithErrors),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Processing => "processing",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<ItemStatus> {
        match s {
            "pending" => Some(ItemStatus::Pending),
            "processing" => Some(ItemStatus::Processing),
            "completed" => Some(ItemStatus::Completed),
            "failed" => Some(ItemStatus::Failed),
            _ => None,
        }
    }
}

/// Whether a tracked URL is one of the organization's own listings or a
/// competitor's. Carried through retries so reporting stays grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    Own,
    Competitor,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Own => "own",
            ProductType::Competitor => "competitor",
        }
    }

    pub fn from_str(s: &str) -> Option<ProductType> {
        match s {
            "own" => Some(ProductType::Own),
            "competitor" => Some(ProductType::Competitor),
            _ => None,
        }
    }
}

/// One user-submitted batch of URLs, tracked as a single aggregate.
/// Aggregate counts are mutated only by the orchestrator's collector;
/// executors never touch a Run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub status: RunStatus,
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn new(total: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: RunStatus::Pending,
            total,
            completed: 0,
            failed: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn terminal_count(&self) -> u32 {
        self.completed + self.failed
    }

    /// Terminal status once every item is terminal: failed only if all
    /// items failed, completed only if all succeeded, mixed otherwise.
    pub fn terminal_status(&self) -> RunStatus {
        if self.failed == self.total {
            RunStatus::Failed
        } else if self.completed == self.total {
            RunStatus::Completed
        } else {
            RunStatus::CompletedWithErrors
        }
    }

    pub fn progress_percentage(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        ((self.terminal_count() as f64 / self.total as f64) * 100.0).round() as u32
    }
}

/// Last error recorded on a failed item: machine-readable kind plus a
/// human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemError {
    pub kind: String,
    pub message: String,
}

impl From<&ScrapeError> for ItemError {
    fn from(err: &ScrapeError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// One URL's scrape task within a Run. Status transitions are monotonic
/// (pending -> processing -> completed | failed); terminal items are
/// immutable and retried only by cloning into a new Run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub run_id: Uuid,
    pub url: String,
    pub retailer: Option<Retailer>,
    pub product_type: ProductType,
    pub status: ItemStatus,
    pub retry_count: u32,
    pub last_error: Option<ItemError>,
    pub snapshot_id: Option<Uuid>,
}

impl Item {
    pub fn new(run_id: Uuid, url: String, retailer: Retailer, product_type: ProductType) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            url,
            retailer: Some(retailer),
            product_type,
            status: ItemStatus::Pending,
            retry_count: 0,
            last_error: None,
            snapshot_id: None,
        }
    }
}

/// A URL rejected during run creation. Never becomes an item.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedUrl {
    /// 1-based position in the submitted list.
    pub line: usize,
    pub url: String,
    pub reason: String,
}

/// Result of submitting a URL list: the created run plus per-line
/// rejections for URLs that failed validation.
#[derive(Debug, Clone)]
pub struct CreatedRun {
    pub run: Run,
    pub rejected: Vec<RejectedUrl>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunProgress {
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub percentage: u32,
}

impl From<&Run> for RunProgress {
    fn from(run: &Run) -> Self {
        Self {
            total: run.total,
            completed: run.completed,
            failed: run.failed,
            percentage: run.progress_percentage(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemView {
    pub id: Uuid,
    pub url: String,
    pub retailer: Option<String>,
    pub status: ItemStatus,
    pub retry_count: u32,
    pub error: Option<ItemError>,
    pub snapshot_id: Option<Uuid>,
}

impl From<&Item> for ItemView {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id,
            url: item.url.clone(),
            retailer: item.retailer.map(|r| r.code().to_string()),
            status: item.status,
            retry_count: item.retry_count,
            error: item.last_error.clone(),
            snapshot_id: item.snapshot_id,
        }
    }
}

/// Point-in-time consistent view of a run, shaped for polling callers.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatusView {
    pub id: Uuid,
    pub status: RunStatus,
    pub progress: RunProgress,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub items: Vec<ItemView>,
}

impl RunStatusView {
    pub fn build(run: &Run, items: &[Item]) -> Self {
        Self {
            id: run.id,
            status: run.status,
            progress: RunProgress::from(run),
            created_at: run.created_at,
            started_at: run.started_at,
            finished_at: run.finished_at,
            items: items.iter().map(ItemView::from).collect(),
        }
    }
}
