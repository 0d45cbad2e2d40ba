use crate::error::Result;
use crate::run::{Item, Run};
use crate::snapshot::{ListingKey, Snapshot};
use async_trait::async_trait;
use uuid::Uuid;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Durable record store the engine reads and writes through. Row-level
/// atomicity is all the engine asks of it; aggregate consistency is
/// enforced by the orchestrator's single-writer path.
#[async_trait]
pub trait Store: Send + Sync {
    async fn save_run(&self, run: &Run) -> Result<()>;
    async fn save_item(&self, item: &Item) -> Result<()>;
    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()>;
    async fn load_run(&self, id: Uuid) -> Result<Option<Run>>;
    /// Items in creation order.
    async fn load_items(&self, run_id: Uuid) -> Result<Vec<Item>>;
    /// Most recent snapshot for a listing, by scrape time.
    async fn latest_snapshot(&self, key: &ListingKey) -> Result<Option<Snapshot>>;
}
