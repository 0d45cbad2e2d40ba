use super::Store;
use crate::error::Result;
use crate::run::{Item, Run};
use crate::snapshot::{ListingKey, Snapshot};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory store. Backs tests and runs submitted without a database
/// path; everything is gone at process exit.
#[derive(Default)]
pub struct MemoryStore {
    runs: RwLock<HashMap<Uuid, Run>>,
    items: RwLock<Vec<Item>>,
    snapshots: RwLock<Vec<Snapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_run(&self, run: &Run) -> Result<()> {
        self.runs.write().await.insert(run.id, run.clone());
        Ok(())
    }

    async fn save_item(&self, item: &Item) -> Result<()> {
        let mut items = self.items.write().await;
        match items.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => *existing = item.clone(),
            None => items.push(item.clone()),
        }
        Ok(())
    }

    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.snapshots.write().await.push(snapshot.clone());
        Ok(())
    }

    async fn load_run(&self, id: Uuid) -> Result<Option<Run>> {
        Ok(self.runs.read().await.get(&id).cloned())
    }

    async fn load_items(&self, run_id: Uuid) -> Result<Vec<Item>> {
        Ok(self
            .items
            .read()
            .await
            .iter()
            .filter(|item| item.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn latest_snapshot(&self, key: &ListingKey) -> Result<Option<Snapshot>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots
            .iter()
            .rev()
            .find(|s| &s.listing_key == key)
            .cloned())
    }
}
