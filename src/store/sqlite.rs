use super::Store;
use crate::connector::Retailer;
use crate::error::{Error, Result};
use crate::run::{Item, ItemError, ItemStatus, ProductType, Run, RunStatus};
use crate::snapshot::{ListingKey, Snapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::Path;
use uuid::Uuid;

/// SQLite-backed store. Upserts keep rowids stable so item ordering
/// survives status updates.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn_str = format!("sqlite:{}?mode=rwc", path.as_ref().display());
        let pool = SqlitePool::connect(&conn_str).await.map_err(Error::Database)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                total INTEGER NOT NULL,
                completed INTEGER NOT NULL,
                failed INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                started_at TEXT,
                finished_at TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                url TEXT NOT NULL,
                retailer TEXT,
                product_type TEXT NOT NULL,
                status TEXT NOT NULL,
                retry_count INTEGER NOT NULL,
                error_kind TEXT,
                error_message TEXT,
                snapshot_id TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS snapshots (
                id TEXT PRIMARY KEY,
                retailer TEXT NOT NULL,
                product_ref TEXT NOT NULL,
                title TEXT NOT NULL,
                price_regular INTEGER,
                price_promo INTEGER,
                price_card INTEGER,
                price_final INTEGER,
                rating REAL,
                reviews_count INTEGER,
                in_stock INTEGER NOT NULL,
                scraped_at TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                unchanged INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_items_run ON items (run_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_snapshots_listing
             ON snapshots (retailer, product_ref, scraped_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::Internal(format!("bad uuid {}: {}", raw, e)))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("bad timestamp {}: {}", raw, e)))
}

fn run_from_row(row: &SqliteRow) -> Result<Run> {
    let status_raw: String = row.try_get("status")?;
    let started_at: Option<String> = row.try_get("started_at")?;
    let finished_at: Option<String> = row.try_get("finished_at")?;
    Ok(Run {
        id: parse_uuid(row.try_get("id")?)?,
        status: RunStatus::from_str(&status_raw)
            .ok_or_else(|| Error::Internal(format!("bad run status {}", status_raw)))?,
        total: row.try_get::<i64, _>("total")? as u32,
        completed: row.try_get::<i64, _>("completed")? as u32,
        failed: row.try_get::<i64, _>("failed")? as u32,
        created_at: parse_timestamp(row.try_get("created_at")?)?,
        started_at: started_at.as_deref().map(parse_timestamp).transpose()?,
        finished_at: finished_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

fn item_from_row(row: &SqliteRow) -> Result<Item> {
    let status_raw: String = row.try_get("status")?;
    let product_type_raw: String = row.try_get("product_type")?;
    let retailer: Option<String> = row.try_get("retailer")?;
    let error_kind: Option<String> = row.try_get("error_kind")?;
    let error_message: Option<String> = row.try_get("error_message")?;
    let snapshot_id: Option<String> = row.try_get("snapshot_id")?;
    Ok(Item {
        id: parse_uuid(row.try_get("id")?)?,
        run_id: parse_uuid(row.try_get("run_id")?)?,
        url: row.try_get("url")?,
        retailer: retailer.as_deref().and_then(Retailer::from_code),
        product_type: ProductType::from_str(&product_type_raw)
            .ok_or_else(|| Error::Internal(format!("bad product type {}", product_type_raw)))?,
        status: ItemStatus::from_str(&status_raw)
            .ok_or_else(|| Error::Internal(format!("bad item status {}", status_raw)))?,
        retry_count: row.try_get::<i64, _>("retry_count")? as u32,
        last_error: match (error_kind, error_message) {
            (Some(kind), Some(message)) => Some(ItemError { kind, message }),
            _ => None,
        },
        snapshot_id: snapshot_id.as_deref().map(parse_uuid).transpose()?,
    })
}

fn snapshot_from_row(row: &SqliteRow) -> Result<Snapshot> {
    let retailer_raw: String = row.try_get("retailer")?;
    let retailer = Retailer::from_code(&retailer_raw)
        .ok_or_else(|| Error::Internal(format!("bad retailer {}", retailer_raw)))?;
    Ok(Snapshot {
        id: parse_uuid(row.try_get("id")?)?,
        listing_key: ListingKey::new(retailer, row.try_get::<String, _>("product_ref")?),
        title: row.try_get("title")?,
        price_regular: row.try_get("price_regular")?,
        price_promo: row.try_get("price_promo")?,
        price_card: row.try_get("price_card")?,
        price_final: row.try_get("price_final")?,
        rating: row.try_get("rating")?,
        reviews_count: row.try_get("reviews_count")?,
        in_stock: row.try_get::<i64, _>("in_stock")? != 0,
        scraped_at: parse_timestamp(row.try_get("scraped_at")?)?,
        fingerprint: row.try_get("fingerprint")?,
        unchanged: row.try_get::<i64, _>("unchanged")? != 0,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn save_run(&self, run: &Run) -> Result<()> {
        sqlx::query(
            "INSERT INTO runs (id, status, total, completed, failed, created_at, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 completed = excluded.completed,
                 failed = excluded.failed,
                 started_at = excluded.started_at,
                 finished_at = excluded.finished_at",
        )
        .bind(run.id.to_string())
        .bind(run.status.as_str())
        .bind(run.total as i64)
        .bind(run.completed as i64)
        .bind(run.failed as i64)
        .bind(run.created_at.to_rfc3339())
        .bind(run.started_at.map(|t| t.to_rfc3339()))
        .bind(run.finished_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_item(&self, item: &Item) -> Result<()> {
        sqlx::query(
            "INSERT INTO items (id, run_id, url, retailer, product_type, status,
                                retry_count, error_kind, error_message, snapshot_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 retry_count = excluded.retry_count,
                 error_kind = excluded.error_kind,
                 error_message = excluded.error_message,
                 snapshot_id = excluded.snapshot_id",
        )
        .bind(item.id.to_string())
        .bind(item.run_id.to_string())
        .bind(&item.url)
        .bind(item.retailer.map(|r| r.code()))
        .bind(item.product_type.as_str())
        .bind(item.status.as_str())
        .bind(item.retry_count as i64)
        .bind(item.last_error.as_ref().map(|e| e.kind.clone()))
        .bind(item.last_error.as_ref().map(|e| e.message.clone()))
        .bind(item.snapshot_id.map(|id| id.to_string()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        sqlx::query(
            "INSERT INTO snapshots (id, retailer, product_ref, title, price_regular,
                                    price_promo, price_card, price_final, rating,
                                    reviews_count, in_stock, scraped_at, fingerprint, unchanged)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )
        .bind(snapshot.id.to_string())
        .bind(snapshot.listing_key.retailer.code())
        .bind(&snapshot.listing_key.product_ref)
        .bind(&snapshot.title)
        .bind(snapshot.price_regular)
        .bind(snapshot.price_promo)
        .bind(snapshot.price_card)
        .bind(snapshot.price_final)
        .bind(snapshot.rating)
        .bind(snapshot.reviews_count)
        .bind(snapshot.in_stock as i64)
        .bind(snapshot.scraped_at.to_rfc3339())
        .bind(&snapshot.fingerprint)
        .bind(snapshot.unchanged as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_run(&self, id: Uuid) -> Result<Option<Run>> {
        let row = sqlx::query("SELECT * FROM runs WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(run_from_row).transpose()
    }

    async fn load_items(&self, run_id: Uuid) -> Result<Vec<Item>> {
        let rows = sqlx::query("SELECT * FROM items WHERE run_id = ?1 ORDER BY rowid")
            .bind(run_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(item_from_row).collect()
    }

    async fn latest_snapshot(&self, key: &ListingKey) -> Result<Option<Snapshot>> {
        let row = sqlx::query(
            "SELECT * FROM snapshots
             WHERE retailer = ?1 AND product_ref = ?2
             ORDER BY scraped_at DESC, rowid DESC
             LIMIT 1",
        )
        .bind(key.retailer.code())
        .bind(&key.product_ref)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(snapshot_from_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::fingerprint;

    async fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::connect(dir.path().join("pricewatch.db"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn run_round_trip() {
        let (_dir, store) = temp_store().await;
        let mut run = Run::new(2);
        store.save_run(&run).await.unwrap();

        run.status = RunStatus::Processing;
        run.started_at = Some(Utc::now());
        run.completed = 1;
        store.save_run(&run).await.unwrap();

        let loaded = store.load_run(run.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Processing);
        assert_eq!(loaded.completed, 1);
        assert_eq!(loaded.total, 2);
        assert!(loaded.started_at.is_some());
    }

    #[tokio::test]
    async fn items_keep_creation_order_across_updates() {
        let (_dir, store) = temp_store().await;
        let run = Run::new(2);
        let first = Item::new(
            run.id,
            "https://www.ozon.ru/product/a-1/".into(),
            Retailer::Ozon,
            ProductType::Own,
        );
        let mut second = Item::new(
            run.id,
            "https://www.ozon.ru/product/b-2/".into(),
            Retailer::Ozon,
            ProductType::Competitor,
        );
        store.save_item(&first).await.unwrap();
        store.save_item(&second).await.unwrap();

        second.status = ItemStatus::Failed;
        second.last_error = Some(ItemError {
            kind: "network_error".into(),
            message: "timed out".into(),
        });
        store.save_item(&second).await.unwrap();

        let items = store.load_items(run.id).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, first.id);
        assert_eq!(items[1].status, ItemStatus::Failed);
        assert_eq!(items[1].last_error.as_ref().unwrap().kind, "network_error");
    }

    #[tokio::test]
    async fn latest_snapshot_orders_by_scrape_time() {
        let (_dir, store) = temp_store().await;
        let key = ListingKey::new(Retailer::Perekrestok, "971234");
        for (offset, price) in [(2i64, 100), (1, 200)] {
            let snapshot = Snapshot {
                id: Uuid::new_v4(),
                listing_key: key.clone(),
                title: "Молоко".into(),
                price_regular: Some(price),
                price_promo: None,
                price_card: None,
                price_final: Some(price),
                rating: Some(4.5),
                reviews_count: Some(10),
                in_stock: true,
                scraped_at: Utc::now() - chrono::Duration::hours(offset),
                fingerprint: fingerprint(Some(price), true, Some(4.5), Some(10)),
                unchanged: false,
            };
            store.save_snapshot(&snapshot).await.unwrap();
        }
        let latest = store.latest_snapshot(&key).await.unwrap().unwrap();
        assert_eq!(latest.price_final, Some(200));

        let other = ListingKey::new(Retailer::Perekrestok, "other");
        assert!(store.latest_snapshot(&other).await.unwrap().is_none());
    }
}
