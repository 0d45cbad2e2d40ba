pub mod alert;
pub mod config;
pub mod connector;
pub mod delta;
pub mod error;
pub mod executor;
pub mod limiter;
pub mod orchestrator;
pub mod retry;
pub mod run;
pub mod snapshot;
pub mod store;

pub use alert::{AlertSink, LogAlertSink};
pub use config::{ConfigLoader, EngineConfig};
pub use connector::{Connector, ConnectorRegistry, Retailer};
pub use delta::{compute_delta, Delta};
pub use error::{Error, Result, ScrapeError};
pub use executor::JobExecutor;
pub use limiter::RateLimiter;
pub use orchestrator::{RunOptions, RunOrchestrator};
pub use retry::RetryPolicy;
pub use run::{Item, ItemStatus, ProductType, Run, RunStatus, RunStatusView};
pub use snapshot::{ListingKey, Snapshot, SnapshotStore};
pub use store::{MemoryStore, SqliteStore, Store};
