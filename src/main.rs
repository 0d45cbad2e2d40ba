use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use pricewatch::alert::LogAlertSink;
use pricewatch::config::{ConfigLoader, EngineConfig};
use pricewatch::connector::{default_client, ConnectorRegistry};
use pricewatch::orchestrator::{RunOptions, RunOrchestrator};
use pricewatch::run::{CreatedRun, ItemStatus, ProductType, RunStatusView};
use pricewatch::store::{MemoryStore, SqliteStore, Store};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "pricewatch")]
#[command(version = "0.1.0")]
#[command(about = "Batch price/rating scraper for tracked product listings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit product URLs as a new run and execute it
    Run {
        /// Path to the engine configuration file (JSON/YAML/TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Product URLs
        urls: Vec<String>,

        /// Read URLs from a file, one per line
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// SQLite database path; uses an in-memory store when omitted
        #[arg(short, long)]
        db: Option<PathBuf>,

        /// Track the URLs as our own listings instead of competitors
        #[arg(long)]
        own: bool,

        /// Show progress bars (stderr)
        #[arg(short, long, default_value_t = true)]
        progress: bool,
    },
    /// Validate a configuration file
    Check {
        /// Path to the configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show the stored status of a run
    Status {
        run_id: Uuid,

        #[arg(short, long)]
        db: PathBuf,
    },
    /// Clone a run's failed items into a new run and execute it
    Retry {
        run_id: Uuid,

        #[arg(short, long)]
        db: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long, default_value_t = true)]
        progress: bool,
    },
}

fn load_config(path: &Option<PathBuf>) -> anyhow::Result<EngineConfig> {
    Ok(match path {
        Some(path) => {
            log::info!("Loading config from {:?}", path);
            ConfigLoader::load(path)?
        }
        None => EngineConfig::default(),
    })
}

fn build_orchestrator(config: &EngineConfig, store: Arc<dyn Store>) -> RunOrchestrator {
    let client = default_client(Duration::from_secs(config.request_timeout_secs));
    let registry = Arc::new(ConnectorRegistry::with_default_connectors(client));
    RunOrchestrator::assemble(config, store, registry, Arc::new(LogAlertSink))
}

async fn open_store(db: &Option<PathBuf>) -> anyhow::Result<Arc<dyn Store>> {
    Ok(match db {
        Some(path) => Arc::new(SqliteStore::connect(path).await?),
        None => Arc::new(MemoryStore::new()),
    })
}

fn print_rejections(created: &CreatedRun) {
    for rejected in &created.rejected {
        eprintln!("❌ Line {}: {} ({})", rejected.line, rejected.url, rejected.reason);
    }
}

fn print_summary(view: &RunStatusView) {
    println!("\nRun {} ({})", view.id, view.status.as_str());
    println!(
        "   Progress: {}% ({} completed, {} failed of {})",
        view.progress.percentage, view.progress.completed, view.progress.failed, view.progress.total
    );
    for item in &view.items {
        match item.status {
            ItemStatus::Completed => println!("   ✅ {}", item.url),
            ItemStatus::Failed => {
                let error = item
                    .error
                    .as_ref()
                    .map(|e| format!("{}: {}", e.kind, e.message))
                    .unwrap_or_else(|| "unknown error".into());
                println!("   ❌ {} ({})", item.url, error);
            }
            _ => println!("   ⏳ {}", item.url),
        }
    }
}

async fn execute_with_progress(
    orchestrator: &RunOrchestrator,
    run_id: Uuid,
    multi: &Arc<MultiProgress>,
    total: u32,
    progress: bool,
) -> anyhow::Result<()> {
    let mut progress_bar: Option<ProgressBar> = None;
    let mut _progress_task = None;
    if progress {
        let pb = multi.add(ProgressBar::new(u64::from(total)));
        pb.set_style(ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("#>-"));

        let mut progress_rx = orchestrator.watch_progress();
        let pb_clone = pb.clone();
        progress_bar = Some(pb);
        _progress_task = Some(tokio::spawn(async move {
            while progress_rx.changed().await.is_ok() {
                let snapshot = progress_rx.borrow().clone();
                pb_clone.set_length(u64::from(snapshot.total));
                pb_clone.set_position(u64::from(snapshot.completed + snapshot.failed));
                pb_clone.set_message(format!(
                    "ok: {} | failed: {}",
                    snapshot.completed, snapshot.failed
                ));
            }
        }));
    }

    let run = orchestrator.execute_run(run_id).await?;

    if progress {
        if let Some(task) = _progress_task {
            task.abort();
        }
        if let Some(pb) = progress_bar {
            pb.finish_with_message(format!(
                "{} ({} completed, {} failed)",
                run.status.as_str(),
                run.completed,
                run.failed
            ));
        }
    }

    let view = orchestrator.get_run(run_id).await?;
    print_summary(&view);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        unsafe { std::env::set_var("RUST_LOG", "info"); }
    }
    let cli = Cli::parse();
    let logger = env_logger::Builder::from_default_env().build();
    let multi = Arc::new(MultiProgress::new());

    match cli.command {
        Commands::Run { config, urls, file, db, own, progress } => {
            if progress {
                let multi_clone = multi.clone();
                indicatif_log_bridge::LogWrapper::new((*multi_clone).clone(), logger)
                    .try_init()
                    .unwrap();
            } else {
                log::set_boxed_logger(Box::new(logger)).unwrap();
                log::set_max_level(log::LevelFilter::Info);
            }

            let config = load_config(&config)?;

            let mut all_urls = urls;
            if let Some(path) = file {
                let content = std::fs::read_to_string(&path)?;
                all_urls.extend(
                    content
                        .lines()
                        .map(str::trim)
                        .filter(|line| !line.is_empty())
                        .map(String::from),
                );
            }

            let store = open_store(&db).await?;
            let orchestrator = build_orchestrator(&config, store);

            let options = RunOptions {
                product_type: if own { ProductType::Own } else { ProductType::Competitor },
            };
            let created = orchestrator.create_run(&all_urls, &options).await?;
            print_rejections(&created);

            if created.run.total == 0 {
                eprintln!("❌ Every submitted URL was rejected, nothing to scrape");
                std::process::exit(1);
            }

            log::info!("Starting run {} ({} items)...", created.run.id, created.run.total);
            execute_with_progress(&orchestrator, created.run.id, &multi, created.run.total, progress)
                .await?;
        }
        Commands::Check { config } => {
            match ConfigLoader::load(&config) {
                Ok(cfg) => {
                    println!("✅ Config is valid:");
                    println!("   Max URLs per run: {}", cfg.max_urls_per_run);
                    println!("   Concurrency: {}", cfg.concurrency);
                    println!("   Retry attempts: {}", cfg.retry.max_attempts);
                    println!("   Rate limit overrides: {}", cfg.rate_limits.per_retailer.len());
                }
                Err(e) => {
                    eprintln!("❌ Config error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Status { run_id, db } => {
            log::set_boxed_logger(Box::new(logger)).unwrap();
            log::set_max_level(log::LevelFilter::Warn);

            let store = SqliteStore::connect(&db).await?;
            let run = store
                .load_run(run_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("run {} not found", run_id))?;
            let items = store.load_items(run_id).await?;
            print_summary(&RunStatusView::build(&run, &items));
        }
        Commands::Retry { run_id, db, config, progress } => {
            if progress {
                let multi_clone = multi.clone();
                indicatif_log_bridge::LogWrapper::new((*multi_clone).clone(), logger)
                    .try_init()
                    .unwrap();
            } else {
                log::set_boxed_logger(Box::new(logger)).unwrap();
                log::set_max_level(log::LevelFilter::Info);
            }

            let config = load_config(&config)?;
            let store: Arc<dyn Store> = Arc::new(SqliteStore::connect(&db).await?);
            let orchestrator = build_orchestrator(&config, store);

            let created = orchestrator.retry_failed(run_id).await?;
            print_rejections(&created);

            if created.run.total == 0 {
                eprintln!("❌ Every failed URL was rejected again, nothing to retry");
                std::process::exit(1);
            }

            log::info!(
                "Retrying as run {} ({} items)...",
                created.run.id,
                created.run.total
            );
            execute_with_progress(&orchestrator, created.run.id, &multi, created.run.total, progress)
                .await?;
        }
    }

    Ok(())
}
