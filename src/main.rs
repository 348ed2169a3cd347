use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use closed_tab_history::view::{HistoryQuery, format_time_ago, query_history, shorten_location};
use closed_tab_history::{
    ClosureEngine, EngineConfig, FileStore, InMemoryEventSource, LifecycleEvent, SnapshotManager,
    StoreCodec, UiCommand,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "closed-tab-history")]
#[command(about = "Inspect and drive a closed tab history store")]
struct Cli {
    /// Directory holding the persistent store
    #[arg(long, global = true, default_value = "./closed-tab-data")]
    data_dir: PathBuf,

    #[arg(long, global = true, value_enum, default_value_t = Codec::Json)]
    codec: Codec,

    /// Engine configuration (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Codec {
    Json,
    Msgpack,
}

impl From<Codec> for StoreCodec {
    fn from(codec: Codec) -> Self {
        match codec {
            Codec::Json => StoreCodec::Json,
            Codec::Msgpack => StoreCodec::MessagePack,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print one page of the history
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long)]
        page_size: Option<usize>,
    },
    /// Change the history capacity and trim the stored log
    SetCapacity { value: i64 },
    /// Remove every history entry
    Clear,
    /// Feed a JSON-lines lifecycle event log through the engine
    Replay { events: PathBuf },
    /// Print the stored registry snapshot
    Snapshot,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path).context("loading engine config")?,
        None => EngineConfig::default(),
    };
    let store = Arc::new(
        FileStore::open(&cli.data_dir, cli.codec.into()).context("opening data directory")?,
    );

    match cli.command {
        Command::List {
            search,
            page,
            page_size,
        } => list(store, search, page, page_size).await,
        Command::SetCapacity { value } => {
            run_command(config, store, UiCommand::UpdateHistoryCapacity { value }).await
        }
        Command::Clear => run_command(config, store, UiCommand::ClearHistory).await,
        Command::Replay { events } => replay(config, store, &events).await,
        Command::Snapshot => {
            let registry = closed_tab_history::Registry::new(config.registry_ceiling);
            let records = SnapshotManager::new(registry, store).load_records().await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
            Ok(())
        }
    }
}

async fn list(
    store: Arc<FileStore>,
    search: Option<String>,
    page: usize,
    page_size: Option<usize>,
) -> Result<()> {
    let mut query = HistoryQuery::new().page(page);
    if let Some(search) = search {
        query = query.search(&search);
    }
    if let Some(page_size) = page_size {
        query = query.page_size(page_size);
    }
    let result = query_history(store.as_ref(), &query).await?;
    let now = Utc::now();
    for entry in &result.entries {
        println!(
            "{:>10}  {}  {}",
            format_time_ago(entry.closed_at, now),
            entry.label,
            shorten_location(&entry.location_ref)
        );
    }
    println!(
        "page {}/{} ({} matching, {} total)",
        result.page,
        result.total_pages.max(1),
        result.matched,
        result.total
    );
    Ok(())
}

async fn run_command(
    config: EngineConfig,
    store: Arc<FileStore>,
    command: UiCommand,
) -> Result<()> {
    let engine = ClosureEngine::start(config, store, Arc::new(InMemoryEventSource::new())).await?;
    let receipt = engine.handle_command(&command).await;
    let ceiling = engine.bounds().ceiling();
    engine.shutdown().await?;
    match receipt {
        Some(receipt) => {
            println!(
                "history: {} entries (capacity {}, max {})",
                receipt.length, receipt.capacity, ceiling
            );
            Ok(())
        }
        None => anyhow::bail!("command failed, see log"),
    }
}

fn read_events(path: &Path) -> Result<Vec<LifecycleEvent>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid event", path.display(), n + 1))
        })
        .collect()
}

async fn replay(config: EngineConfig, store: Arc<FileStore>, path: &Path) -> Result<()> {
    let events = read_events(path)?;
    let source = Arc::new(InMemoryEventSource::new());
    let engine = Arc::new(ClosureEngine::start(config, store, source.clone()).await?);

    let (tx, rx) = mpsc::channel(64);
    let runner = tokio::spawn(engine.clone().run(rx));
    for lifecycle_event in &events {
        // The source reflects the event before the engine sees it, as a
        // browser would: a destroyed object is already gone when queried.
        source.observe(lifecycle_event).await;
        tx.send(lifecycle_event.clone()).await.context("engine stopped early")?;
    }
    drop(tx);
    runner.await.context("event loop panicked")?;

    let receipt = engine.flush().await?;
    let tracked = engine.registry().len()?;
    let registry_ceiling = engine.config().registry_ceiling;
    engine.shutdown().await?;
    println!(
        "replayed {} events; history: {} entries (capacity {}); registry: {}/{} tracked",
        events.len(),
        receipt.length,
        receipt.capacity,
        tracked,
        registry_ceiling
    );
    Ok(())
}
