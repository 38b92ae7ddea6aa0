//! Command line entry point for itemflow.
//!
//! Usage:
//!   itemflow --config itemflow.toml worker --input messages.ndjson
//!   itemflow publish --publication <uuid> --title "..." --meta trace_id=abc
//!   itemflow items --publication <uuid> --first 10 --after <cursor>
//!   itemflow healthcheck

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use itemflow_core::{
    init_logging, open_pool, AppConfig, Consumer, InMemoryQueue, ItemCore, ItemProcessor,
    ItemPublisher, ItemQueryService, ItemRepository, ItemsQuery, MessageProcessor, MessageSink,
    MessageSource, Metadata, PageArgs, PublishError, SqliteItemRepository,
};
use log::{info, warn};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "itemflow")]
#[command(about = "Item ingestion worker and query tool")]
#[command(version)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Overrides `database.path` from the configuration
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest newline-delimited envelopes through the worker pool
    Worker {
        /// File with one JSON envelope per line
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Print a new-item envelope to stdout
    Publish {
        #[arg(long)]
        publication: Uuid,
        #[arg(long)]
        title: String,
        /// RFC 3339 publish date; now when omitted
        #[arg(long)]
        date: Option<DateTime<Utc>>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        language: Option<String>,
        /// Trace metadata as key=value, repeatable
        #[arg(long = "meta", value_parser = parse_meta)]
        meta: Vec<(String, String)>,
    },
    /// Print one page of items as a JSON connection
    Items {
        #[arg(long)]
        publication: Option<Uuid>,
        /// Oldest first instead of newest first
        #[arg(long)]
        asc: bool,
        #[arg(long, allow_negative_numbers = true)]
        first: Option<i64>,
        #[arg(long)]
        after: Option<String>,
        #[arg(long, allow_negative_numbers = true)]
        last: Option<i64>,
        #[arg(long)]
        before: Option<String>,
    },
    /// Print one item as JSON
    Item { id: Uuid },
    /// Delete one item
    Delete { id: Uuid },
    /// Check that the store is reachable
    Healthcheck,
    /// Print the core version
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Command::Version = args.command {
        println!("itemflow_core version={}", itemflow_core::core_version());
        return Ok(());
    }

    let mut config = match args.config.as_deref() {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AppConfig::default(),
    };
    if let Some(path) = args.database {
        config.database.path = path;
    }

    if let Command::Publish {
        publication,
        title,
        date,
        description,
        content,
        url,
        language,
        meta,
    } = args.command
    {
        let core = ItemCore {
            description,
            content,
            url,
            language_code: language,
            ..ItemCore::new(publication, date.unwrap_or_else(Utc::now), title)
        };
        return publish(core, meta.into_iter().collect());
    }

    init_logging(&config.logging).context("initializing logging")?;
    let pool = open_pool(&config.database)
        .with_context(|| format!("opening database {}", config.database.path.display()))?;
    let repo = SqliteItemRepository::new(pool);

    match args.command {
        Command::Worker { input } => run_worker(&config, repo, input).await,
        Command::Items {
            publication,
            asc,
            first,
            after,
            last,
            before,
        } => {
            let query = ItemsQuery {
                publication_uuid: publication,
                sort_asc: asc,
                page: PageArgs {
                    first,
                    after,
                    last,
                    before,
                },
            };
            let page = ItemQueryService::new(repo).items_connection(&query)?;
            print_json(&page.connection())
        }
        Command::Item { id } => match ItemQueryService::new(repo).item(id)? {
            Some(item) => print_json(&item),
            None => bail!("item {id} not found"),
        },
        Command::Delete { id } => {
            repo.delete(id)?;
            println!("deleted {id}");
            Ok(())
        }
        Command::Healthcheck => {
            ItemQueryService::new(repo).healthcheck()?;
            println!("ok");
            Ok(())
        }
        Command::Publish { .. } | Command::Version => Ok(()),
    }
}

async fn run_worker(config: &AppConfig, repo: SqliteItemRepository, input: PathBuf) -> Result<()> {
    let queue = InMemoryQueue::from_config(&config.consume);
    let file = std::fs::File::open(&input)
        .with_context(|| format!("opening input {}", input.display()))?;
    let mut enqueued = 0usize;
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("reading {}", input.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        queue.enqueue(line.into_bytes())?;
        enqueued += 1;
    }
    queue.close();
    info!(
        "event=worker_input module=cli status=ok messages={} input={}",
        enqueued,
        input.display()
    );

    let source: Arc<dyn MessageSource> = Arc::new(queue.clone());
    let processor: Arc<dyn MessageProcessor> = Arc::new(ItemProcessor::new(repo));
    let mut consumer = Consumer::new(source, processor, &config.consume);
    let grace = consumer.shutdown_grace();
    consumer.start()?;

    tokio::select! {
        _ = consumer.wait() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for ctrl-c")?;
            warn!("event=worker_interrupt module=cli status=stopping");
        }
    }
    consumer.stop(grace).await?;

    let counts = queue.counts();
    print_json(&serde_json::json!({
        "enqueued": enqueued,
        "acked": counts.acked,
        "requeued": counts.requeued,
        "dead_lettered": counts.dead_lettered,
        "remaining": counts.ready + counts.in_flight,
    }))
}

struct StdoutSink;

impl MessageSink for StdoutSink {
    fn publish(&self, payload: Vec<u8>) -> Result<(), PublishError> {
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(&payload)
            .and_then(|_| stdout.write_all(b"\n"))
            .map_err(|err| PublishError::Sink(err.to_string()))
    }
}

fn publish(core: ItemCore, trace: Metadata) -> Result<()> {
    let item_id = ItemPublisher::new(StdoutSink).publish_new_item(core, &trace)?;
    eprintln!("item_id={item_id}");
    Ok(())
}

fn parse_meta(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got `{raw}`")),
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
