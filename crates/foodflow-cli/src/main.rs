use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use foodflow_client::BackendClient;
use foodflow_core::{
    AppError, EmbeddingService, Product, ProductCollection, ProgressReporter, ProgressState,
    ProgressTracker, RunEvent, Selection, SyncConfig, SyncService, TracingReporter, load_config,
};

mod config;

use config::{Command, Config};

/// How often the progress poller samples the tracker.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let cli = Config::parse();

    let file_config = load_config(cli.config.clone())
        .context("Failed to load configuration")?
        .unwrap_or_default();
    let app_config = cli.resolve(file_config);

    let client =
        BackendClient::new(&app_config.backend).context("Invalid backend configuration")?;
    info!("Using backend at {}", client.base_url());

    // Ctrl-C stops new requests; in-flight ones finish and are counted.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, waiting for in-flight requests...");
                cancel.cancel();
            }
        });
    }

    let tracker = Arc::new(ProgressTracker::new());
    let page_size = cli.page_size;

    let result = match cli.command {
        Command::List { query } => load_products(&client, &query, page_size)
            .await
            .map(|products| print_products(&products)),
        Command::Sync { ids, query } => {
            run_sync(
                &client,
                app_config.sync,
                &query,
                ids,
                page_size,
                &tracker,
                cancel,
            )
            .await
        }
        Command::Embed { ids, query, .. } => {
            run_embed(
                &client,
                app_config.sync,
                &query,
                ids,
                page_size,
                &tracker,
                cancel,
            )
            .await
        }
    };

    if let Err(err) = &result {
        if let Some(app_err) = err.downcast_ref::<AppError>() {
            error!("{}", app_err.user_message());
        }
    }

    result
}

/// Logs run events and remembers whether the product view must be reloaded.
#[derive(Default)]
struct CliReporter {
    refresh_requested: AtomicBool,
}

impl CliReporter {
    fn refresh_requested(&self) -> bool {
        self.refresh_requested.load(Ordering::Relaxed)
    }
}

impl ProgressReporter for CliReporter {
    fn report(&self, event: RunEvent<'_>) {
        if let RunEvent::RefreshRequested = event {
            self.refresh_requested.store(true, Ordering::Relaxed);
        }
        TracingReporter.report(event);
    }
}

async fn load_products(
    client: &BackendClient,
    query: &str,
    page_size: u32,
) -> anyhow::Result<ProductCollection> {
    let products = client
        .load_working_set(query, page_size)
        .await
        .context("Failed to load products from backend")?;
    Ok(ProductCollection::from(products))
}

/// Explicit ids win; otherwise every product matching `default_pick`.
fn build_selection(
    products: &ProductCollection,
    ids: Vec<String>,
    default_pick: impl Fn(&Product) -> bool,
) -> Selection {
    if ids.is_empty() {
        products
            .iter()
            .filter(|p| default_pick(*p))
            .map(|p| p.id.clone())
            .collect()
    } else {
        ids.into_iter().collect()
    }
}

async fn run_sync(
    client: &BackendClient,
    sync_config: SyncConfig,
    query: &str,
    ids: Vec<String>,
    page_size: u32,
    tracker: &Arc<ProgressTracker>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let mut products = load_products(client, query, page_size).await?;
    let mut selection = build_selection(&products, ids, |p| p.remote);
    info!(
        "Selected {} product(s) with concurrency {}",
        selection.len(),
        sync_config.concurrency
    );

    let service = SyncService::with_config(client.clone(), sync_config);
    let reporter = CliReporter::default();
    let poller = spawn_progress_poller(Arc::clone(tracker));
    let result = service
        .sync_selected_cancellable(&mut products, &mut selection, tracker, &reporter, cancel)
        .await;
    poller.abort();
    let summary = result?;

    println!("{}", summary.message());

    if reporter.refresh_requested() {
        // Merged records are provisional; show what the store now holds.
        let refreshed = load_products(client, query, page_size).await?;
        products.replace_all(refreshed.into_inner());
        print_products(&products);
    }

    Ok(())
}

async fn run_embed(
    client: &BackendClient,
    sync_config: SyncConfig,
    query: &str,
    ids: Vec<String>,
    page_size: u32,
    tracker: &Arc<ProgressTracker>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let mut products = load_products(client, query, page_size).await?;
    let selection = build_selection(&products, ids, |p| !p.remote);

    let service = EmbeddingService::with_config(client.clone(), sync_config);
    info!(
        "Selected {} product(s), batch size {}, {} request(s) in flight{}",
        selection.len(),
        service.batch_size(),
        service.config().embedding_concurrency,
        if service.config().force_reembed {
            ", forced"
        } else {
            ""
        }
    );

    let poller = spawn_progress_poller(Arc::clone(tracker));
    let result = service
        .embed_selected_cancellable(&mut products, &selection, tracker, &TracingReporter, cancel)
        .await;
    poller.abort();
    let summary = result?;

    println!("{}", summary.message());
    Ok(())
}

/// Logs tracker snapshots while a run is active, as a progress display would.
fn spawn_progress_poller(tracker: Arc<ProgressTracker>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        let mut last: Option<ProgressState> = None;
        loop {
            interval.tick().await;
            let state = tracker.snapshot();
            if state.active && last != Some(state) {
                info!(
                    "Progress: {}/{} ({} failed)",
                    state.processed(),
                    state.total,
                    state.failed
                );
                last = Some(state);
            }
        }
    })
}

fn print_products(products: &ProductCollection) {
    if products.is_empty() {
        println!("\nNo products found.\n");
        return;
    }

    println!();
    println!("  {:<3} {:<28} {:<15} NAME", "", "ID", "CODE");
    for product in products {
        let marker = if product.remote {
            "R"
        } else if product.has_embeddings() {
            "E"
        } else {
            "-"
        };
        let name = if product.brands.is_empty() {
            product.product_name.clone()
        } else {
            format!("{} ({})", product.product_name, product.brands)
        };
        println!("  {:<3} {:<28} {:<15} {}", marker, product.id, product.code, name);
    }
    println!();

    let remote = products.iter().filter(|p| p.remote).count();
    let embedded = products.iter().filter(|p| p.has_embeddings()).count();
    println!(
        "{} product(s): {} stored ({} embedded), {} remote-only",
        products.len(),
        products.len() - remote,
        embedded,
        remote
    );
    println!("R = remote-only, E = embedded\n");
}
