use clap::{Parser, Subcommand};
use foodflow_core::AppConfig;
use std::path::PathBuf;

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "foodflow")]
#[command(
    author,
    version,
    about = "Sync remote products and generate embeddings for the FoodFlow inventory"
)]
#[command(after_help = "Examples:
  foodflow list --query nutella
  foodflow sync --query nutella                 # import every remote match
  foodflow sync remote:3017620422003            # import selected products
  foodflow embed --force                        # re-embed the first page

Settings are read from ~/.config/foodflow/foodflow.toml and can be
overridden with flags or environment variables (a .env file is honored).")]
pub struct Config {
    /// Base URL of the inventory backend
    #[arg(long, env = "FOODFLOW_BACKEND_URL", global = true)]
    pub backend_url: Option<String>,

    /// Custom path to the foodflow.toml configuration file
    #[arg(long, env = "FOODFLOW_CONFIG", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Maximum number of concurrent product imports
    #[arg(long, env = "FOODFLOW_CONCURRENCY", global = true)]
    pub concurrency: Option<usize>,

    /// Maximum number of product ids per embedding request
    #[arg(long, env = "FOODFLOW_EMBEDDING_BATCH_SIZE", global = true)]
    pub batch_size: Option<usize>,

    /// Maximum number of embedding requests in flight
    #[arg(long, env = "FOODFLOW_EMBEDDING_CONCURRENCY", global = true)]
    pub embedding_concurrency: Option<usize>,

    /// Number of products loaded per page
    #[arg(long, default_value = "50", global = true)]
    pub page_size: u32,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show stored products and remote matches for a query
    List {
        /// Search text (name, brand or barcode)
        #[arg(short, long, default_value = "")]
        query: String,
    },
    /// Import remote-only products into the store
    #[command(after_help = "Without ids, every remote product matching the query is selected.")]
    Sync {
        /// Product ids to import (e.g. remote:3017620422003)
        #[arg(value_name = "ID")]
        ids: Vec<String>,
        /// Search text used to load the working collection
        #[arg(short, long, default_value = "")]
        query: String,
    },
    /// Generate embeddings for stored products
    #[command(after_help = "Without ids, every stored product in the page is selected.")]
    Embed {
        /// Product ids to embed
        #[arg(value_name = "ID")]
        ids: Vec<String>,
        /// Search text used to load the working collection
        #[arg(short, long, default_value = "")]
        query: String,
        /// Regenerate embeddings that already exist
        #[arg(long)]
        force: bool,
    },
}

impl Config {
    /// Applies flag and environment overrides on top of the file configuration.
    pub fn resolve(&self, mut app: AppConfig) -> AppConfig {
        if let Some(url) = &self.backend_url {
            app.backend.url = url.clone();
        }

        let mut sync = app.sync;
        if let Some(n) = self.concurrency {
            sync = sync.with_concurrency(n);
        }
        if let Some(n) = self.batch_size {
            sync = sync.with_embedding_batch_size(n);
        }
        if let Some(n) = self.embedding_concurrency {
            sync = sync.with_embedding_concurrency(n);
        }
        if let Command::Embed { force: true, .. } = self.command {
            sync = sync.with_force_reembed();
        }
        app.sync = sync;

        app
    }
}
