use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::error;

use gigmap::apis::geocode::NominatimGeocoder;
use gigmap::apis::ticketmaster::TicketmasterClient;
use gigmap::apis::{EventSource, SearchWindow};
use gigmap::config::Config;
use gigmap::pipeline::{IngestOutcome, Ingestor, Normalizer};
use gigmap::query::QueryService;
use gigmap::server::{start_server, AppState};
use gigmap::storage::{InMemoryStorage, Storage};
use gigmap::{logging, metrics};

#[derive(Parser)]
#[command(name = "gigmap")]
#[command(about = "Event listings backend: Ticketmaster ingestion and geographic queries")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port to bind (overrides config/PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Ingest one one-week window starting now
    Ingest {
        #[arg(long)]
        country_code: String,
        #[arg(long)]
        city: String,
        /// Classification name, e.g. music
        #[arg(long = "type")]
        event_type: String,
    },
    /// Run the weekly backfill (8 sliding one-week windows)
    Backfill {
        #[arg(long)]
        country_code: String,
        #[arg(long)]
        city: String,
        #[arg(long = "type")]
        event_type: String,
        /// Wipe the database before ingesting
        #[arg(long)]
        clear: bool,
    },
    /// Delete ALL data across every collection
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

/// Picks the libSQL store when the `db` feature is on and LIBSQL_URL is
/// set; falls back to the in-memory store otherwise.
async fn build_storage() -> anyhow::Result<Arc<dyn Storage>> {
    #[cfg(feature = "db")]
    if std::env::var("LIBSQL_URL").is_ok() {
        let storage = gigmap::storage::LibsqlStorage::connect().await?;
        return Ok(Arc::new(storage));
    }
    Ok(Arc::new(InMemoryStorage::new()))
}

fn build_ingestor(config: &Config, storage: Arc<dyn Storage>) -> anyhow::Result<Arc<Ingestor>> {
    let source = Arc::new(TicketmasterClient::new(config.ticketmaster.clone())?);
    let geocoder = Arc::new(NominatimGeocoder::new(config.geocoder.clone())?);
    let normalizer = Arc::new(Normalizer::new(
        storage.clone(),
        geocoder,
        source.provider(),
    ));
    Ok(Arc::new(Ingestor::new(
        source,
        normalizer,
        storage,
        config.ingest.clone(),
    )))
}

fn print_outcome(outcome: &IngestOutcome) {
    match outcome {
        IngestOutcome::Completed(summary) => {
            println!(
                "📊 Window {} → {}:",
                summary.window_start, summary.window_end
            );
            println!("   Available: {}", summary.total_available);
            println!("   Pages fetched: {}", summary.pages_fetched);
            println!("   Persisted: {}", summary.persisted);
            println!("   Rejected: {}", summary.rejected);
            if !summary.errors.is_empty() {
                println!("   ⚠️  Errors: {}", summary.errors.len());
                for e in &summary.errors {
                    println!("      - {}", e);
                }
            }
        }
        IngestOutcome::RefineFilters {
            total_elements,
            required_pages,
            max_pages,
        } => {
            println!(
                "⚠️  Window matches {} events ({} pages, cap {}). Narrow your filters.",
                total_elements, required_pages, max_pages
            );
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Serve { port } => {
            metrics::init_metrics();
            let storage = build_storage().await?;
            let ingestor = build_ingestor(&config, storage.clone())?;
            let state = Arc::new(AppState {
                query: QueryService::new(storage.clone()),
                storage,
                ingestor,
            });
            let port = port.unwrap_or(config.server.port);
            start_server(state, port).await?;
        }
        Commands::Ingest {
            country_code,
            city,
            event_type,
        } => {
            println!("🔄 Ingesting one week of events for {city}...");
            let storage = build_storage().await?;
            let ingestor = build_ingestor(&config, storage)?;
            let window =
                SearchWindow::week_from(&country_code, &city, &event_type, chrono::Utc::now());
            match ingestor.run_window(&window).await {
                Ok(outcome) => print_outcome(&outcome),
                Err(e) => {
                    error!("Ingestion failed: {}", e);
                    println!("❌ Ingestion failed: {}", e);
                }
            }
        }
        Commands::Backfill {
            country_code,
            city,
            event_type,
            clear,
        } => {
            println!("🚀 Running {}-week backfill for {city}...", config.ingest.backfill_weeks);
            let storage = build_storage().await?;
            if clear {
                println!("🗑️  Clearing database before ingestion...");
                storage.clear_all().await?;
            }
            let ingestor = build_ingestor(&config, storage)?;
            let outcomes = ingestor
                .run_backfill(&country_code, &city, &event_type)
                .await;
            for outcome in &outcomes {
                print_outcome(outcome);
            }
            println!("✅ Backfill completed ({} windows)", outcomes.len());
        }
        Commands::Clear { yes } => {
            if !yes {
                println!("⚠️  WARNING: This will delete ALL data from the database!");
                println!("Press Enter to continue or Ctrl+C to cancel...");
                let mut input = String::new();
                std::io::stdin().read_line(&mut input)?;
            }
            println!("🗑️  Clearing database...");
            let storage = build_storage().await?;
            storage.clear_all().await?;
            println!("✅ Database cleared successfully!");
        }
    }
    Ok(())
}
