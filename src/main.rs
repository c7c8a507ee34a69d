use anyhow::Context;
use cardex_api::{AppState, RemoteEmbedder, RestApi, ServerConfig};
use cardex_core::CatalogStore;
use cardex_matcher::{Embedder, QueryImage};
use cardex_storage::{
    rebuild_catalog, BuildConfig, CatalogDownloader, DownloadConfig, IndexBuilder, StorageManager, TcgApiClient,
    DEFAULT_API_URL, DEFAULT_PAGE_SIZE,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Trading card identification from photos
#[derive(Parser, Debug)]
#[command(name = "cardex")]
#[command(about = "Identify trading cards from photos", long_about = None)]
struct Cli {
    /// Log level (RUST_LOG takes precedence)
    #[arg(long, global = true, default_value = "info", env = "CARDEX_LOG_LEVEL")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the card catalog and reference images from the TCG API
    Download(DownloadArgs),
    /// Run the HTTP scan API
    Serve(ServeArgs),
    /// Embed the downloaded reference images and write the index
    BuildIndex(BuildArgs),
    /// List the reference cards that look most like a photo
    Search(SearchArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ImageType {
    Large,
    Small,
}

impl ImageType {
    fn as_str(self) -> &'static str {
        match self {
            ImageType::Large => "large",
            ImageType::Small => "small",
        }
    }
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Path to the data directory
    #[arg(short, long, default_value = "./store", env = "CARDEX_DATA_DIR")]
    data_dir: PathBuf,

    /// Reference image size the index is built from
    #[arg(long, value_enum, default_value_t = ImageType::Large, env = "CARDEX_IMAGE_TYPE")]
    image_type: ImageType,

    /// Image embedding model name
    #[arg(long, default_value = "ViT-B/32", env = "CARDEX_MODEL")]
    model: String,

    /// Embedding service endpoint
    #[arg(long, default_value = "http://127.0.0.1:8081/embed", env = "CARDEX_EMBED_URL")]
    embed_url: String,

    /// Embedding dimension produced by the model
    #[arg(long, default_value_t = 512, env = "CARDEX_EMBED_DIM")]
    embed_dim: usize,
}

#[derive(Args, Debug)]
struct DownloadArgs {
    /// Path to the data directory
    #[arg(short, long, default_value = "./store", env = "CARDEX_DATA_DIR")]
    data_dir: PathBuf,

    /// Base URL of the TCG API
    #[arg(long, default_value = DEFAULT_API_URL, env = "CARDEX_API_URL")]
    api_url: String,

    /// Optional API key, sent as X-Api-Key
    #[arg(long, env = "CARDEX_API_KEY")]
    api_key: Option<String>,

    /// Cards requested per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE, env = "CARDEX_PAGE_SIZE")]
    page_size: usize,

    /// Only fetch card metadata
    #[arg(long, env = "CARDEX_SKIP_IMAGES")]
    skip_images: bool,

    /// Rebuild all_cards.json from the set files already downloaded
    #[arg(long, conflicts_with = "skip_images")]
    rebuild_only: bool,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// HTTP API port
    #[arg(long, default_value_t = 5001, env = "CARDEX_HTTP_PORT")]
    http_port: u16,

    /// OCR service endpoint
    #[arg(long, default_value = "http://127.0.0.1:8080/ocr", env = "CARDEX_OCR_URL")]
    ocr_url: String,
}

#[derive(Args, Debug)]
struct BuildArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Images embedded between checkpoints
    #[arg(long, default_value_t = 32, env = "CARDEX_BATCH_SIZE")]
    batch_size: usize,
}

#[derive(Args, Debug)]
struct SearchArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Number of results
    #[arg(long, default_value_t = 10, env = "CARDEX_TOP_K")]
    top_k: usize,

    /// Photo to search with
    image: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string().to_lowercase()));

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Command::Download(args) => download(args),
        Command::Serve(args) => serve(args),
        Command::BuildIndex(args) => build_index(args),
        Command::Search(args) => search(args),
    }
}

fn download(args: DownloadArgs) -> anyhow::Result<()> {
    let storage = StorageManager::new(&args.data_dir);
    if args.rebuild_only {
        rebuild_catalog(&storage)?;
        return Ok(());
    }
    if args.page_size == 0 {
        anyhow::bail!("--page-size must be at least 1");
    }

    info!("Downloading catalog from {} into {:?}", args.api_url, args.data_dir);
    let source = TcgApiClient::new(&args.api_url, args.api_key)?;
    let mut config = DownloadConfig {
        page_size: args.page_size,
        ..Default::default()
    };
    if args.skip_images {
        config.image_types.clear();
    }

    let report = CatalogDownloader::new(storage, source, config).run()?;
    if !report.failed.is_empty() {
        info!("{} downloads failed and can be retried by running download again", report.failed.len());
    }
    Ok(())
}

fn serve(args: ServeArgs) -> anyhow::Result<()> {
    info!("Starting Cardex v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig {
        data_dir: args.common.data_dir,
        http_port: args.http_port,
        image_type: args.common.image_type.as_str().to_string(),
        model_name: args.common.model,
        ocr_url: args.ocr_url,
        embed_url: args.common.embed_url,
        embed_dim: args.common.embed_dim,
    };
    info!("Data directory: {:?}", config.data_dir);
    info!("OCR service: {}", config.ocr_url);
    info!("Embedding service: {} ({})", config.embed_url, config.model_name);

    // Blocking HTTP clients must be created outside the async runtime
    let state = AppState::bootstrap(&config)?;

    info!("HTTP API: http://localhost:{}/", config.http_port);
    let sys = actix_web::rt::System::new();
    sys.block_on(RestApi::start(state, config.http_port))
        .context("HTTP server error")?;

    info!("Shutting down...");
    Ok(())
}

fn build_index(args: BuildArgs) -> anyhow::Result<()> {
    let storage = StorageManager::new(&args.common.data_dir);
    let catalog = storage.load_catalog()?;
    let embedder: Arc<dyn Embedder> = Arc::new(
        RemoteEmbedder::new(&args.common.embed_url, &args.common.model, args.common.embed_dim)
            .context("Embedding client")?,
    );

    let config = BuildConfig {
        image_type: args.common.image_type.as_str().to_string(),
        embedding_dim: args.common.embed_dim,
        batch_size: args.batch_size,
    };
    let report = IndexBuilder::new(storage, embedder, config).build(&catalog)?;

    info!(
        "Wrote {} ({} bytes, sha256 {})",
        report.snapshot.name, report.snapshot.size, report.snapshot.checksum
    );
    if report.skipped_unknown > 0 || report.failed > 0 {
        info!(
            "{} images had no catalog entry, {} could not be embedded",
            report.skipped_unknown, report.failed
        );
    }
    Ok(())
}

fn search(args: SearchArgs) -> anyhow::Result<()> {
    let common = args.common;
    let storage = StorageManager::new(&common.data_dir);
    let catalog = storage.load_catalog()?;
    let index = storage.load_index(common.image_type.as_str(), &common.model)?;

    let embedder = RemoteEmbedder::new(&common.embed_url, &common.model, index.dim())
        .context("Embedding client")?;
    let image = QueryImage::open(&args.image)
        .with_context(|| format!("Could not read image {:?}", args.image))?;
    let query = embedder.embed(&image)?;

    for hit in index.top_k(&query, args.top_k)? {
        let Some(entry) = index.get(hit.position) else {
            continue;
        };
        let card = catalog.get_entry(&entry.card_id);
        let line = json!({
            "similarity": hit.similarity,
            "card_id": entry.card_id,
            "name": card.and_then(|c| c.name.as_deref()),
            "set": entry.summary.set_name,
            "number": entry.summary.number,
        });
        println!("{}", line);
    }
    Ok(())
}
