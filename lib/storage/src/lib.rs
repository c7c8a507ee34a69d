pub mod builder;
pub mod checkpoint;
pub mod downloader;
pub mod manager;
pub mod snapshot;

pub use builder::{BuildConfig, BuildReport, IndexBuilder};
pub use checkpoint::Checkpoint;
pub use downloader::{
    rebuild_catalog, CatalogDownloader, CatalogSource, DownloadConfig, DownloadReport, FailedDownload,
    TcgApiClient, DEFAULT_API_URL, DEFAULT_PAGE_SIZE,
};
pub use manager::{load_catalog, model_slug, StorageManager};
pub use snapshot::{IndexSnapshot, SnapshotDescription};
