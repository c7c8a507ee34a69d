//! Bulk download of the reference catalog
//!
//! Pages through every set published by the TCG API, writes one JSON file
//! per set plus the combined `all_cards.json`, and fetches the card images
//! under the names the index builder expects. Images already on disk are
//! kept, so an interrupted download can simply be run again.

use anyhow::{anyhow, bail, Context, Result};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use cardex_core::{CardImages, CardSet, CatalogEntry};
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT_ENCODING, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::manager::StorageManager;

pub const DEFAULT_API_URL: &str = "https://api.pokemontcg.io/v2";
pub const DEFAULT_PAGE_SIZE: usize = 250;

/// Where catalog pages and card images come from
pub trait CatalogSource {
    fn sets(&self) -> Result<Vec<CardSet>>;

    /// One page of a set's cards, 1-based
    fn cards_page(&self, set_id: &str, page: usize, page_size: usize) -> Result<Vec<CatalogEntry>>;

    fn download_image(&self, url: &str, dest: &Path) -> Result<()>;
}

/// `{"data": [...]}` envelope of every list endpoint
#[derive(Deserialize)]
struct Page<T> {
    data: Vec<T>,
}

/// The public TCG API over a blocking HTTP client
pub struct TcgApiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl TcgApiClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("HTTP client build failed")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn get(&self, url: &str) -> Result<Response> {
        let mut request = self
            .client
            .get(url)
            .header(USER_AGENT, concat!("cardex/", env!("CARGO_PKG_VERSION")));
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key);
        }
        let resp = request
            .send()
            .with_context(|| format!("Failed HTTP GET {}", url))?;
        ensure_success(&resp)?;
        Ok(resp)
    }

    fn get_page<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>> {
        let page: Page<T> = self
            .get(url)?
            .json()
            .with_context(|| format!("Malformed response from {}", url))?;
        Ok(page.data)
    }
}

impl CatalogSource for TcgApiClient {
    fn sets(&self) -> Result<Vec<CardSet>> {
        self.get_page(&format!("{}/sets", self.base_url))
    }

    fn cards_page(&self, set_id: &str, page: usize, page_size: usize) -> Result<Vec<CatalogEntry>> {
        self.get_page(&format!(
            "{}/cards?q=set.id:{}&page={}&pageSize={}",
            self.base_url, set_id, page, page_size
        ))
    }

    fn download_image(&self, url: &str, dest: &Path) -> Result<()> {
        let mut resp = self
            .client
            .get(url)
            .header(ACCEPT_ENCODING, "identity")
            .send()
            .with_context(|| format!("Failed HTTP GET {}", url))?;
        ensure_success(&resp)?;

        let mut writer = BufWriter::new(
            File::create(dest).with_context(|| format!("Create download file {:?} failed", dest))?,
        );
        let copied = resp.copy_to(&mut writer).map_err(anyhow::Error::from).and_then(|n| {
            writer.flush()?;
            Ok(n)
        });
        match copied {
            Ok(n) if n > 0 => Ok(()),
            Ok(_) => {
                let _ = fs::remove_file(dest);
                bail!("Empty response body from {}", url)
            }
            Err(e) => {
                let _ = fs::remove_file(dest);
                Err(e).with_context(|| format!("Failed to copy {} to {:?}", url, dest))
            }
        }
    }
}

fn ensure_success(resp: &Response) -> Result<()> {
    if !resp.status().is_success() {
        bail!("HTTP error {} from {}", resp.status(), resp.url());
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub page_size: usize,
    /// Image sizes to fetch for every card, `large` and/or `small`
    pub image_types: Vec<String>,
    /// Pause between card pages
    pub page_delay: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            image_types: vec!["large".to_string(), "small".to_string()],
            page_delay: Duration::from_millis(100),
        }
    }
}

/// A set page or card image that could not be fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedDownload {
    pub card_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct DownloadReport {
    pub sets: usize,
    pub cards: usize,
    pub images_downloaded: usize,
    pub images_present: usize,
    pub failed: Vec<FailedDownload>,
}

/// Written per set as `data/set_<id>.json`
#[derive(Serialize, Deserialize)]
struct SetFile {
    set_info: CardSet,
    cards: Vec<CatalogEntry>,
    total_cards: usize,
}

pub struct CatalogDownloader<S> {
    storage: StorageManager,
    source: S,
    config: DownloadConfig,
}

impl<S: CatalogSource> CatalogDownloader<S> {
    pub fn new(storage: StorageManager, source: S, config: DownloadConfig) -> Self {
        Self {
            storage,
            source,
            config,
        }
    }

    pub fn run(&self) -> Result<DownloadReport> {
        let start = Instant::now();
        let data_dir = self.storage.data_dir();
        let images_dir = self.storage.images_dir();
        fs::create_dir_all(&data_dir).with_context(|| format!("Create {:?}", data_dir))?;
        fs::create_dir_all(&images_dir).with_context(|| format!("Create {:?}", images_dir))?;

        let sets = self.source.sets().context("Could not fetch the set list")?;
        if sets.is_empty() {
            bail!("The catalog source returned no sets");
        }
        write_json(&data_dir.join("sets.json"), &sets)?;
        info!("Found {} sets", sets.len());

        let mut report = DownloadReport {
            sets: sets.len(),
            ..Default::default()
        };
        let mut all_cards = Vec::new();

        for (i, set) in sets.iter().enumerate() {
            let cards = self.fetch_set(set, &mut report.failed);
            info!(
                "[{}/{}] {}: {} cards",
                i + 1,
                sets.len(),
                set.name.as_deref().unwrap_or(&set.id),
                cards.len()
            );

            let set_file = SetFile {
                set_info: set.clone(),
                total_cards: cards.len(),
                cards,
            };
            write_json(&self.storage.set_path(&set.id), &set_file)?;

            for card in &set_file.cards {
                self.fetch_images(card, &images_dir, &mut report);
            }
            all_cards.extend(set_file.cards);
        }

        report.cards = all_cards.len();
        write_json(&self.storage.catalog_path(), &all_cards)?;

        if !report.failed.is_empty() {
            write_json(&data_dir.join("failed_downloads.json"), &report.failed)?;
            warn!("{} downloads failed, see failed_downloads.json", report.failed.len());
        }

        info!(
            "Downloaded {} cards from {} sets ({} new images, {} already present) in {:.1}s",
            report.cards,
            report.sets,
            report.images_downloaded,
            report.images_present,
            start.elapsed().as_secs_f64()
        );
        Ok(report)
    }

    /// Page through one set until a short or empty page
    fn fetch_set(&self, set: &CardSet, failed: &mut Vec<FailedDownload>) -> Vec<CatalogEntry> {
        let mut cards = Vec::new();
        let mut page = 1;
        loop {
            let batch = match self.source.cards_page(&set.id, page, self.config.page_size) {
                Ok(batch) => batch,
                Err(e) => {
                    warn!("Set {} page {} failed: {:#}", set.id, page, e);
                    failed.push(FailedDownload {
                        card_id: format!("set:{}", set.id),
                        url: None,
                        error: format!("page {}: {:#}", page, e),
                    });
                    break;
                }
            };

            let len = batch.len();
            cards.extend(batch);
            debug!("Set {} page {}: {} cards", set.id, page, len);
            if len < self.config.page_size {
                break;
            }
            page += 1;
            if !self.config.page_delay.is_zero() {
                thread::sleep(self.config.page_delay);
            }
        }
        cards
    }

    fn fetch_images(&self, card: &CatalogEntry, images_dir: &Path, report: &mut DownloadReport) {
        for image_type in &self.config.image_types {
            let Some(url) = card.images.as_ref().and_then(|i| image_url(i, image_type)) else {
                continue;
            };
            let Some(filename) = card.local_image_filename(image_type) else {
                report.failed.push(FailedDownload {
                    card_id: card.id.clone(),
                    url: Some(url.to_string()),
                    error: "card has no set, number or name to name the file by".to_string(),
                });
                continue;
            };

            let dest = images_dir.join(&filename);
            if dest.exists() {
                report.images_present += 1;
                continue;
            }
            match self.source.download_image(url, &dest) {
                Ok(()) => report.images_downloaded += 1,
                Err(e) => {
                    warn!("Image {} for {} failed: {:#}", image_type, card.id, e);
                    report.failed.push(FailedDownload {
                        card_id: card.id.clone(),
                        url: Some(url.to_string()),
                        error: format!("{:#}", e),
                    });
                }
            }
        }
    }
}

fn image_url<'a>(images: &'a CardImages, image_type: &str) -> Option<&'a str> {
    match image_type {
        "large" => images.large.as_deref(),
        "small" => images.small.as_deref(),
        _ => None,
    }
}

/// Rebuild `all_cards.json` from the per-set files already on disk
pub fn rebuild_catalog(storage: &StorageManager) -> Result<usize> {
    let data_dir = storage.data_dir();
    let mut set_files: Vec<PathBuf> = fs::read_dir(&data_dir)
        .with_context(|| format!("Data directory not found: {:?}", data_dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("set_") && n.ends_with(".json"))
        })
        .collect();
    set_files.sort();

    if set_files.is_empty() {
        bail!("No set files found in {:?}", data_dir);
    }

    let mut all_cards = Vec::new();
    for path in &set_files {
        let bytes = fs::read(path).with_context(|| format!("Read {:?}", path))?;
        let set: SetFile =
            serde_json::from_slice(&bytes).with_context(|| format!("Malformed set file {:?}", path))?;
        all_cards.extend(set.cards);
    }

    write_json(&storage.catalog_path(), &all_cards)?;
    info!("Rebuilt catalog with {} cards from {} set files", all_cards.len(), set_files.len());
    Ok(all_cards.len())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
        .write(|file| file.write_all(&json))
        .map_err(|e| anyhow!("Failed to write {:?}: {}", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Serves fixed pages and records every request
    #[derive(Default)]
    struct FixturePager {
        sets: Vec<CardSet>,
        cards: HashMap<String, Vec<CatalogEntry>>,
        broken_sets: Vec<String>,
        broken_images: Vec<String>,
        page_requests: RefCell<Vec<(String, usize)>>,
        image_requests: RefCell<Vec<String>>,
    }

    impl CatalogSource for FixturePager {
        fn sets(&self) -> Result<Vec<CardSet>> {
            Ok(self.sets.clone())
        }

        fn cards_page(&self, set_id: &str, page: usize, page_size: usize) -> Result<Vec<CatalogEntry>> {
            self.page_requests.borrow_mut().push((set_id.to_string(), page));
            if self.broken_sets.iter().any(|s| s == set_id) {
                bail!("HTTP error 500 Internal Server Error");
            }
            let all = self.cards.get(set_id).cloned().unwrap_or_default();
            Ok(all.into_iter().skip((page - 1) * page_size).take(page_size).collect())
        }

        fn download_image(&self, url: &str, dest: &Path) -> Result<()> {
            self.image_requests.borrow_mut().push(url.to_string());
            if self.broken_images.iter().any(|u| u == url) {
                bail!("HTTP error 404 Not Found from {}", url);
            }
            fs::write(dest, url.as_bytes())?;
            Ok(())
        }
    }

    fn set(id: &str, name: &str) -> CardSet {
        serde_json::from_value(serde_json::json!({"id": id, "name": name, "printedTotal": 102}))
            .unwrap()
    }

    fn card(set_id: &str, number: u32, name: &str) -> CatalogEntry {
        serde_json::from_value(serde_json::json!({
            "id": format!("{}-{}", set_id, number),
            "name": name,
            "number": number.to_string(),
            "set": {"id": set_id, "name": "Base"},
            "rarity": "Common",
            "flavorText": "Spits fire.",
            "images": {
                "small": format!("https://images.test/{}/{}.png", set_id, number),
                "large": format!("https://images.test/{}/{}_hires.png", set_id, number)
            }
        }))
        .unwrap()
    }

    fn pager() -> FixturePager {
        FixturePager {
            sets: vec![set("base1", "Base"), set("jungle", "Jungle")],
            cards: HashMap::from([
                (
                    "base1".to_string(),
                    vec![
                        card("base1", 4, "Charizard"),
                        card("base1", 58, "Pikachu"),
                        card("base1", 63, "Squirtle"),
                    ],
                ),
                ("jungle".to_string(), vec![card("jungle", 1, "Mr. Mime")]),
            ]),
            ..Default::default()
        }
    }

    fn config(page_size: usize) -> DownloadConfig {
        DownloadConfig {
            page_size,
            page_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    #[test]
    fn test_download_writes_catalog_layout() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path());

        let report = CatalogDownloader::new(storage.clone(), pager(), config(250))
            .run()
            .unwrap();
        assert_eq!(report.sets, 2);
        assert_eq!(report.cards, 4);
        assert_eq!(report.images_downloaded, 8);
        assert!(report.failed.is_empty());

        let catalog = storage.load_catalog().unwrap();
        assert_eq!(cardex_core::CatalogStore::len(&catalog), 4);
        let pikachu = cardex_core::CatalogStore::get_entry(&catalog, "base1-58").unwrap();
        assert_eq!(pikachu.rarity.as_deref(), Some("Common"));
        assert_eq!(pikachu.extra["flavorText"], "Spits fire.");

        let set_file: serde_json::Value =
            serde_json::from_slice(&fs::read(storage.set_path("base1")).unwrap()).unwrap();
        assert_eq!(set_file["total_cards"], 3);
        assert_eq!(set_file["set_info"]["id"], "base1");
        assert!(storage.data_dir().join("sets.json").exists());
        assert!(!storage.data_dir().join("failed_downloads.json").exists());

        let images = storage.images_dir();
        assert_eq!(
            fs::read_to_string(images.join("base1-58_Pikachu_large.png")).unwrap(),
            "https://images.test/base1/58_hires.png"
        );
        assert!(images.join("base1-58_Pikachu_small.png").exists());
        assert!(images.join("jungle-1_Mr._Mime_large.png").exists());
    }

    #[test]
    fn test_pages_until_short_page() {
        let dir = tempfile::tempdir().unwrap();
        let source = pager();
        let downloader = CatalogDownloader::new(StorageManager::new(dir.path()), source, config(2));

        let report = downloader.run().unwrap();
        assert_eq!(report.cards, 4);
        assert_eq!(
            *downloader.source.page_requests.borrow(),
            vec![
                ("base1".to_string(), 1),
                ("base1".to_string(), 2),
                ("jungle".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_exact_multiple_stops_on_empty_page() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = CatalogDownloader::new(StorageManager::new(dir.path()), pager(), config(1));

        downloader.run().unwrap();
        let requests = downloader.source.page_requests.borrow();
        let jungle: Vec<usize> = requests
            .iter()
            .filter(|(s, _)| s == "jungle")
            .map(|(_, p)| *p)
            .collect();
        assert_eq!(jungle, vec![1, 2]);
    }

    #[test]
    fn test_existing_images_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path());
        fs::create_dir_all(storage.images_dir()).unwrap();
        let existing = storage.images_dir().join("base1-4_Charizard_large.png");
        fs::write(&existing, b"already here").unwrap();

        let downloader = CatalogDownloader::new(storage, pager(), config(250));
        let report = downloader.run().unwrap();

        assert_eq!(report.images_present, 1);
        assert_eq!(report.images_downloaded, 7);
        assert_eq!(fs::read(&existing).unwrap(), b"already here");
        assert!(!downloader
            .source
            .image_requests
            .borrow()
            .contains(&"https://images.test/base1/4_hires.png".to_string()));
    }

    #[test]
    fn test_failures_are_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path());
        let mut source = pager();
        source.broken_sets = vec!["jungle".to_string()];
        source.broken_images = vec!["https://images.test/base1/58.png".to_string()];

        let report = CatalogDownloader::new(storage.clone(), source, config(250))
            .run()
            .unwrap();
        assert_eq!(report.cards, 3);
        assert_eq!(report.failed.len(), 2);

        let failed: Vec<FailedDownload> = serde_json::from_slice(
            &fs::read(storage.data_dir().join("failed_downloads.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(failed, report.failed);
        assert!(failed.iter().any(|f| f.card_id == "set:jungle"));
        assert!(failed
            .iter()
            .any(|f| f.card_id == "base1-58" && f.error.contains("404")));
        assert!(!storage.images_dir().join("base1-58_Pikachu_small.png").exists());
    }

    #[test]
    fn test_skip_images() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path());
        let config = DownloadConfig {
            image_types: Vec::new(),
            ..config(250)
        };
        let downloader = CatalogDownloader::new(storage.clone(), pager(), config);

        let report = downloader.run().unwrap();
        assert_eq!(report.cards, 4);
        assert_eq!(report.images_downloaded, 0);
        assert!(downloader.source.image_requests.borrow().is_empty());
        assert!(storage.catalog_path().exists());
    }

    #[test]
    fn test_empty_set_list_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = FixturePager::default();
        let err = CatalogDownloader::new(StorageManager::new(dir.path()), source, config(250))
            .run()
            .unwrap_err();
        assert!(err.to_string().contains("no sets"));
    }

    #[test]
    fn test_rebuild_catalog_from_set_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path());
        let config = DownloadConfig {
            image_types: Vec::new(),
            ..config(250)
        };
        CatalogDownloader::new(storage.clone(), pager(), config).run().unwrap();
        fs::remove_file(storage.catalog_path()).unwrap();

        assert_eq!(rebuild_catalog(&storage).unwrap(), 4);
        let catalog = storage.load_catalog().unwrap();
        assert!(cardex_core::CatalogStore::get_entry(&catalog, "jungle-1").is_some());
    }

    #[test]
    fn test_rebuild_without_set_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path());
        fs::create_dir_all(storage.data_dir()).unwrap();
        assert!(rebuild_catalog(&storage).is_err());
    }

    #[test]
    fn test_unreachable_api_is_an_error() {
        let source = TcgApiClient::new("http://127.0.0.1:9/v2", None).unwrap();
        let err = source.sets().unwrap_err();
        assert!(format!("{:#}", err).contains("Failed HTTP GET http://127.0.0.1:9/v2/sets"));
    }
}
