//! # Asset Cache
//!
//! Product images kept on the device so the catalog renders offline.
//!
//! ## Layout and Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Asset Cache                                    │
//! │                                                                         │
//! │  {assets.dir}/                                                         │
//! │    ├── p-1.jpg                                                         │
//! │    ├── p-2.jpg                                                         │
//! │    └── p-3.jpg.part   ← in-flight download, renamed when complete      │
//! │                                                                         │
//! │  resolve_path(id, hint)                                                │
//! │    local files unavailable ──► Remote(url)                             │
//! │    {dir}/{id}.jpg exists   ──► Local(path)                             │
//! │    otherwise               ──► Remote(hint | {base}/uploads/products/  │
//! │                                              {id}.jpg)                 │
//! │    Never waits for a download.                                         │
//! │                                                                         │
//! │  download_batch(requests)                                              │
//! │    [5 at once] ─ pause ─ [5 at once] ─ pause ─ ... ─► report           │
//! │    One failure never aborts its chunk; each is reported per entity.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use ts_rs::TS;

use crate::config::AssetSettings;
use crate::error::{AssetError, SyncError, SyncResult};

// =============================================================================
// Types
// =============================================================================

/// Where the UI should load an image from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetLocation {
    Local(PathBuf),
    Remote(String),
}

impl AssetLocation {
    pub fn is_local(&self) -> bool {
        matches!(self, AssetLocation::Local(_))
    }
}

/// One image to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRequest {
    pub entity_id: String,
    pub url: String,
}

/// Why one entity's image is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AssetFailure {
    pub entity_id: String,
    pub error: String,
}

/// Outcome of [`AssetCache::download_batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BatchDownloadReport {
    pub total: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub errors: Vec<AssetFailure>,
}

// =============================================================================
// Asset Cache
// =============================================================================

/// On-disk image cache keyed by product id.
#[derive(Debug, Clone)]
pub struct AssetCache {
    settings: AssetSettings,
    remote_base_url: String,
    client: reqwest::Client,
}

impl AssetCache {
    /// Creates a cache rooted at `settings.dir`. The directory is created on
    /// first download.
    pub fn new(settings: AssetSettings, remote_base_url: impl Into<String>) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| SyncError::Internal(format!("HTTP client: {e}")))?;

        Ok(AssetCache {
            settings,
            remote_base_url: remote_base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.settings.dir
    }

    pub fn local_files_available(&self) -> bool {
        self.settings.local_files_available
    }

    /// `{dir}/{entity_id}.jpg`.
    pub fn path_for(&self, entity_id: &str) -> Result<PathBuf, AssetError> {
        let valid = !entity_id.is_empty()
            && entity_id != "."
            && entity_id != ".."
            && !entity_id.contains(['/', '\\']);
        if !valid {
            return Err(AssetError::InvalidId(entity_id.to_string()));
        }
        Ok(self.settings.dir.join(format!("{entity_id}.jpg")))
    }

    /// Remote URL for an entity's image.
    ///
    /// Absolute hints are used as is, server-relative hints are joined to the
    /// base URL, and without a hint the conventional upload path is used.
    pub fn remote_url(&self, entity_id: &str, hint: Option<&str>) -> String {
        match hint.map(str::trim).filter(|h| !h.is_empty()) {
            Some(h) if h.starts_with("http://") || h.starts_with("https://") => h.to_string(),
            Some(h) if h.starts_with('/') => format!("{}{}", self.remote_base_url, h),
            Some(h) => format!("{}/{}", self.remote_base_url, h),
            None => format!("{}/uploads/products/{}.jpg", self.remote_base_url, entity_id),
        }
    }

    /// True if a complete local copy exists.
    pub async fn exists(&self, entity_id: &str) -> bool {
        match self.path_for(entity_id) {
            Ok(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Local file if cached, else the remote URL.
    pub async fn resolve_path(&self, entity_id: &str, remote_hint: Option<&str>) -> AssetLocation {
        if self.settings.local_files_available && self.exists(entity_id).await {
            if let Ok(path) = self.path_for(entity_id) {
                return AssetLocation::Local(path);
            }
        }
        AssetLocation::Remote(self.remote_url(entity_id, remote_hint))
    }

    /// Downloads one image into the cache.
    ///
    /// The body is written to `{id}.jpg.part` and renamed into place, so a
    /// reader never sees a partial file.
    pub async fn download(&self, url: &str, entity_id: &str) -> Result<(), AssetError> {
        if !self.settings.local_files_available {
            return Ok(());
        }

        let target = self.path_for(entity_id)?;
        let partial = target.with_extension("jpg.part");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AssetError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(AssetError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| AssetError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        tokio::fs::create_dir_all(&self.settings.dir)
            .await
            .map_err(|e| io_error(&self.settings.dir, e))?;

        if let Err(e) = tokio::fs::write(&partial, &bytes).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(io_error(&partial, e));
        }
        if let Err(e) = tokio::fs::rename(&partial, &target).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(io_error(&target, e));
        }

        debug!(entity_id = %entity_id, bytes = bytes.len(), "Image cached");
        Ok(())
    }

    /// Downloads many images, a bounded chunk at a time.
    pub async fn download_batch(&self, requests: &[AssetRequest]) -> BatchDownloadReport {
        let mut report = BatchDownloadReport::default();
        if !self.settings.local_files_available || requests.is_empty() {
            return report;
        }

        report.total = requests.len();
        let chunk_size = self.settings.max_concurrent_downloads.max(1);
        let chunks: Vec<&[AssetRequest]> = requests.chunks(chunk_size).collect();

        for (index, chunk) in chunks.iter().enumerate() {
            let results = join_all(
                chunk
                    .iter()
                    .map(|request| self.download(&request.url, &request.entity_id)),
            )
            .await;

            for (request, result) in chunk.iter().zip(results) {
                match result {
                    Ok(()) => report.success_count += 1,
                    Err(e) => {
                        warn!(entity_id = %request.entity_id, error = %e, "Image download failed");
                        report.failed_count += 1;
                        report.errors.push(AssetFailure {
                            entity_id: request.entity_id.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }

            if index + 1 < chunks.len() && self.settings.batch_pause_ms > 0 {
                tokio::time::sleep(self.settings.batch_pause()).await;
            }
        }

        info!(
            total = report.total,
            success = report.success_count,
            failed = report.failed_count,
            "Image batch finished"
        );
        report
    }

    /// Removes one cached image. Returns `false` if there was none.
    pub async fn delete(&self, entity_id: &str) -> Result<bool, AssetError> {
        let path = self.path_for(entity_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    /// Deletes the whole cache directory. Part of a local reset only.
    pub async fn evict_all(&self) -> Result<(), AssetError> {
        match tokio::fs::remove_dir_all(&self.settings.dir).await {
            Ok(()) => {
                info!(dir = %self.settings.dir.display(), "Image cache evicted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&self.settings.dir, e)),
        }
    }

    /// Number of complete images on disk.
    pub async fn cached_count(&self) -> usize {
        self.cached_files().await.len()
    }

    /// Bytes used by complete images.
    pub async fn cache_size_bytes(&self) -> u64 {
        self.cached_files().await.iter().map(|(_, len)| len).sum()
    }

    async fn cached_files(&self) -> Vec<(PathBuf, u64)> {
        let mut files = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&self.settings.dir).await else {
            return files;
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("jpg") {
                continue;
            }
            if let Ok(meta) = entry.metadata().await {
                if meta.is_file() {
                    files.push((path, meta.len()));
                }
            }
        }
        files
    }
}

fn io_error(path: &Path, err: std::io::Error) -> AssetError {
    AssetError::Io {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(dir: &TempDir) -> AssetSettings {
        AssetSettings {
            dir: dir.path().join("images"),
            max_concurrent_downloads: 5,
            batch_pause_ms: 1,
            local_files_available: true,
        }
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_remote_until_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/uploads/products/p-1.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF]))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let cache = AssetCache::new(settings(&dir), server.uri()).unwrap();

        let before = cache.resolve_path("p-1", None).await;
        assert_eq!(
            before,
            AssetLocation::Remote(format!("{}/uploads/products/p-1.jpg", server.uri()))
        );

        let url = cache.remote_url("p-1", None);
        cache.download(&url, "p-1").await.unwrap();

        assert!(cache.exists("p-1").await);
        let after = cache.resolve_path("p-1", None).await;
        assert_eq!(after, AssetLocation::Local(dir.path().join("images").join("p-1.jpg")));
        assert_eq!(cache.cached_count().await, 1);
        assert_eq!(cache.cache_size_bytes().await, 3);
    }

    #[tokio::test]
    async fn test_failed_download_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let cache = AssetCache::new(settings(&dir), server.uri()).unwrap();

        let err = cache
            .download(&cache.remote_url("p-9", None), "p-9")
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::Status { status: 404, .. }));
        assert!(!cache.exists("p-9").await);
        assert_eq!(cache.cached_count().await, 0);
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/uploads/products/p-3.jpg"))
            .respond_with(ResponseTemplate::new(500))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/uploads/products/p-\d+\.jpg$"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 16]))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let cache = AssetCache::new(settings(&dir), server.uri()).unwrap();
        let requests: Vec<AssetRequest> = (1..=12)
            .map(|i| {
                let id = format!("p-{i}");
                AssetRequest {
                    url: cache.remote_url(&id, None),
                    entity_id: id,
                }
            })
            .collect();

        let report = cache.download_batch(&requests).await;
        assert_eq!(report.total, 12);
        assert_eq!(report.success_count, 11);
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.errors[0].entity_id, "p-3");
        assert_eq!(cache.cached_count().await, 11);
    }

    #[tokio::test]
    async fn test_without_local_files_everything_is_remote() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(&dir);
        settings.local_files_available = false;
        let cache = AssetCache::new(settings, "https://ventas.example.com/").unwrap();

        let location = cache
            .resolve_path("p-1", Some("/uploads/products/p-1-large.jpg"))
            .await;
        assert_eq!(
            location,
            AssetLocation::Remote("https://ventas.example.com/uploads/products/p-1-large.jpg".into())
        );

        let report = cache
            .download_batch(&[AssetRequest {
                entity_id: "p-1".into(),
                url: "https://ventas.example.com/uploads/products/p-1.jpg".into(),
            }])
            .await;
        assert_eq!(report, BatchDownloadReport::default());
    }

    #[tokio::test]
    async fn test_delete_and_evict() {
        let dir = TempDir::new().unwrap();
        let cache = AssetCache::new(settings(&dir), "http://localhost").unwrap();

        tokio::fs::create_dir_all(cache.dir()).await.unwrap();
        tokio::fs::write(cache.path_for("p-1").unwrap(), b"x").await.unwrap();
        tokio::fs::write(cache.path_for("p-2").unwrap(), b"y").await.unwrap();

        assert!(cache.delete("p-1").await.unwrap());
        assert!(!cache.delete("p-1").await.unwrap());
        assert!(cache.exists("p-2").await);

        cache.evict_all().await.unwrap();
        assert!(!cache.exists("p-2").await);
        assert!(!cache.dir().exists());
        cache.evict_all().await.unwrap();
    }

    #[test]
    fn test_rejects_path_like_ids() {
        let dir = TempDir::new().unwrap();
        let cache = AssetCache::new(settings(&dir), "http://localhost").unwrap();
        assert!(cache.path_for("../etc/passwd").is_err());
        assert!(cache.path_for("").is_err());
        assert!(cache.path_for("p-1").is_ok());
    }
}
