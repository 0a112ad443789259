//! Read-through disk caching for symbol stores.
//!
//! A [`FileCache`] sits in front of an upstream store. Hits are served from
//! disk with the provenance chain reconstructed from a sidecar record;
//! misses delegate upstream and ingest the winning stream atomically
//! (spool to a temp file, write the sidecar, rename into place).

mod info;

pub use info::{CacheFileInfo, UpstreamQuery};

use crate::diagnostics::{Diagnostics, Outcome};
use crate::error::StoreError;
use crate::key::SymbolKey;
use crate::result::{file_stream, SearchResult};
use crate::store::{CacheValidityPolicy, SymbolStore};
use async_trait::async_trait;
use sha1::{Digest, Sha1};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const SIDECAR_SUFFIX: &str = ".cache_info";

/// Default cache root: `Symbols` under the OS temp directory.
pub fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("Symbols")
}

/// On-disk layout policy for a [`FileCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLayout {
    /// Flat `<root>/<key>`. No sidecar is kept, so provenance is lost on
    /// later hits.
    Legacy,
    /// `<root>/<dir(key)>/<identity-hash>/<file(key)>` with a
    /// `.cache_info` sidecar. Distinct upstreams serving different files
    /// for the same key land in distinct directories.
    IdentityPartitioned,
}

/// Read-through disk cache over an upstream store.
pub struct FileCache {
    root: PathBuf,
    name: String,
    upstream: Arc<dyn SymbolStore>,
    layout: CacheLayout,
}

impl FileCache {
    /// Flat-layout cache compatible with pre-existing cache roots.
    pub fn legacy(root: PathBuf, upstream: Arc<dyn SymbolStore>) -> Result<Self, StoreError> {
        Self::with_layout(root, upstream, CacheLayout::Legacy)
    }

    /// Identity-partitioned cache; one root can host the same key from
    /// several upstreams without collision.
    pub fn identity_partitioned(
        root: PathBuf,
        upstream: Arc<dyn SymbolStore>,
    ) -> Result<Self, StoreError> {
        Self::with_layout(root, upstream, CacheLayout::IdentityPartitioned)
    }

    fn with_layout(
        root: PathBuf,
        upstream: Arc<dyn SymbolStore>,
        layout: CacheLayout,
    ) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&root)?;
        let name = root.display().to_string();
        Ok(Self {
            root,
            name,
            upstream,
            layout,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> CacheLayout {
        self.layout
    }

    /// Where `key` lives (or would live) under this cache root.
    fn cache_lookup_path(&self, key: &SymbolKey) -> PathBuf {
        if self.layout == CacheLayout::IdentityPartitioned
            && let Some(identity) = self.upstream.file_identity(key)
        {
            let mut path = self.root.clone();
            let dir = key.dir();
            if !dir.is_empty() {
                for segment in dir.split('/') {
                    path.push(segment);
                }
            }
            path.push(identity_dir_name(&identity));
            path.push(key.file_name());
            return path;
        }
        self.root.join(key.to_rel_path())
    }

    fn sidecar_path(local_path: &Path) -> PathBuf {
        let mut path = local_path.as_os_str().to_os_string();
        path.push(SIDECAR_SUFFIX);
        PathBuf::from(path)
    }

    async fn lookup_cache_info(&self, local_path: &Path) -> Option<CacheFileInfo> {
        if self.layout == CacheLayout::Legacy {
            return None;
        }
        let text = tokio::fs::read_to_string(Self::sidecar_path(local_path))
            .await
            .ok()?;
        match CacheFileInfo::parse(&text) {
            Ok(info) => Some(info),
            Err(err) => {
                warn!(
                    "ignoring malformed sidecar for {}: {err}",
                    local_path.display()
                );
                None
            }
        }
    }

    fn create_cache_info(&self, local_path: &Path, result: &SearchResult) -> CacheFileInfo {
        let local = local_path.display().to_string();
        match self.layout {
            CacheLayout::Legacy => CacheFileInfo {
                file_identity: local,
                upstream_queries: Vec::new(),
            },
            CacheLayout::IdentityPartitioned => CacheFileInfo::from_diagnostics(
                result.identity().map(str::to_string).unwrap_or(local),
                result.diagnostics(),
            ),
        }
    }

    async fn write_cache_info(&self, local_path: &Path, info: &CacheFileInfo) -> io::Result<()> {
        if self.layout == CacheLayout::Legacy {
            return Ok(());
        }
        let text = info.format().map_err(io::Error::other)?;
        tokio::fs::write(Self::sidecar_path(local_path), text).await
    }

    /// Spools the upstream stream to a temp file, records the sidecar, and
    /// renames the content into place. The rename is the commit point; a
    /// failure anywhere earlier leaves nothing at `local_path`.
    async fn ingest(
        &self,
        local_path: &Path,
        info: &CacheFileInfo,
        result: &mut SearchResult,
        cancel: &CancellationToken,
    ) -> io::Result<()> {
        let mut reader = match result.open_stream().await {
            Some(stream) => stream?,
            None => return Err(io::Error::other("upstream result had no stream")),
        };

        let spool = tempfile::NamedTempFile::new()?.into_temp_path();
        let mut file = tokio::fs::File::create(&spool).await?;
        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(io::Error::other("cancelled while spooling"));
            }
            copied = tokio::io::copy(&mut reader, &mut file) => {
                copied?;
            }
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Sidecar before content: the rename below is what makes the entry
        // visible, and a sidecar with no content is overwritten on the next
        // miss.
        self.write_cache_info(local_path, info).await?;
        tokio::fs::rename(&spool, local_path).await?;
        let _ = spool.keep();
        Ok(())
    }

    fn success(
        &self,
        local_path: &Path,
        identity: String,
        upstream: Option<Diagnostics>,
    ) -> SearchResult {
        SearchResult::new(
            Outcome::Success,
            &self.name,
            Some(identity),
            Some(local_path.display().to_string()),
            OffsetDateTime::now_utc(),
            upstream,
            Some(file_stream(local_path.to_path_buf())),
        )
    }

    fn not_found(
        &self,
        local_path: &Path,
        query_time: OffsetDateTime,
        upstream: Option<Diagnostics>,
    ) -> SearchResult {
        let local = local_path.display().to_string();
        SearchResult::new(
            Outcome::NotFound,
            &self.name,
            Some(local.clone()),
            Some(local),
            query_time,
            upstream,
            None,
        )
    }
}

#[async_trait]
impl SymbolStore for FileCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn file_identity(&self, key: &SymbolKey) -> Option<String> {
        match self.layout {
            CacheLayout::Legacy => Some(self.cache_lookup_path(key).display().to_string()),
            CacheLayout::IdentityPartitioned => self
                .upstream
                .file_identity(key)
                .or_else(|| Some(self.cache_lookup_path(key).display().to_string())),
        }
    }

    async fn find(
        &self,
        key: &SymbolKey,
        cancel: &CancellationToken,
        policy: &CacheValidityPolicy,
    ) -> Option<SearchResult> {
        let local_path = self.cache_lookup_path(key);
        let query_time = OffsetDateTime::now_utc();

        if tokio::fs::try_exists(&local_path).await.unwrap_or(false) {
            debug!("cache hit for {key} at {}", local_path.display());
            let (identity, upstream) = match self.lookup_cache_info(&local_path).await {
                Some(info) => {
                    let upstream = info.to_diagnostics();
                    (info.file_identity, upstream)
                }
                None => (local_path.display().to_string(), None),
            };
            return Some(self.success(&local_path, identity, upstream));
        }

        let Some(mut result) = self.upstream.find(key, cancel, policy).await else {
            debug!("cache miss for {key}; no upstream answered");
            return Some(self.not_found(&local_path, query_time, None));
        };
        if result.outcome() != Outcome::Success {
            return Some(self.not_found(
                &local_path,
                query_time,
                Some(result.diagnostics().clone()),
            ));
        }

        let info = self.create_cache_info(&local_path, &result);
        match self.ingest(&local_path, &info, &mut result, cancel).await {
            Ok(()) => {
                let upstream = info.to_diagnostics();
                Some(self.success(&local_path, info.file_identity, upstream))
            }
            Err(err) => {
                warn!(
                    "failed to cache {key} at {}: {err}",
                    local_path.display()
                );
                Some(self.not_found(
                    &local_path,
                    OffsetDateTime::now_utc(),
                    Some(result.diagnostics().clone()),
                ))
            }
        }
    }
}

/// Lowercase hex of the first 8 bytes of `SHA-1(identity)`: a short, stable
/// directory name partitioning one cache root by answering upstream.
fn identity_dir_name(identity: &str) -> String {
    let digest = Sha1::digest(identity.as_bytes());
    digest[..8].iter().map(|byte| format!("{byte:02x}")).collect()
}
