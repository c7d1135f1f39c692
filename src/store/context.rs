/*!
 * Store Context
 * Per-mount state shared by the store, its hooks and its background tasks
 */

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::RandomState;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use super::cache::ContentCache;
use super::stats::StoreStats;
use crate::config::Config;
use crate::repo::{DocMetadata, NewDocument, Repository};
use crate::vfs::types::{UvfsError, UvfsResult};
use crate::vfs::{Expiry, Owner};

pub const SEARCHES_FILE: &str = "searches.txt";

/// Everything a population hook or uploader may touch besides the tree
pub struct StoreContext {
    pub config: Config,
    pub repo: Arc<dyn Repository>,
    pub cache: Option<ContentCache>,
    pub stats: StoreStats,
    metadata: DashMap<String, Arc<DocMetadata>, RandomState>,
    state_dir: PathBuf,
    shutdown: AtomicBool,
}

impl std::fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreContext")
            .field("repo_url", &self.config.repo_url)
            .field("state_dir", &self.state_dir)
            .field("cached_metadata", &self.metadata.len())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl StoreContext {
    pub fn new(config: Config, repo: Arc<dyn Repository>, state_dir: PathBuf) -> UvfsResult<Self> {
        std::fs::create_dir_all(&state_dir)?;
        let cache = if config.cache_content {
            Some(ContentCache::new(state_dir.join("cache"))?)
        } else {
            None
        };
        Ok(Self {
            config,
            repo,
            cache,
            stats: StoreStats::new(),
            metadata: DashMap::with_hasher(RandomState::new()),
            state_dir,
            shutdown: AtomicBool::new(false),
        })
    }

    #[inline]
    #[must_use]
    pub fn owner(&self) -> Owner {
        self.config.owner()
    }

    #[must_use]
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    #[must_use]
    pub fn searches_file(&self) -> PathBuf {
        self.state_dir.join(SEARCHES_FILE)
    }

    /// Expiry for a freshly fetched node
    #[inline]
    #[must_use]
    pub fn fresh_until(&self) -> Expiry {
        Expiry::after(self.config.expire_interval)
    }

    /// Cached metadata for `id`, fetched on a miss
    pub fn metadata(&self, id: &str) -> UvfsResult<Arc<DocMetadata>> {
        if let Some(md) = self.metadata.get(id) {
            return Ok(Arc::clone(&md));
        }
        self.refresh_metadata(id)
    }

    /// Fetch metadata for `id` regardless of the cache
    pub fn refresh_metadata(&self, id: &str) -> UvfsResult<Arc<DocMetadata>> {
        self.repo
            .metadata_for_docs(&[id.to_string()])?
            .into_iter()
            .find(|md| md.id == id)
            .map(|md| self.remember(md))
            .ok_or_else(|| UvfsError::NotFound(format!("no document with id {}", id)))
    }

    #[must_use]
    pub fn cached_metadata(&self, id: &str) -> Option<Arc<DocMetadata>> {
        self.metadata.get(id).map(|md| Arc::clone(&md))
    }

    pub fn remember(&self, md: DocMetadata) -> Arc<DocMetadata> {
        let md = Arc::new(md);
        self.metadata.insert(md.id.clone(), Arc::clone(&md));
        md
    }

    /// Decoded document icon; empty when there is none or it cannot be read
    #[must_use]
    pub fn icon_for(&self, id: &str) -> Vec<u8> {
        match self.metadata(id).and_then(|md| md.icon()) {
            Ok(icon) => icon,
            Err(e) => {
                warn!(doc_id = id, error = %e, "no icon for document");
                Vec::new()
            }
        }
    }

    /// Upload through the repository, returning the new document id
    pub fn add_document(&self, doc: &NewDocument) -> UvfsResult<String> {
        let id = self.repo.add_document(doc)?;
        info!(title = %doc.title, doc_id = %id, bytes = doc.content.len(), "document committed");
        Ok(id)
    }

    pub fn delete_document(&self, doc_id: &str) -> UvfsResult<()> {
        self.repo.delete_document(doc_id)?;
        self.metadata.remove(doc_id);
        debug!(doc_id, "document deleted");
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn begin_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Block until every uploader has exited; `false` on timeout
    pub fn wait_for_uploads(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.stats.active_uploaders() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        true
    }
}
