/*!
 * Content Cache
 * On-disk copies of fetched originals, keyed by content hash or mount path
 */

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::vfs::types::{Pathname, UvfsResult};
use crate::vfs::Content;

/// `hashes/<sha>` and `paths/<mount path>` under one root
#[derive(Debug, Clone)]
pub struct ContentCache {
    root: PathBuf,
}

impl ContentCache {
    pub fn new(root: impl Into<PathBuf>) -> UvfsResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn hash_file(&self, hash: &str) -> PathBuf {
        self.root.join("hashes").join(sanitize(hash))
    }

    fn path_file(&self, path: &Pathname) -> PathBuf {
        path.as_str()
            .split('/')
            .filter(|c| !c.is_empty())
            .fold(self.root.join("paths"), |acc, c| acc.join(sanitize(c)))
    }

    #[must_use]
    pub fn cached_hash(&self, hash: &str) -> Option<Content> {
        let file = self.hash_file(hash);
        file.is_file().then(|| Content::lazy(file))
    }

    #[must_use]
    pub fn cached_path(&self, path: &Pathname) -> Option<Content> {
        let file = self.path_file(path);
        file.is_file().then(|| Content::lazy(file))
    }

    pub fn store_hash(&self, bytes: &[u8], hash: &str) -> UvfsResult<Content> {
        write_file(&self.hash_file(hash), bytes)
    }

    pub fn store_path(&self, bytes: &[u8], path: &Pathname) -> UvfsResult<Content> {
        write_file(&self.path_file(path), bytes)
    }
}

fn write_file(file: &Path, bytes: &[u8]) -> UvfsResult<Content> {
    if let Some(dir) = file.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(file, bytes)?;
    debug!(file = %file.display(), bytes = bytes.len(), "cached content");
    Ok(Content::lazy(file))
}

/// Keep cache keys inside the cache root
fn sanitize(component: &str) -> String {
    match component {
        "." | ".." => "_".repeat(component.len()),
        _ => component.replace(['\\', '\0'], "_"),
    }
}
