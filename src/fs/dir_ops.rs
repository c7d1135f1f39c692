/*!
 * Directory Operations
 * Listing, creation, removal, renaming and links
 */

use tracing::{debug, warn};

use super::{require_writable, Uvfs};
use crate::vfs::paths::{
    is_placeholder_folder, search_query, top_level, CATEGORIES, DOCS, ICON_NAME, SEARCH,
};
use crate::vfs::{FileType, Filename, Node, Pathname, UvfsError, UvfsResult};

/// The root, `docs`, `categories` and `search` cannot be moved or removed
fn require_not_fixed(path: &Pathname) -> UvfsResult<()> {
    let fixed = path.is_root() || [DOCS, CATEGORIES, SEARCH].iter().any(|name| *path == top_level(name));
    if fixed {
        return Err(UvfsError::denied(format!("{} is part of the fixed layout", path)));
    }
    Ok(())
}

impl Uvfs {
    /// Sorted entry names, without the custom-icon file
    pub fn readdir(&self, path: &str) -> UvfsResult<Vec<String>> {
        self.traced("readdir", path, |path| {
            let names = self.store.with_node(path, |node| {
                node.as_dir().map(|dir| {
                    dir.entries
                        .keys()
                        .filter(|name| name.as_str() != ICON_NAME)
                        .map(|name| name.as_str().to_string())
                        .collect::<Vec<_>>()
                })
            })?;
            let mut names = names.ok_or_else(|| UvfsError::not_found(path))?;
            names.sort();
            Ok(names)
        })
    }

    /// Make a directory; directly under `/search` this saves a search
    pub fn mkdir(&self, path: &str, _mode: u32) -> UvfsResult<()> {
        self.traced("mkdir", path, |path| {
            let (parent, name) = path.split()?;
            if path.starts_with(&top_level(CATEGORIES)) {
                return Err(UvfsError::denied("categories are filled in by the repository"));
            }
            let (parent_is_dir, parent_writable) = self.store.with_node(&parent, |node| {
                (node.as_dir().is_some(), node.attrs.stat.is_writable())
            })?;
            if !parent_is_dir {
                return Err(UvfsError::not_found(&parent));
            }
            if self.store.exists(path) {
                return Err(UvfsError::AlreadyExists(path.to_string()));
            }

            if search_query(path).is_some() && !is_placeholder_folder(name.as_str()) {
                return self.store.add_search(name.as_str());
            }
            require_writable(parent_writable, &parent)?;
            let dir = Node::directory(name.as_str(), self.store.ctx().owner()).writable();
            self.store.insert(path, dir)
        })
    }

    /// Remove an empty directory
    ///
    /// AppleDouble companions do not count as content, and a saved search
    /// drops its result links first.
    pub fn rmdir(&self, path: &str) -> UvfsResult<()> {
        self.traced("rmdir", path, |path| {
            require_not_fixed(path)?;
            let is_query = search_query(path).is_some();
            let empty = self.store.update(path, |node| {
                let dir = node
                    .as_dir_mut()
                    .ok_or_else(|| UvfsError::denied(format!("{} is not a directory", path)))?;
                if is_query {
                    dir.entries.retain(|_, child| child.file_type() != FileType::Symlink);
                }
                if dir.entries.keys().all(Filename::is_xattr_shadow) {
                    dir.entries.clear();
                }
                Ok::<_, UvfsError>(dir.entries.is_empty())
            })??;
            if !empty {
                return Err(UvfsError::denied(format!("{} is not empty", path)));
            }
            self.store.remove(path)?;

            let (parent, name) = path.split()?;
            let companion = parent.join(&Filename::new(format!("._{}", name))?);
            match self.store.remove(&companion) {
                Ok(_) => debug!(path = %companion, "companion removed"),
                Err(UvfsError::NotFound(_)) => {}
                Err(e) => warn!(path = %companion, error = %e, "companion not removed"),
            }
            Ok(())
        })
    }

    /// Remove a file or symlink
    pub fn unlink(&self, path: &str) -> UvfsResult<()> {
        self.traced("unlink", path, |path| {
            let file_type = self.store.with_node(path, |node| node.file_type())?;
            if file_type == FileType::Directory {
                return Err(UvfsError::InvalidArgument(format!("{} is a directory", path)));
            }
            self.store.remove(path).map(|_| ())
        })
    }

    /// Move `old` to `new`, which must not exist yet
    pub fn rename(&self, old: &str, new: &str) -> UvfsResult<()> {
        self.traced("rename", old, |old| {
            let new = Pathname::normalized(new)?;
            require_not_fixed(old)?;
            require_not_fixed(&new)?;
            self.store.rename(old, &new)
        })
    }

    pub fn readlink(&self, path: &str) -> UvfsResult<String> {
        self.traced("readlink", path, |path| {
            self.store
                .with_node(path, |node| node.symlink_target().map(str::to_string))?
                .ok_or_else(|| UvfsError::denied(format!("{} is not a symlink", path)))
        })
    }

    /// Hard links are not supported
    pub fn link(&self, _source: &str, target: &str) -> UvfsResult<()> {
        self.traced("link", target, |path| {
            Err(UvfsError::denied(format!("cannot link {}", path)))
        })
    }

    /// Symlinks are only ever made by the repository listings
    pub fn symlink(&self, _source: &str, target: &str) -> UvfsResult<()> {
        self.traced("symlink", target, |path| {
            Err(UvfsError::denied(format!("cannot symlink {}", path)))
        })
    }
}
