/*!
 * File Operations
 * Open, read, write and the release-time write-back decision
 */

use std::sync::Arc;
use std::time::SystemTime;

use tracing::debug;

use super::fd_table::OpenFile;
use super::{require_writable, Uvfs};
use crate::store::uploader;
use crate::vfs::paths::classify;
use crate::vfs::types::{S_IRWXU, S_IWUSR};
use crate::vfs::{FileType, Node, OpenFlags, Pathname, UvfsError, UvfsResult};

impl Uvfs {
    /// Open a regular file, starting a write session for write access
    ///
    /// Symlinks are followed, so a file opened through a category listing
    /// is the document's original.
    pub fn open(&self, path: &str, flags: OpenFlags) -> UvfsResult<u64> {
        self.traced("open", path, |path| {
            if path.is_root() {
                return Err(UvfsError::denied("cannot open the root"));
            }
            let path = self.store.chase_symlinks(path)?;
            let parent = path.parent().unwrap_or_else(Pathname::root);
            let parent_is_dir = self
                .store
                .with_node(&parent, |node| node.file_type() == FileType::Directory)?;
            if !parent_is_dir {
                return Err(UvfsError::not_found(&parent));
            }

            let (file, stat) = self
                .store
                .with_file_node(&path, |node| (node.as_file().cloned(), node.stat()))?;
            let file = file.ok_or_else(|| UvfsError::denied(format!("{} is not a file", path)))?;

            let writable = flags.is_writable();
            if writable {
                require_writable(stat.is_writable(), &path)?;
                file.lock().begin_shadow(flags.truncate)?;
            }
            let fd = self.fds.insert(OpenFile {
                path,
                file,
                writable,
                stat,
            });
            debug!(fd, writable, "opened");
            Ok(fd)
        })
    }

    /// Create an empty file and open it for writing
    pub fn create(&self, path: &str, mode: u32) -> UvfsResult<u64> {
        self.traced("create", path, |path| {
            let (parent, name) = path.split()?;
            let (parent_is_dir, parent_writable) = self.store.with_node(&parent, |node| {
                (node.as_dir().is_some(), node.attrs.stat.is_writable())
            })?;
            if !parent_is_dir {
                return Err(UvfsError::not_found(&parent));
            }
            require_writable(parent_writable, &parent)?;

            let mut node = Node::created_file(name.as_str(), self.store.ctx().owner());
            node.attrs.stat.set_owner_bits((mode | S_IWUSR) & S_IRWXU);
            let file = node
                .as_file()
                .map(Arc::clone)
                .ok_or_else(|| UvfsError::InvalidArgument(format!("{} is not a file", path)))?;
            let stat = node.stat();
            self.store.insert(path, node)?;

            let fd = self.fds.insert(OpenFile {
                path: path.clone(),
                file,
                writable: true,
                stat,
            });
            debug!(fd, "created");
            Ok(fd)
        })
    }

    /// Read up to `size` bytes at `offset`; the writer reads its own shadow
    pub fn read(&self, fd: u64, size: usize, offset: u64) -> UvfsResult<Vec<u8>> {
        self.traced_fd("read", fd, |open| {
            let mut state = open.file.lock();
            Ok(state.visible_content(open.writable).read_at(offset, size)?)
        })
    }

    /// Write into the descriptor's shadow copy
    pub fn write(&self, fd: u64, data: &[u8], offset: u64) -> UvfsResult<usize> {
        self.traced_fd("write", fd, |open| {
            if !open.writable {
                return Err(UvfsError::denied(format!("{} is not open for writing", open.path)));
            }
            let written = {
                let mut state = open.file.lock();
                let shadow = state
                    .shadow_mut()
                    .ok_or_else(|| UvfsError::denied(format!("{} has no write session", open.path)))?;
                let written = shadow.content.write_at(offset, data)?;
                shadow.mtime = SystemTime::now();
                written
            };
            if let Some(parent) = open.path.parent() {
                if let Err(e) = self.store.touch(&parent) {
                    debug!(error = %e, "parent not touched");
                }
            }
            Ok(written)
        })
    }

    /// Close a descriptor; a finished write session is merged into the file
    /// and, for documents and category drops, queued for upload
    ///
    /// Upload failures are logged by the uploader and never reported here.
    pub fn release(&self, fd: u64) -> UvfsResult<()> {
        self.traced_fd("release", fd, |open| {
            self.fds.remove(fd)?;
            if !open.writable {
                return Ok(());
            }
            let target = classify(&open.path);
            let mut state = open.file.lock();
            let Some(shadow) = state.take_shadow() else {
                return Ok(());
            };
            state.merge(shadow)?;
            match target {
                Some(target) => {
                    uploader::request_commit(&self.store, &open.file, &mut state, target);
                }
                None => debug!("kept locally"),
            }
            Ok(())
        })
    }

    /// Truncate through `fd`, or through a short write session when none is
    /// given
    pub fn truncate(&self, path: &str, length: u64, fd: Option<u64>) -> UvfsResult<()> {
        if let Some(fd) = fd {
            return self.traced_fd("truncate", fd, |open| {
                if !open.writable {
                    return Err(UvfsError::denied(format!("{} is not open for writing", open.path)));
                }
                let mut state = open.file.lock();
                let shadow = state
                    .shadow_mut()
                    .ok_or_else(|| UvfsError::denied(format!("{} has no write session", open.path)))?;
                shadow.content.truncate(length)?;
                shadow.mtime = SystemTime::now();
                Ok(())
            });
        }
        let fd = self.open(path, OpenFlags::write_only())?;
        let truncated = self.truncate(path, length, Some(fd));
        let released = self.release(fd);
        truncated.and(released)
    }

    pub fn flush(&self, fd: u64) -> UvfsResult<()> {
        self.fds.get(fd).map(|_| ())
    }

    pub fn fsync(&self, fd: u64, _datasync: bool) -> UvfsResult<()> {
        self.fds.get(fd).map(|_| ())
    }
}
