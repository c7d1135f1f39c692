/*!
 * Filesystem Adapter
 * POSIX-shaped operations over the backing store
 *
 * Paths arrive as the strings a filesystem bridge hands over; every
 * operation runs inside an `fs_op` span and reports failures as
 * [`UvfsError`], whose [`UvfsError::errno`] is what the caller sees.
 */

mod dir_ops;
mod fd_table;
mod file_ops;
mod metadata_ops;
mod xattr;

pub use fd_table::{FdTable, OpenFile};
pub use xattr::{DOC_ID_ATTR, FINDER_INFO_ATTR, RESOURCE_FORK_ATTR, TEXT_ENCODING_ATTR};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::monitoring::FsOpSpan;
use crate::repo::Repository;
use crate::store::Store;
use crate::vfs::{Pathname, UvfsError, UvfsResult};

/// A mounted repository as seen by a filesystem bridge
#[derive(Debug)]
pub struct Uvfs {
    store: Arc<Store>,
    fds: FdTable,
}

impl Uvfs {
    /// Connect to `repo` and build the mount
    pub fn mount(config: Config, repo: Arc<dyn Repository>) -> UvfsResult<Self> {
        Ok(Self::new(Store::mount(config, repo)?))
    }

    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            fds: FdTable::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Descriptors currently open
    #[must_use]
    pub fn open_files(&self) -> usize {
        self.fds.len()
    }

    /// Start background polling once the mount is live
    pub fn init(&self) -> UvfsResult<()> {
        self.store.start_poller()?;
        info!("filesystem initialized");
        Ok(())
    }

    /// Persist saved searches and stop background work
    ///
    /// Returns `false` if uploads were still running when `timeout` ran out.
    pub fn destroy(&self, timeout: Duration) -> bool {
        if let Err(e) = self.store.persist_searches() {
            warn!(error = %e, "could not persist saved searches");
        }
        let drained = self.store.shutdown(timeout);
        info!(drained, "filesystem destroyed");
        drained
    }

    /// Run `f` inside an `fs_op` span, recording any error on it
    fn traced<R>(
        &self,
        op: &'static str,
        path: &str,
        f: impl FnOnce(&Pathname) -> UvfsResult<R>,
    ) -> UvfsResult<R> {
        let span = FsOpSpan::new(op, path);
        let _entered = span.enter();
        let result = Pathname::normalized(path).and_then(|path| f(&path));
        if let Err(e) = &result {
            span.record_error(e);
        }
        result
    }

    /// Like [`Uvfs::traced`] for operations addressed by descriptor
    fn traced_fd<R>(
        &self,
        op: &'static str,
        fd: u64,
        f: impl FnOnce(OpenFile) -> UvfsResult<R>,
    ) -> UvfsResult<R> {
        let open = match self.fds.get(fd) {
            Ok(open) => open,
            Err(e) => {
                debug!(op, fd, "unknown descriptor");
                return Err(e);
            }
        };
        let span = FsOpSpan::new(op, open.path.as_str());
        let _entered = span.enter();
        let result = f(open);
        if let Err(e) = &result {
            span.record_error(e);
        }
        result
    }
}

/// Fail with `PermissionDenied` unless the node is writable
fn require_writable(writable: bool, path: &Pathname) -> UvfsResult<()> {
    if writable {
        Ok(())
    } else {
        Err(UvfsError::denied(format!("{} is read-only", path)))
    }
}
