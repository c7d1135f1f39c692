/*!
 * Backing Store
 * The in-memory mirror of the repository and its synchronization policy
 *
 * Lock order: a placeholder's expansion slot, then the tree, then the
 * expiry queue, then a file's state lock. Nothing takes the tree lock while
 * holding a file lock.
 */

pub mod cache;
pub mod context;
pub mod docs;
pub mod listings;
mod poller;
pub mod stats;
pub mod uploader;

pub use cache::ContentCache;
pub use context::StoreContext;
pub use stats::{StatsSnapshot, StoreStats};

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLock};
use time::OffsetDateTime;
use tracing::{debug, debug_span, info, warn};

use crate::config::Config;
use crate::repo::{NewDocument, Repository};
use crate::vfs::paths::{
    doc_id_of, is_placeholder_folder, search_query, top_level, CATEGORIES, DOCS, SEARCH,
};
use crate::vfs::{
    Deferred, ExpiryKey, ExpiryQueue, FileType, Filename, Node, NodeKind, Pathname, Tree, UvfsError,
    UvfsResult, Walk, WalkPolicy,
};

use docs::docs_entry;
use listings::{categories_hook, format_searches, query_placeholder, search_hook};

/// Symlinks followed before a path is declared unresolvable
pub const MAX_SYMLINK_HOPS: usize = 6;

/// Expansions one resolution may trigger before giving up
const MAX_EXPANSIONS: usize = 64;

const EXPAND: WalkPolicy = WalkPolicy {
    chase_file: false,
    refresh_stale: true,
};

const EXPAND_FILE: WalkPolicy = WalkPolicy {
    chase_file: true,
    refresh_stale: true,
};

enum Step {
    Expand(Pathname, Deferred),
    Refresh(Pathname),
}

/// Tree root, expiry bookkeeping and the background poller of one mount
pub struct Store {
    ctx: Arc<StoreContext>,
    tree: RwLock<Tree>,
    expiry: Mutex<ExpiryQueue>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("ctx", &self.ctx)
            .field("expiring", &self.expiry_len())
            .finish()
    }
}

impl Store {
    /// Connect to the repository and build the fixed top level
    pub fn mount(config: Config, repo: Arc<dyn Repository>) -> UvfsResult<Arc<Store>> {
        let (root, most_recent) = repo.root_and_most_recent()?;
        let state_dir = config
            .state_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(&root).join("overhead").join("UVFS"));
        let ctx = Arc::new(StoreContext::new(config, repo, state_dir)?);
        let owner = ctx.owner();

        let mut tree = Tree::new(Node::directory("/", owner).writable());
        let top = Pathname::root();
        tree.insert(&top, Filename::new(DOCS)?, Node::directory(DOCS, owner))?;
        tree.insert(
            &top,
            Filename::new(SEARCH)?,
            Node::deferred_directory(SEARCH, owner, search_hook(&ctx)).writable(),
        )?;
        tree.insert(
            &top,
            Filename::new(CATEGORIES)?,
            Node::deferred_directory(CATEGORIES, owner, categories_hook(&ctx)).writable(),
        )?;

        let store = Arc::new(Store {
            ctx,
            tree: RwLock::new(tree),
            expiry: Mutex::new(ExpiryQueue::new()),
            poller: Mutex::new(None),
        });
        info!(
            repository = %store.ctx.config.repo_url,
            root = %root,
            state_dir = %store.ctx.state_dir().display(),
            "mounted"
        );

        if let Some(id) = most_recent {
            if let Err(e) = store.create_docs_entry(&id) {
                warn!(doc_id = %id, error = %e, "most recent document unavailable");
            }
        }
        Ok(store)
    }

    #[inline]
    #[must_use]
    pub fn ctx(&self) -> &Arc<StoreContext> {
        &self.ctx
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.ctx.stats.snapshot()
    }

    /// Run `f` on the node at `path`, expanding directories on the way
    pub fn with_node<R>(&self, path: &Pathname, f: impl FnOnce(&Node) -> R) -> UvfsResult<R> {
        self.with_policy(path, EXPAND, f)
    }

    /// Like [`Store::with_node`], also expanding a deferred file at `path`
    pub fn with_file_node<R>(&self, path: &Pathname, f: impl FnOnce(&Node) -> R) -> UvfsResult<R> {
        self.with_policy(path, EXPAND_FILE, f)
    }

    fn with_policy<R>(
        &self,
        path: &Pathname,
        policy: WalkPolicy,
        f: impl FnOnce(&Node) -> R,
    ) -> UvfsResult<R> {
        for _ in 0..MAX_EXPANSIONS {
            self.expand_path(path, policy)?;
            let tree = self.tree.read();
            match tree.walk(path, policy) {
                Walk::Found(node) => return Ok(f(node)),
                Walk::Missing => return Err(UvfsError::not_found(path)),
                Walk::Pending { .. } => {}
            }
        }
        Err(UvfsError::not_found(path))
    }

    /// Mutate the node at `path` under the tree's write lock
    pub fn update<R>(&self, path: &Pathname, f: impl FnOnce(&mut Node) -> R) -> UvfsResult<R> {
        for _ in 0..MAX_EXPANSIONS {
            self.expand_path(path, EXPAND)?;
            let mut tree = self.tree.write();
            if let Ok(node) = tree.lookup_mut(path) {
                return Ok(f(node));
            }
        }
        Err(UvfsError::not_found(path))
    }

    /// Expand every placeholder and stale listing between the root and `path`
    fn expand_path(&self, path: &Pathname, policy: WalkPolicy) -> UvfsResult<()> {
        if let Some(id) = doc_id_of(path.as_str()) {
            self.create_docs_entry(id)?;
        }
        for _ in 0..MAX_EXPANSIONS {
            let step = {
                let tree = self.tree.read();
                match tree.walk(path, policy) {
                    Walk::Found(_) => return Ok(()),
                    Walk::Missing => return Err(UvfsError::not_found(path)),
                    Walk::Pending { at, node } => match &node.kind {
                        NodeKind::DeferredDirectory(deferred) | NodeKind::DeferredFile(deferred) => {
                            Step::Expand(at, deferred.clone())
                        }
                        _ => Step::Refresh(at),
                    },
                }
            };
            match step {
                Step::Expand(at, deferred) => self.expand(&at, &deferred)?,
                Step::Refresh(at) => self.redefer(&at),
            }
        }
        Err(UvfsError::not_found(path))
    }

    /// Run a placeholder's hook once and swap in what it built
    fn expand(&self, at: &Pathname, deferred: &Deferred) -> UvfsResult<()> {
        let mut done = deferred.lock();
        if *done {
            return Ok(());
        }
        let _span = debug_span!("expand", path = %at).entered();
        self.ctx.stats.inc_hook_runs();
        let node = (deferred.hook())(at).map_err(|e| {
            warn!(path = %at, error = %e, "expansion failed");
            e
        })?;
        *done = true;

        let mut keys = Vec::new();
        expiring_keys(&node, at, &mut keys);
        let mut tree = self.tree.write();
        let current = match tree.lookup(at) {
            Ok(current) => current,
            Err(_) => return Ok(()),
        };
        let still_placeholder = matches!(
            &current.kind,
            NodeKind::DeferredDirectory(d) | NodeKind::DeferredFile(d) if d.same(deferred)
        );
        if !still_placeholder {
            debug!(path = %at, "placeholder replaced during expansion; result dropped");
            return Ok(());
        }
        tree.replace(at, node)?;
        if !keys.is_empty() {
            let mut expiry = self.expiry.lock();
            for (deadline, key) in keys {
                expiry.put(deadline, key);
            }
        }
        debug!(path = %at, "expanded");
        Ok(())
    }

    /// Swap a stale, idle listing for a placeholder that re-fetches it
    fn redefer(&self, at: &Pathname) {
        let mut tree = self.tree.write();
        let Ok(node) = tree.lookup(at) else {
            return;
        };
        if !node.attrs.expires.is_stale() || node.is_busy() {
            return;
        }
        let Some(fresh) = node.deferred_again() else {
            return;
        };
        if tree.replace(at, fresh).is_ok() {
            self.expiry.lock().delete_under(at);
            debug!(path = %at, "stale listing deferred again");
        }
    }

    /// Whether `path` names a fresh node, fetching document entries on demand
    ///
    /// A stale node counts as absent; its expiry entry is dropped.
    pub fn exists(&self, path: &Pathname) -> bool {
        enum Seen {
            Fresh,
            Stale,
            Unexpanded,
            Missing,
        }
        let seen = match self.tree.read().walk(path, WalkPolicy::default()) {
            Walk::Found(node) if node.attrs.expires.is_stale() => Seen::Stale,
            Walk::Found(_) => Seen::Fresh,
            Walk::Pending { .. } => Seen::Unexpanded,
            Walk::Missing => Seen::Missing,
        };
        let in_docs = doc_id_of(path.as_str()).is_some();
        match seen {
            Seen::Fresh => true,
            Seen::Unexpanded => self.with_node(path, |_| ()).is_ok(),
            Seen::Stale => {
                if let Some(key) = ExpiryKey::for_path(path) {
                    self.expiry.lock().delete(&key);
                }
                in_docs && self.with_node(path, |_| ()).is_ok()
            }
            Seen::Missing => in_docs && self.with_node(path, |_| ()).is_ok(),
        }
    }

    /// Follow symlinks from `path` to the node they finally name
    pub fn chase_symlinks(&self, path: &Pathname) -> UvfsResult<Pathname> {
        let mut cur = path.clone();
        for _ in 0..=MAX_SYMLINK_HOPS {
            let target = self.with_node(&cur, |node| node.symlink_target().map(str::to_string))?;
            match target {
                Some(target) => cur = cur.join_relative(&target)?,
                None => return Ok(cur),
            }
        }
        debug!(path = %path, "too many symlinks");
        Err(UvfsError::not_found(path))
    }

    /// Add `node` at `path`; the parent must already exist
    pub fn insert(&self, path: &Pathname, node: Node) -> UvfsResult<()> {
        let (parent, name) = path.split()?;
        self.expand_path(&parent, EXPAND)?;
        let mut keys = Vec::new();
        expiring_keys(&node, path, &mut keys);
        let mut tree = self.tree.write();
        tree.insert(&parent, name, node)?;
        if !keys.is_empty() {
            let mut expiry = self.expiry.lock();
            for (deadline, key) in keys {
                expiry.put(deadline, key);
            }
        }
        Ok(())
    }

    /// Detach the node at `path`, dropping its expiry bookkeeping
    pub fn remove(&self, path: &Pathname) -> UvfsResult<Node> {
        if let Some(parent) = path.parent() {
            self.expand_path(&parent, EXPAND)?;
        }
        let node = self.tree.write().remove(path)?;
        self.expiry.lock().delete_under(path);
        if search_query(path).is_some() {
            self.persist_searches()?;
        }
        Ok(node)
    }

    /// Move `old` to `new`; a directory moved into `/search` becomes a
    /// saved search
    pub fn rename(&self, old: &Pathname, new: &Pathname) -> UvfsResult<()> {
        let (old_parent, old_name) = old.split()?;
        let (new_parent, new_name) = new.split()?;
        if new.starts_with(old) {
            return Err(UvfsError::InvalidArgument(format!(
                "cannot move {} into itself",
                old
            )));
        }
        self.expand_path(&old_parent, EXPAND)?;
        self.expand_path(&new_parent, EXPAND)?;

        let is_dir = self.with_node(old, |node| node.file_type() == FileType::Directory)?;
        if is_dir && search_query(new).is_some() && !is_placeholder_folder(new_name.as_str()) {
            if self.exists(new) {
                return Err(UvfsError::AlreadyExists(new.to_string()));
            }
            self.remove(old)?;
            return self.add_search(new_name.as_str());
        }

        {
            let mut tree = self.tree.write();
            if old_parent == new_parent {
                tree.rename(&old_parent, &old_name, new_name)?;
            } else {
                if tree.contains(new) {
                    return Err(UvfsError::AlreadyExists(new.to_string()));
                }
                if tree.lookup(&new_parent)?.as_dir().is_none() {
                    return Err(UvfsError::not_found(&new_parent));
                }
                let node = tree.remove(old)?;
                if let Err((e, node)) = tree.try_insert(&new_parent, new_name, node) {
                    tree.insert(&old_parent, old_name, node)?;
                    return Err(e);
                }
            }
        }
        self.expiry.lock().delete_under(old);
        if search_query(old).is_some() || search_query(new).is_some() {
            self.persist_searches()?;
        }
        debug!(from = %old, to = %new, "renamed");
        Ok(())
    }

    /// Build `/docs/<id>` unless it is already present
    pub fn create_docs_entry(&self, id: &str) -> UvfsResult<()> {
        let docs = top_level(DOCS);
        let key = Filename::new(id)?;
        let path = docs.join(&key);
        if self.tree.read().contains(&path) {
            return Ok(());
        }
        let md = self.ctx.metadata(id)?;
        let entry = docs_entry(&self.ctx, &md);
        let mut keys = Vec::new();
        expiring_keys(&entry, &path, &mut keys);

        let mut tree = self.tree.write();
        match tree.insert(&docs, key, entry) {
            Ok(()) => {
                let mut expiry = self.expiry.lock();
                for (deadline, key) in keys {
                    expiry.put(deadline, key);
                }
                debug!(doc_id = id, "document entry created");
                Ok(())
            }
            Err(UvfsError::AlreadyExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Save a search under `/search/<name>` and persist the list
    pub fn add_search(&self, name: &str) -> UvfsResult<()> {
        if name == ".DS_Store" {
            return Ok(());
        }
        let search = top_level(SEARCH);
        self.expand_path(&search, EXPAND)?;
        let key = Filename::new(name)?;
        self.tree
            .write()
            .insert(&search, key, query_placeholder(&self.ctx, name))?;
        info!(query = name, "search saved");
        self.persist_searches()
    }

    /// Rewrite the saved-searches file from the current `/search` listing
    pub fn persist_searches(&self) -> UvfsResult<()> {
        let names = self.with_node(&top_level(SEARCH), |node| {
            node.as_dir()
                .map(|dir| {
                    dir.entries
                        .keys()
                        .filter(|name| !name.is_hidden() && !is_placeholder_folder(name.as_str()))
                        .map(|name| name.as_str().to_string())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
        })?;
        let file = self.ctx.searches_file();
        std::fs::write(&file, format_searches(&names, OffsetDateTime::now_utc()))?;
        debug!(file = %file.display(), count = names.len(), "searches persisted");
        Ok(())
    }

    /// Forget the category and search listings so the next access re-fetches
    pub fn invalidate_top_level(&self) {
        self.expiry.lock().clear();
        let owner = self.ctx.owner();
        let mut tree = self.tree.write();
        for (name, hook) in [
            (SEARCH, search_hook(&self.ctx)),
            (CATEGORIES, categories_hook(&self.ctx)),
        ] {
            let path = top_level(name);
            let Ok(node) = tree.lookup(&path) else {
                continue;
            };
            if node.is_deferred() {
                continue;
            }
            if node.is_busy() {
                debug!(path = %path, "listing busy; not invalidated");
                continue;
            }
            let fresh = Node::deferred_directory(name, owner, hook).writable();
            if let Err(e) = tree.replace(&path, fresh) {
                warn!(path = %path, error = %e, "failed to invalidate");
            }
        }
        info!("top level invalidated");
    }

    /// Re-defer listings whose deadline has passed; returns how many
    pub fn reap_expired(&self) -> usize {
        let now = SystemTime::now();
        let due: Vec<ExpiryKey> = {
            let mut expiry = self.expiry.lock();
            std::iter::from_fn(|| expiry.pop_due(now))
                .map(|(_, key)| key)
                .collect()
        };
        if due.is_empty() {
            return 0;
        }
        let mut reaped = 0;
        let mut tree = self.tree.write();
        for key in due {
            let path = key.path();
            let Ok(node) = tree.lookup(&path) else {
                continue;
            };
            if !node.attrs.expires.is_stale_at(now) || node.is_busy() {
                continue;
            }
            if let Some(fresh) = node.deferred_again() {
                if tree.replace(&path, fresh).is_ok() {
                    reaped += 1;
                }
            }
        }
        if reaped > 0 {
            debug!(reaped, "stale listings reaped");
        }
        reaped
    }

    /// Nodes currently tracked for expiry
    #[must_use]
    pub fn expiry_len(&self) -> usize {
        self.expiry.lock().len()
    }

    /// Indented dump of the expanded tree under `path`
    pub fn display_tree(&self, path: &Pathname) -> UvfsResult<String> {
        self.expand_path(path, EXPAND)?;
        self.tree.read().display(path)
    }

    /// Bump the modification time of the node at `path`
    pub fn touch(&self, path: &Pathname) -> UvfsResult<()> {
        self.update(path, |node| node.attrs.stat.touch())
    }

    /// Upload the content of the file at `from` as a new document, make
    /// its entry visible under `/docs` and tag the file with the new id
    pub fn add_document(&self, doc: &NewDocument, from: &Pathname) -> UvfsResult<String> {
        let id = self.ctx.add_document(doc)?;
        if let Err(e) = self.create_docs_entry(&id) {
            warn!(doc_id = %id, error = %e, "new document not yet visible");
        }
        if let Err(e) = self.update(from, |node| node.attrs.doc_id = Some(id.clone())) {
            debug!(path = %from, error = %e, "committed file is gone");
        }
        Ok(id)
    }

    pub fn delete_document(&self, doc_id: &str) -> UvfsResult<()> {
        self.ctx.delete_document(doc_id)?;
        let path = top_level(DOCS).join(&Filename::new(doc_id)?);
        match self.tree.write().remove(&path) {
            Ok(_) | Err(UvfsError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.expiry.lock().delete_under(&path);
        Ok(())
    }

    /// Start the change poller; a second call is a no-op
    pub fn start_poller(self: &Arc<Self>) -> UvfsResult<()> {
        let mut slot = self.poller.lock();
        if slot.is_some() {
            return Ok(());
        }
        *slot = Some(poller::spawn(Arc::downgrade(self), Arc::clone(&self.ctx))?);
        Ok(())
    }

    /// Stop background work; `false` if uploads were still running at the
    /// deadline
    pub fn shutdown(&self, timeout: Duration) -> bool {
        self.ctx.begin_shutdown();
        if let Some(handle) = self.poller.lock().take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
        let drained = self.ctx.wait_for_uploads(timeout);
        if !drained {
            warn!(active = self.ctx.stats.active_uploaders(), "uploads still running at shutdown");
        }
        drained
    }
}

/// Expiry entries for every node of a subtree that has a deadline
fn expiring_keys(node: &Node, path: &Pathname, out: &mut Vec<(SystemTime, ExpiryKey)>) {
    if let (Some(deadline), Some(key)) = (node.attrs.expires.deadline(), ExpiryKey::for_path(path)) {
        out.push((deadline, key));
    }
    if let Some(dir) = node.as_dir() {
        for (name, child) in &dir.entries {
            expiring_keys(child, &path.join(name), out);
        }
    }
}
