/*!
 * Node Tree
 * Case-insensitive path walking and structural mutation
 */

use std::fmt::Write as _;
use std::time::SystemTime;

use super::node::{Node, NodeKind};
use super::types::{Filename, Pathname, UvfsError, UvfsResult};

/// How far a walk may descend on its own
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkPolicy {
    /// Stop at a deferred file named by the final component
    pub chase_file: bool,
    /// Stop at stale, refreshable listing directories
    pub refresh_stale: bool,
}

/// Outcome of walking a path without expanding anything
#[derive(Debug)]
pub enum Walk<'a> {
    Found(&'a Node),
    /// A node at `at` must be expanded or refreshed before the walk can go on
    Pending { at: Pathname, node: &'a Node },
    Missing,
}

/// Owner of the root directory
#[derive(Debug)]
pub struct Tree {
    root: Node,
}

impl Tree {
    #[must_use]
    pub fn new(root: Node) -> Self {
        Self { root }
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Walk `path`, stopping at the first node that needs the store's help
    #[must_use]
    pub fn walk(&self, path: &Pathname, policy: WalkPolicy) -> Walk<'_> {
        let now = SystemTime::now();
        let components: Vec<Filename> = path.components().collect();
        let last = components.len().saturating_sub(1);
        let mut cur = &self.root;
        let mut at = Pathname::root();
        for (i, name) in components.iter().enumerate() {
            let Some(dir) = cur.as_dir() else {
                return Walk::Missing;
            };
            let Some(child) = dir.entries.get(name) else {
                return Walk::Missing;
            };
            at = at.join(name);
            match &child.kind {
                NodeKind::DeferredDirectory(_) => return Walk::Pending { at, node: child },
                NodeKind::DeferredFile(_) if i == last && policy.chase_file => {
                    return Walk::Pending { at, node: child };
                }
                NodeKind::Directory(listing)
                    if policy.refresh_stale
                        && listing.refresh.is_some()
                        && child.attrs.expires.is_stale_at(now)
                        && !child.is_busy() =>
                {
                    return Walk::Pending { at, node: child };
                }
                _ => {}
            }
            cur = child;
        }
        Walk::Found(cur)
    }

    /// Strict lookup: every interior component must be a concrete directory
    pub fn lookup(&self, path: &Pathname) -> UvfsResult<&Node> {
        let mut cur = &self.root;
        for name in path.components() {
            cur = cur
                .as_dir()
                .and_then(|dir| dir.entries.get(&name))
                .ok_or_else(|| UvfsError::not_found(path))?;
        }
        Ok(cur)
    }

    pub fn lookup_mut(&mut self, path: &Pathname) -> UvfsResult<&mut Node> {
        let mut cur = &mut self.root;
        for name in path.components() {
            cur = cur
                .as_dir_mut()
                .and_then(|dir| dir.entries.get_mut(&name))
                .ok_or_else(|| UvfsError::not_found(path))?;
        }
        Ok(cur)
    }

    /// Whether `path` is physically present, stale or not
    #[must_use]
    pub fn contains(&self, path: &Pathname) -> bool {
        self.lookup(path).is_ok()
    }

    /// Add `node` under `parent` as `name`
    pub fn insert(&mut self, parent: &Pathname, name: Filename, node: Node) -> UvfsResult<()> {
        self.try_insert(parent, name, node).map_err(|(e, _)| e)
    }

    /// Like [`Tree::insert`], but hands `node` back when it cannot be placed
    pub fn try_insert(
        &mut self,
        parent: &Pathname,
        name: Filename,
        mut node: Node,
    ) -> Result<(), (UvfsError, Node)> {
        let dir_node = match self.lookup_mut(parent) {
            Ok(dir_node) => dir_node,
            Err(e) => return Err((e, node)),
        };
        let Some(dir) = dir_node.as_dir_mut() else {
            let e = UvfsError::InvalidArgument(format!("{} is not a directory", parent));
            return Err((e, node));
        };
        if dir.entries.contains_key(&name) {
            return Err((UvfsError::AlreadyExists(parent.join(&name).to_string()), node));
        }
        node.reparent(Some(parent.clone()), &parent.join(&name));
        dir.entries.insert(name, node);
        dir_node.attrs.stat.touch();
        Ok(())
    }

    /// Detach and return the node at `path`
    pub fn remove(&mut self, path: &Pathname) -> UvfsResult<Node> {
        let (parent, name) = path.split()?;
        let dir_node = self.lookup_mut(&parent)?;
        let node = dir_node
            .as_dir_mut()
            .and_then(|dir| dir.entries.remove(&name))
            .ok_or_else(|| UvfsError::not_found(path))?;
        dir_node.attrs.stat.touch();
        Ok(node)
    }

    /// Swap the node at `path` for `node`, returning the old one
    pub fn replace(&mut self, path: &Pathname, mut node: Node) -> UvfsResult<Node> {
        let (parent, _) = path.split()?;
        let slot = self.lookup_mut(path)?;
        node.reparent(Some(parent), path);
        Ok(std::mem::replace(slot, node))
    }

    /// Rename an entry within one directory
    pub fn rename(&mut self, dir: &Pathname, old: &Filename, new: Filename) -> UvfsResult<()> {
        let dir_node = self.lookup_mut(dir)?;
        let Some(listing) = dir_node.as_dir_mut() else {
            return Err(UvfsError::not_found(dir));
        };
        if listing.entries.contains_key(&new) {
            return Err(UvfsError::AlreadyExists(dir.join(&new).to_string()));
        }
        let mut node = listing
            .entries
            .remove(old)
            .ok_or_else(|| UvfsError::not_found(dir.join(old)))?;
        node.name = new.as_str().to_string();
        node.reparent(Some(dir.clone()), &dir.join(&new));
        listing.entries.insert(new, node);
        dir_node.attrs.stat.touch();
        Ok(())
    }

    /// Indented dump of the expanded part of the tree under `path`
    pub fn display(&self, path: &Pathname) -> UvfsResult<String> {
        let node = self.lookup(path)?;
        let mut out = String::new();
        display_into(&mut out, path, node);
        Ok(out)
    }
}

fn display_into(out: &mut String, path: &Pathname, node: &Node) {
    let Some(dir) = node.as_dir() else {
        return;
    };
    let mut names: Vec<&Filename> = dir.entries.keys().collect();
    names.sort();
    for name in names {
        let child_path = path.join(name);
        let child = &dir.entries[name];
        let indent = " ".repeat(4 * child_path.depth());
        match &child.kind {
            NodeKind::Directory(_) => {
                let _ = writeln!(out, "{}{}/:", indent, child_path);
                display_into(out, &child_path, child);
            }
            NodeKind::Symlink(target) => {
                let _ = writeln!(out, "{}{}\t-> {}", indent, child_path, target);
            }
            NodeKind::File(_) => {
                let _ = writeln!(out, "{}{}\t{} bytes", indent, child_path, child.stat().size);
            }
            NodeKind::DeferredDirectory(_) => {
                let _ = writeln!(out, "{}{}/\t<deferred>", indent, child_path);
            }
            NodeKind::DeferredFile(_) => {
                let _ = writeln!(out, "{}{}\t<deferred>", indent, child_path);
            }
        }
    }
}
