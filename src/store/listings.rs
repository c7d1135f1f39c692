/*!
 * Category and Search Listings
 * Hooks for `/categories` and `/search`, and the saved-searches file
 */

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::context::StoreContext;
use super::docs::add_child;
use crate::vfs::paths::{category_of, search_query};
use crate::vfs::types::{Pathname, UvfsError, UvfsResult};
use crate::vfs::{Hook, Node};

const SEARCHES_HEADER: &str = "# These are UVFS search/* queries";

/// One level of the category hierarchy
#[derive(Debug, Default)]
pub struct Level {
    children: BTreeMap<String, Arc<Level>>,
}

#[derive(Default)]
struct LevelBuilder(BTreeMap<String, LevelBuilder>);

impl LevelBuilder {
    fn add<'a>(&mut self, mut parts: impl Iterator<Item = &'a str>) {
        if let Some(part) = parts.next() {
            self.0.entry(part.to_string()).or_default().add(parts);
        }
    }

    fn freeze(self) -> Arc<Level> {
        Arc::new(Level {
            children: self
                .0
                .into_iter()
                .map(|(name, child)| (name, child.freeze()))
                .collect(),
        })
    }
}

impl Level {
    /// Hierarchy of slash-separated category paths; empty parts are dropped
    #[must_use]
    pub fn from_categories(categories: &[String]) -> Arc<Level> {
        let mut root = LevelBuilder::default();
        for category in categories {
            root.add(category.split('/').map(str::trim).filter(|p| !p.is_empty()));
        }
        root.freeze()
    }

    #[must_use]
    pub fn children(&self) -> impl Iterator<Item = (&str, &Arc<Level>)> {
        self.children.iter().map(|(name, level)| (name.as_str(), level))
    }
}

fn name_of(path: &Pathname) -> String {
    path.file_name()
        .map(|name| name.as_str().to_string())
        .unwrap_or_default()
}

/// Relative target from a listing at `dir` to a document's original
fn original_target(dir: &Pathname, doc_id: &str, filename: &str) -> String {
    format!("{}docs/{}/originals/{}", "../".repeat(dir.depth()), doc_id, filename)
}

/// `/categories`: one placeholder per top-level category
pub fn categories_hook(ctx: &Arc<StoreContext>) -> Hook {
    let ctx = Arc::clone(ctx);
    Arc::new(move |path: &Pathname| -> UvfsResult<Node> {
        let root = Level::from_categories(&ctx.repo.categories()?);
        let mut dir = Node::directory(name_of(path), ctx.owner()).writable();
        for (name, level) in root.children() {
            add_child(&mut dir, name, level_placeholder(&ctx, name, level));
        }
        debug!(count = root.children.len(), "category roots listed");
        Ok(dir)
    })
}

fn level_placeholder(ctx: &Arc<StoreContext>, name: &str, level: &Arc<Level>) -> Node {
    Node::deferred_directory(name, ctx.owner(), level_hook(ctx, Arc::clone(level))).writable()
}

/// One category: sub-category placeholders plus links to its documents
pub fn level_hook(ctx: &Arc<StoreContext>, level: Arc<Level>) -> Hook {
    let ctx = Arc::clone(ctx);
    Arc::new(move |path: &Pathname| -> UvfsResult<Node> {
        let category = category_of(path).ok_or_else(|| UvfsError::not_found(path))?;
        let owner = ctx.owner();
        let expires = ctx.fresh_until();
        let mut dir = Node::directory(name_of(path), owner)
            .writable()
            .expires(expires)
            .refreshed_by(level_hook(&ctx, Arc::clone(&level)));
        for (name, sub) in level.children() {
            add_child(&mut dir, name, level_placeholder(&ctx, name, sub));
        }

        let docs = ctx.repo.docs_for_category(&category)?;
        let stale: Vec<String> = docs
            .iter()
            .filter(|(id, hash)| match ctx.cached_metadata(id) {
                Some(md) => md.sha_hash.as_deref().is_some_and(|known| known != hash.as_str()),
                None => true,
            })
            .map(|(id, _)| id.clone())
            .collect();
        if !stale.is_empty() {
            for md in ctx.repo.metadata_for_docs(&stale)? {
                ctx.remember(md);
            }
        }

        for (id, _) in &docs {
            let Some(md) = ctx.cached_metadata(id) else {
                warn!(doc_id = %id, category = %category, "no metadata for listed document");
                continue;
            };
            let link = Node::symlink(md.filename.clone(), owner, original_target(path, id, &md.filename))
                .with_doc_id(id.clone())
                .with_times(md.modified())
                .expires(expires);
            if !add_child(&mut dir, &md.filename, link) {
                debug!(doc_id = %id, filename = %md.filename, "duplicate filename in category");
            }
        }
        debug!(category = %category, docs = docs.len(), "category listed");
        Ok(dir)
    })
}

/// Saved search names, one per line; `#` starts a comment
#[must_use]
pub fn parse_searches(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|name| !name.is_empty() && !name.contains(['/', '\r']))
        .map(str::to_string)
        .collect()
}

/// Contents of the saved-searches file for `names`
#[must_use]
pub fn format_searches(names: &[String], at: OffsetDateTime) -> String {
    let stamp = at
        .format(format_description!(
            "[hour]:[minute] [day]-[month repr:short]-[year]"
        ))
        .unwrap_or_default();
    let mut sorted = names.to_vec();
    sorted.sort();
    let mut out = format!("{}\n# at {}.\n\n", SEARCHES_HEADER, stamp);
    for name in sorted {
        out.push_str(&name);
        out.push('\n');
    }
    out
}

/// Saved searches on disk; a missing file means none
pub fn read_searches(file: &Path) -> UvfsResult<Vec<String>> {
    match std::fs::read_to_string(file) {
        Ok(text) => Ok(parse_searches(&text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// `/search`: one placeholder per saved search
pub fn search_hook(ctx: &Arc<StoreContext>) -> Hook {
    let ctx = Arc::clone(ctx);
    Arc::new(move |path: &Pathname| -> UvfsResult<Node> {
        let names = read_searches(&ctx.searches_file())?;
        let mut dir = Node::directory(name_of(path), ctx.owner()).writable();
        for name in &names {
            add_child(&mut dir, name, query_placeholder(&ctx, name));
        }
        debug!(count = names.len(), "saved searches loaded");
        Ok(dir)
    })
}

#[must_use]
pub fn query_placeholder(ctx: &Arc<StoreContext>, name: &str) -> Node {
    Node::deferred_directory(name, ctx.owner(), query_hook(ctx)).writable()
}

/// `/search/<query>`: links to every matching document
pub fn query_hook(ctx: &Arc<StoreContext>) -> Hook {
    let ctx = Arc::clone(ctx);
    Arc::new(move |path: &Pathname| -> UvfsResult<Node> {
        let query = search_query(path).ok_or_else(|| UvfsError::not_found(path))?;
        let hits = ctx.repo.matching_ids_and_filenames(&query)?;
        let owner = ctx.owner();
        let expires = ctx.fresh_until();
        let mut dir = Node::directory(name_of(path), owner)
            .writable()
            .expires(expires)
            .refreshed_by(query_hook(&ctx));
        for (id, filename) in &hits {
            let mut link = Node::symlink(filename.clone(), owner, original_target(path, id, filename))
                .with_doc_id(id.clone())
                .expires(expires);
            if let Some(md) = ctx.cached_metadata(id) {
                link = link.with_times(md.modified());
            }
            add_child(&mut dir, filename, link);
        }
        debug!(query = %query, hits = hits.len(), "search ran");
        Ok(dir)
    })
}
