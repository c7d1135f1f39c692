/*!
 * Document Subtree
 * `/docs/<id>/` skeleton and the hooks that fill it in
 */

use std::io::{Cursor, Read};
use std::sync::Arc;

use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use super::context::StoreContext;
use crate::repo::{parse, DocMetadata};
use crate::vfs::paths::{doc_file_of, doc_id_of, ICON_NAME};
use crate::vfs::types::{Filename, Pathname, UvfsError, UvfsResult};
use crate::vfs::{Content, FileNode, Hook, Node};

#[must_use]
pub fn sha1_hex(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

fn name_of(path: &Pathname) -> String {
    path.file_name()
        .map(|name| name.as_str().to_string())
        .unwrap_or_default()
}

fn doc_id_for(path: &Pathname) -> UvfsResult<String> {
    doc_id_of(path.as_str())
        .map(str::to_string)
        .ok_or_else(|| UvfsError::not_found(path))
}

/// Add `node` to a detached directory under `name`; invalid or duplicate
/// names are skipped
pub(crate) fn add_child(dir: &mut Node, name: &str, node: Node) -> bool {
    let Ok(key) = Filename::new(name) else {
        warn!(name, "skipping entry with an unusable name");
        return false;
    };
    match dir.as_dir_mut() {
        Some(listing) if !listing.entries.contains_key(&key) => {
            listing.entries.insert(key, node);
            true
        }
        _ => false,
    }
}

/// Concrete `/docs/<id>` directory for a document
pub fn docs_entry(ctx: &Arc<StoreContext>, md: &DocMetadata) -> Node {
    let owner = ctx.owner();
    let expires = ctx.fresh_until();
    let modified = md.modified();
    let mut id_dir = Node::directory(md.id.clone(), owner)
        .with_doc_id(md.id.clone())
        .with_times(modified)
        .expires(expires)
        .refreshed_by(docs_entry_hook(ctx));

    add_child(
        &mut id_dir,
        "metadata",
        Node::deferred_directory("metadata", owner, metadata_hook(ctx)).with_doc_id(md.id.clone()),
    );
    add_child(
        &mut id_dir,
        "originals",
        Node::deferred_directory("originals", owner, originals_hook(ctx)).with_doc_id(md.id.clone()),
    );
    add_child(
        &mut id_dir,
        ICON_NAME,
        Node::file(ICON_NAME, owner, Content::from_bytes(ctx.icon_for(&md.id))).expires(expires),
    );

    let fetch = doc_file_hook(ctx);
    let mut page_images = Node::directory("page-images", owner).expires(expires);
    let mut thumbnails = Node::directory("thumbnails", owner).expires(expires);
    add_child(
        &mut thumbnails,
        "first.png",
        Node::deferred_file("first.png", owner, fetch.clone()),
    );
    for page in 1..=md.pagecount.max(1) {
        let image = format!("page{:05}.png", page);
        add_child(&mut page_images, &image, Node::deferred_file(image.clone(), owner, fetch.clone()));
        let big = format!("big{:05}.png", page);
        add_child(&mut thumbnails, &big, Node::deferred_file(big.clone(), owner, fetch.clone()));
        let small = format!("{}.png", page);
        add_child(&mut thumbnails, &small, Node::deferred_file(small.clone(), owner, fetch.clone()));
    }
    add_child(&mut id_dir, "page-images", page_images);
    add_child(&mut id_dir, "thumbnails", thumbnails);
    add_child(
        &mut id_dir,
        "first.png",
        Node::symlink("first.png", owner, "page-images/page00001.png").expires(expires),
    );
    id_dir
}

/// Rebuilds a stale `/docs/<id>` from freshly fetched metadata
pub fn docs_entry_hook(ctx: &Arc<StoreContext>) -> Hook {
    let ctx = Arc::clone(ctx);
    Arc::new(move |path: &Pathname| -> UvfsResult<Node> {
        let id = doc_id_for(path)?;
        let md = ctx.refresh_metadata(&id)?;
        Ok(docs_entry(&ctx, &md))
    })
}

/// `/docs/<id>/metadata/`: the raw metadata file plus one file per field
pub fn metadata_hook(ctx: &Arc<StoreContext>) -> Hook {
    let ctx = Arc::clone(ctx);
    Arc::new(move |path: &Pathname| -> UvfsResult<Node> {
        let id = doc_id_for(path)?;
        let raw = ctx.repo.doc_metadata(&id)?;
        let md = ctx.metadata(&id)?;
        let owner = ctx.owner();
        let expires = ctx.fresh_until();
        let modified = md.modified();

        let mut dir = Node::directory(name_of(path), owner)
            .with_doc_id(id.clone())
            .expires(expires);
        add_child(
            &mut dir,
            "_metadata.txt",
            Node::file("_metadata.txt", owner, Content::from_bytes(raw.clone().into_bytes()))
                .expires(expires),
        );

        let mut fields = parse::metadata_file(&raw);
        let ctime = md
            .fields
            .get("mtime")
            .cloned()
            .unwrap_or_else(|| md.mtime.to_string());
        fields.push(("ctime".to_string(), ctime));
        fields.push(("id".to_string(), id.clone()));
        for (key, value) in fields {
            let name = format!("{}.txt", key);
            let file = Node::file(name.clone(), owner, Content::from_bytes(value.into_bytes()))
                .with_times(modified)
                .expires(expires);
            if let Some(listing) = dir.as_dir_mut() {
                if let Ok(key) = Filename::new(name.as_str()) {
                    listing.entries.insert(key, file);
                    continue;
                }
            }
            warn!(doc_id = %id, field = %name, "skipping metadata field");
        }
        debug!(doc_id = %id, "metadata directory built");
        Ok(dir)
    })
}

/// Bytes of a document's original, from the content cache when possible
fn original_content(ctx: &StoreContext, md: &DocMetadata, path: &Pathname) -> UvfsResult<(Content, Vec<u8>)> {
    if let Some(cache) = &ctx.cache {
        let hit = md
            .sha_hash
            .as_deref()
            .and_then(|hash| cache.cached_hash(hash))
            .or_else(|| cache.cached_path(path));
        if let Some(mut content) = hit {
            let bytes = content.snapshot()?;
            debug!(doc_id = %md.id, "original served from cache");
            return Ok((content, bytes));
        }
    }

    let bytes = ctx.repo.fetch_original(&md.id)?;
    let content = match (&ctx.cache, md.sha_hash.as_deref()) {
        (Some(cache), Some(hash)) => cache.store_hash(&bytes, hash)?,
        (Some(cache), None) => cache.store_path(&bytes, path)?,
        (None, _) => Content::from_bytes(bytes.clone()),
    };
    Ok((content, bytes))
}

/// `/docs/<id>/originals/`: one editable file, or the read-only expansion
/// of a web-page-complete archive
pub fn originals_hook(ctx: &Arc<StoreContext>) -> Hook {
    let ctx = Arc::clone(ctx);
    Arc::new(move |path: &Pathname| -> UvfsResult<Node> {
        let id = doc_id_for(path)?;
        let md = ctx.metadata(&id)?;
        let owner = ctx.owner();
        let expires = ctx.fresh_until();
        let modified = md.modified();
        let (content, bytes) = original_content(&ctx, &md, path)?;

        let mut dir = Node::directory(name_of(path), owner)
            .with_doc_id(id.clone())
            .expires(expires);
        if !md.is_wpc {
            dir = dir.writable();
        }
        add_child(
            &mut dir,
            ICON_NAME,
            Node::file(ICON_NAME, owner, Content::from_bytes(ctx.icon_for(&id))).expires(expires),
        );

        if md.is_wpc {
            unpack_archive(&ctx, &mut dir, path, &md, &bytes)?;
        } else {
            let file = FileNode::new(content).with_digest(sha1_hex(&bytes));
            let node = Node::from_file_node(md.filename.clone(), owner, file)
                .writable()
                .with_doc_id(id.clone())
                .with_times(modified)
                .expires(expires);
            add_child(&mut dir, &md.filename, node);
        }
        debug!(doc_id = %id, wpc = md.is_wpc, bytes = bytes.len(), "originals directory built");
        Ok(dir)
    })
}

/// Expand a zip original; top-level entries take the document's filename
fn unpack_archive(
    ctx: &StoreContext,
    dir: &mut Node,
    path: &Pathname,
    md: &DocMetadata,
    bytes: &[u8],
) -> UvfsResult<()> {
    let owner = ctx.owner();
    let expires = ctx.fresh_until();
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let relative = if name.contains('/') {
            name
        } else {
            md.filename.clone()
        };
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;

        let parts: Vec<&str> = relative.split('/').filter(|c| !c.is_empty()).collect();
        let Some((file_name, dirs)) = parts.split_last() else {
            continue;
        };
        let content = cached_entry(ctx, path, &relative, data);
        let file = Node::file(*file_name, owner, content)
            .with_doc_id(md.id.clone())
            .with_times(md.modified())
            .expires(expires);
        let make_dir = |name: &str| {
            Node::directory(name, owner)
                .with_doc_id(md.id.clone())
                .expires(expires)
        };
        place(dir, dirs, file_name, file, &make_dir);
    }
    Ok(())
}

fn cached_entry(ctx: &StoreContext, dir: &Pathname, relative: &str, data: Vec<u8>) -> Content {
    let Some(cache) = &ctx.cache else {
        return Content::from_bytes(data);
    };
    match Pathname::normalized(&format!("{}/{}", dir, relative)).and_then(|p| cache.store_path(&data, &p)) {
        Ok(content) => content,
        Err(e) => {
            warn!(entry = relative, error = %e, "archive entry not cached");
            Content::from_bytes(data)
        }
    }
}

/// Put `file` at `dirs/file_name` below `dir`, creating directories on the way
fn place(dir: &mut Node, dirs: &[&str], file_name: &str, file: Node, make_dir: &dyn Fn(&str) -> Node) {
    let Some((first, rest)) = dirs.split_first() else {
        add_child(dir, file_name, file);
        return;
    };
    let Ok(key) = Filename::new(*first) else {
        warn!(component = first, "skipping archive entry with an unusable path");
        return;
    };
    let Some(listing) = dir.as_dir_mut() else {
        return;
    };
    let sub = listing.entries.entry(key).or_insert_with(|| make_dir(*first));
    place(sub, rest, file_name, file, make_dir);
}

/// Page images and thumbnails, fetched one file at a time
pub fn doc_file_hook(ctx: &Arc<StoreContext>) -> Hook {
    let ctx = Arc::clone(ctx);
    Arc::new(move |path: &Pathname| -> UvfsResult<Node> {
        let (id, dir, file) = doc_file_of(path).ok_or_else(|| UvfsError::not_found(path))?;
        let bytes = ctx.repo.fetch_doc_file(&id, &dir, &file)?;
        Ok(Node::file(file, ctx.owner(), Content::from_bytes(bytes))
            .with_doc_id(id)
            .expires(ctx.fresh_until()))
    })
}
