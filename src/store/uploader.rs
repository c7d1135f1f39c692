/*!
 * Write-Back Uploader
 * One background committer per file, fed through a single-slot channel
 */

use std::sync::{Arc, Weak};
use std::thread;

use flume::TrySendError;
use tracing::{debug, error, info, warn};

use super::context::StoreContext;
use super::docs::sha1_hex;
use super::Store;
use crate::repo::content_type::{content_type_for, ensure_good_suffix};
use crate::repo::NewDocument;
use crate::vfs::paths::DEFAULT_CATEGORY;
use crate::vfs::{
    FileNode, FileState, Pathname, UploadSource, UploadTarget, UvfsError, UvfsResult, WritePhase,
};

/// A running uploader holds at most one queued request beyond the one it
/// is working on; further requests fold into it.
const PENDING_COMMITS: usize = 1;

/// Ask for `file` to be committed; call with its state lock held
pub fn request_commit(
    store: &Arc<Store>,
    file: &Arc<FileNode>,
    state: &mut FileState,
    target: UploadTarget,
) {
    let path = target.path.clone();
    let target = match state.phase.uploader() {
        Some(uploader) => match uploader.try_send(target) {
            Ok(()) => {
                debug!(path = %path, "commit queued");
                return;
            }
            Err(TrySendError::Full(_)) => {
                debug!(path = %path, "commit already pending");
                return;
            }
            Err(TrySendError::Disconnected(target)) => target,
        },
        None => target,
    };

    let (tx, rx) = flume::bounded(PENDING_COMMITS);
    if tx.try_send(target).is_err() {
        return;
    }
    state.phase = match std::mem::take(&mut state.phase) {
        WritePhase::Shadowed { shadow, .. } => WritePhase::Shadowed {
            shadow,
            uploader: Some(tx),
        },
        _ => WritePhase::Committing { uploader: tx },
    };
    spawn(store, file, rx, path);
}

fn spawn(
    store: &Arc<Store>,
    file: &Arc<FileNode>,
    rx: flume::Receiver<UploadTarget>,
    path: Pathname,
) {
    let ctx = store.ctx();
    ctx.stats.uploader_started();
    let worker_ctx = Arc::clone(ctx);
    let worker_store = Arc::downgrade(store);
    let worker_file = Arc::clone(file);
    let spawned = thread::Builder::new()
        .name("uvfs-uploader".to_string())
        .spawn(move || {
            run(&worker_ctx, &worker_store, &worker_file, &rx);
            worker_ctx.stats.uploader_finished();
        });
    if let Err(e) = spawned {
        error!(path = %path, error = %e, "failed to start uploader");
        ctx.stats.uploader_finished();
    }
}

/// Commit until the channel is drained, then leave the file idle
fn run(
    ctx: &StoreContext,
    store: &Weak<Store>,
    file: &FileNode,
    rx: &flume::Receiver<UploadTarget>,
) {
    loop {
        if ctx.is_shutdown() {
            file.lock().finish_upload();
            debug!("uploader stopping for shutdown");
            return;
        }
        let (target, content, previous) = {
            let mut state = file.lock();
            let Ok(target) = rx.try_recv() else {
                state.finish_upload();
                return;
            };
            match state.content.snapshot() {
                Ok(content) => (target, content, state.digest.clone()),
                Err(e) => {
                    error!(path = %target.path, error = %e, "cannot read file for upload");
                    ctx.stats.inc_failed_commits();
                    continue;
                }
            }
        };

        let digest = sha1_hex(&content);
        if content.is_empty() || previous.as_deref() == Some(digest.as_str()) {
            debug!(path = %target.path, "nothing new to commit");
            ctx.stats.inc_skipped_commits();
            continue;
        }

        match commit(ctx, store, &target, content, previous) {
            Ok(doc_id) => {
                file.lock().digest = Some(digest);
                ctx.stats.inc_commits();
                debug!(path = %target.path, doc_id = %doc_id, "committed");
            }
            Err(e) => {
                error!(path = %target.path, error = %e, "commit failed; local copy kept");
                ctx.stats.inc_failed_commits();
            }
        }
    }
}

fn commit(
    ctx: &StoreContext,
    store: &Weak<Store>,
    target: &UploadTarget,
    content: Vec<u8>,
    previous: Option<String>,
) -> UvfsResult<String> {
    let store = store
        .upgrade()
        .ok_or_else(|| UvfsError::UploadFailure(format!("{} outlived its mount", target.path)))?;
    let apparent = match &target.source {
        UploadSource::Version { doc_id } => {
            ctx.cached_metadata(doc_id).and_then(|md| md.mime_type.clone())
        }
        UploadSource::Category { .. } => None,
    };
    let content_type = content_type_for(&target.filename, apparent.as_deref());
    let title = ensure_good_suffix(&target.filename, &content_type);
    let categories = match &target.source {
        UploadSource::Version { doc_id } => match ctx.repo.categories_for_doc(doc_id) {
            Ok(cats) if !cats.trim().is_empty() => cats.trim().to_string(),
            Ok(_) => DEFAULT_CATEGORY.to_string(),
            Err(e) => {
                warn!(doc_id = %doc_id, error = %e, "categories unavailable; using default");
                DEFAULT_CATEGORY.to_string()
            }
        },
        UploadSource::Category { category } => category.clone(),
    };
    info!(path = %target.path, title = %title, categories = %categories, "committing");
    let doc = NewDocument {
        content,
        content_type,
        title,
        categories,
        version_of: previous,
    };
    store.add_document(&doc, &target.path)
}
