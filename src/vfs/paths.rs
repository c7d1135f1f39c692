/*!
 * Mount Layout
 * Fixed top-level names and path classification
 */

use std::sync::OnceLock;

use regex::Regex;

use super::types::{Filename, Pathname};

pub const DOCS: &str = "docs";
pub const CATEGORIES: &str = "categories";
pub const SEARCH: &str = "search";

/// Finder's custom-icon file; present in the tree, hidden from listings
pub const ICON_NAME: &str = "Icon\r";

/// Length of a document id such as `01227-20-3894-512`
pub const DOC_ID_LEN: usize = 17;

/// Fallback category for documents with no other home
pub const DEFAULT_CATEGORY: &str = "added-via/UVFS";

fn docs_folder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^/docs/(?P<id>[0-9]{5}-[0-9]{2}-[0-9]{4}-[0-9]{3})(/.*)?$")
            .unwrap_or_else(|e| unreachable!("static pattern: {e}"))
    })
}

fn doc_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[0-9]{5}-[0-9]{2}-[0-9]{4}-[0-9]{3}$")
            .unwrap_or_else(|e| unreachable!("static pattern: {e}"))
    })
}

fn tempfile_endings() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\.tmp|autosave)$").unwrap_or_else(|e| unreachable!("static pattern: {e}"))
    })
}

#[inline]
#[must_use]
pub fn is_doc_id(id: &str) -> bool {
    id.len() == DOC_ID_LEN && doc_id_pattern().is_match(id)
}

/// Document id of any path inside `/docs/<id>`
#[must_use]
pub fn doc_id_of(path: &str) -> Option<&str> {
    docs_folder()
        .captures(path)
        .and_then(|caps| caps.name("id"))
        .map(|m| m.as_str())
}

/// Document id named anywhere in a symlink target
#[must_use]
pub fn doc_id_in_target(target: &str) -> Option<&str> {
    let idx = target.find("docs/")?;
    let rest = &target[idx + "docs/".len()..];
    let id = rest.split('/').next()?;
    is_doc_id(id).then_some(id)
}

/// `/docs/<id>/<page-images|thumbnails>/<file>`
#[must_use]
pub fn doc_file_of(path: &Pathname) -> Option<(String, String, String)> {
    let parts: Vec<&str> = path.as_str().split('/').skip(1).collect();
    match parts.as_slice() {
        [docs, id, dir, file]
            if docs.eq_ignore_ascii_case(DOCS)
                && is_doc_id(id)
                && matches!(*dir, "page-images" | "thumbnails") =>
        {
            Some((id.to_string(), dir.to_string(), file.to_string()))
        }
        _ => None,
    }
}

/// Saved-search name of `/search/<query>`
#[must_use]
pub fn search_query(path: &Pathname) -> Option<String> {
    if path.parent()? != top_level(SEARCH) {
        return None;
    }
    path.file_name().map(|name| name.as_str().to_string())
}

/// Category named by a path under `/categories`, e.g. `colors/red`
#[must_use]
pub fn category_of(dir: &Pathname) -> Option<String> {
    let root = top_level(CATEGORIES);
    if dir == &root || !dir.starts_with(&root) {
        return None;
    }
    let rest = &dir.as_str()[root.as_str().len() + 1..];
    (!rest.is_empty()).then(|| rest.to_string())
}

#[must_use]
pub fn top_level(name: &str) -> Pathname {
    Filename::new(name)
        .map(|name| Pathname::root().join(&name))
        .unwrap_or_else(|_| Pathname::root())
}

/// Editor scratch files are kept locally, never uploaded
#[inline]
#[must_use]
pub fn is_tempfile(path: &Pathname) -> bool {
    tempfile_endings().is_match(path.as_str())
}

/// Finder's default name for a new folder
#[inline]
#[must_use]
pub fn is_placeholder_folder(name: &str) -> bool {
    name.starts_with("untitled folder")
}

/// Where a released file's bytes are committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadSource {
    /// New version of an existing document
    Version { doc_id: String },
    /// New document filed under a category
    Category { category: String },
}

/// A "commit requested" signal for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub path: Pathname,
    pub filename: String,
    pub source: UploadSource,
}

/// Classify a released path; `None` means the file stays local
#[must_use]
pub fn classify(path: &Pathname) -> Option<UploadTarget> {
    let name = path.file_name()?;
    if name.is_hidden() || is_tempfile(path) {
        return None;
    }
    let source = if let Some(id) = doc_id_of(path.as_str()) {
        UploadSource::Version {
            doc_id: id.to_string(),
        }
    } else {
        let category = category_of(&path.parent()?)?;
        UploadSource::Category { category }
    };
    Some(UploadTarget {
        path: path.clone(),
        filename: name.as_str().to_string(),
        source,
    })
}
