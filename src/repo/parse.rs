/*!
 * Response Parsers
 * Plain-text replies of the repository's UVFS extension
 */

use std::collections::HashSet;

use tracing::warn;

use super::metadata::DocMetadata;
use crate::vfs::paths::is_doc_id;
use crate::vfs::types::{UvfsError, UvfsResult};

/// `<most-recent-doc-id> <repository-root>`
pub fn root_and_most_recent(text: &str) -> UvfsResult<(String, Option<String>)> {
    let mut tokens = text.split_whitespace();
    let id = tokens.next();
    let root = tokens
        .next()
        .ok_or_else(|| UvfsError::Parse(format!("no repository root in {:?}", text)))?;
    let id = id.filter(|id| is_doc_id(id)).map(str::to_string);
    Ok((root.to_string(), id))
}

/// One metadata line per document; malformed lines are logged and skipped
#[must_use]
pub fn metadata_lines(text: &str) -> Vec<DocMetadata> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match DocMetadata::parse_line(line) {
            Ok(md) => Some(md),
            Err(e) => {
                warn!(error = %e, "skipping metadata line");
                None
            }
        })
        .collect()
}

/// Newline-separated category paths
#[must_use]
pub fn categories(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// `<id> <content-hash>` lines
pub fn id_hash_lines(text: &str) -> UvfsResult<Vec<(String, String)>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(id), Some(hash), None) => Ok((id.to_string(), hash.to_string())),
                _ => Err(UvfsError::Parse(format!("expected '<id> <hash>': {:?}", line))),
            }
        })
        .collect()
}

/// `<id> <filename>` lines; results naming the same file twice keep the first
#[must_use]
pub fn id_filename_lines(text: &str) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    text.lines()
        .filter_map(|line| {
            let (id, rest) = line.split_once(char::is_whitespace)?;
            let filename = rest.trim_start().trim_end_matches('\r');
            (is_doc_id(id) && !filename.is_empty()).then(|| (id.to_string(), filename.to_string()))
        })
        .filter(|(_, filename)| seen.insert(filename.clone()))
        .collect()
}

/// Long-poll reply; an empty body means the repository is shutting down
pub fn mod_time(text: &str) -> UvfsResult<Option<f64>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    text.parse::<f64>()
        .map(Some)
        .map_err(|e| UvfsError::Parse(format!("bad modification time {:?}: {}", text, e)))
}

/// `key: value` metadata file; indented lines continue the previous value
#[must_use]
pub fn metadata_file(text: &str) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for line in text.lines() {
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = pairs.last_mut() {
                value.push('\n');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim();
            if !key.is_empty() && !key.starts_with('#') {
                pairs.push((key.to_string(), value.trim().to_string()));
            }
        }
    }
    pairs
}
