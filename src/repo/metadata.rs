/*!
 * Document Metadata
 * Per-document metadata lines as served by the repository
 */

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::OnceLock;
use std::time::SystemTime;

use base64::Engine as _;
use flate2::read::ZlibDecoder;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::content_type::os_type_for;
use crate::core::serde::from_secs_f64;
use crate::vfs::types::{UvfsError, UvfsResult};

fn metadata_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<pairs>.*?), filename (?P<filename>.*)$")
            .unwrap_or_else(|e| unreachable!("static pattern: {e}"))
    })
}

/// Metadata of one repository document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct DocMetadata {
    pub id: String,
    pub filename: String,
    /// Seconds since the epoch
    pub mtime: f64,
    pub pagecount: u32,
    /// Web-page-complete documents are zip archives of a page and its assets
    pub is_wpc: bool,
    pub sha_hash: Option<String>,
    pub mime_type: Option<String>,
    /// Icon bytes, zlib-compressed and base64-encoded
    pub icns: Option<String>,
    /// Finder file type; absent when the repository reports no MIME type
    pub os_type: Option<[u8; 4]>,
    /// Every pair as received, filename included
    pub fields: BTreeMap<String, String>,
}

impl DocMetadata {
    /// Parse `k v, k v, ..., filename <name>`; the filename may contain commas
    pub fn parse_line(line: &str) -> UvfsResult<Self> {
        let caps = metadata_line()
            .captures(line.trim_end_matches(['\r', '\n']))
            .ok_or_else(|| UvfsError::Parse(format!("metadata line has no filename: {:?}", line)))?;
        let mut fields = BTreeMap::new();
        for pair in caps["pairs"].split(", ") {
            let (key, value) = pair
                .split_once(' ')
                .ok_or_else(|| UvfsError::Parse(format!("bad metadata pair: {:?}", pair)))?;
            fields.insert(key.to_string(), value.to_string());
        }
        fields.insert("filename".to_string(), caps["filename"].to_string());
        Self::from_fields(fields)
    }

    fn from_fields(fields: BTreeMap<String, String>) -> UvfsResult<Self> {
        let id = fields
            .get("id")
            .cloned()
            .ok_or_else(|| UvfsError::Parse("metadata without an id".to_string()))?;
        let mut filename = fields.get("filename").cloned().unwrap_or_default();
        let mtime = fields
            .get("mtime")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0);
        let pagecount = fields
            .get("pagecount")
            .or_else(|| fields.get("page-count"))
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(1);
        let is_wpc = fields
            .get("is_wpc")
            .map(|v| matches!(v.as_str(), "True" | "true" | "1"))
            .unwrap_or(false);
        let mime_type = fields.get("apparent-mime-type").cloned();

        let mut os_type = None;
        match mime_type.as_deref() {
            Some("message/rfc822") => {
                if !filename.is_empty() && !filename.ends_with(".eml") {
                    let stem = match filename.rsplit_once('.') {
                        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
                        _ => filename.clone(),
                    };
                    filename = format!("{}.eml", stem);
                }
            }
            Some(mt) => os_type = Some(os_type_for(mt)),
            None => {}
        }

        Ok(Self {
            id,
            filename,
            mtime,
            pagecount,
            is_wpc,
            sha_hash: fields.get("sha-hash").cloned(),
            mime_type,
            icns: fields.get("icns").cloned(),
            os_type,
            fields,
        })
    }

    #[inline]
    #[must_use]
    pub fn modified(&self) -> SystemTime {
        from_secs_f64(self.mtime)
    }

    /// Decoded icon bytes; empty when the document has none
    pub fn icon(&self) -> UvfsResult<Vec<u8>> {
        let Some(encoded) = self.icns.as_deref().filter(|s| !s.is_empty()) else {
            return Ok(Vec::new());
        };
        let compressed = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| UvfsError::Parse(format!("bad icon encoding for {}: {}", self.id, e)))?;
        let mut icon = Vec::new();
        ZlibDecoder::new(compressed.as_slice())
            .read_to_end(&mut icon)
            .map_err(|e| UvfsError::Parse(format!("bad icon data for {}: {}", self.id, e)))?;
        Ok(icon)
    }
}
