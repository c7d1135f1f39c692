/*!
 * HTTP Repository Client
 * Blocking reqwest client for the repository's UVFS extension
 */

use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use tracing::{debug, error, instrument};

use super::metadata::DocMetadata;
use super::{parse, NewDocument, Repository};
use crate::config::Config;
use crate::vfs::types::{UvfsError, UvfsResult};

const USER_AGENT: &str = concat!("uvfs/", env!("CARGO_PKG_VERSION"));

/// Repository reached over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpRepository {
    client: Client,
    base: String,
}

impl HttpRepository {
    pub fn new(config: &Config) -> UvfsResult<Self> {
        let mut headers = HeaderMap::new();
        if !config.password.is_empty() {
            let value = HeaderValue::from_str(&config.password)
                .map_err(|e| UvfsError::InvalidArgument(format!("bad password header: {}", e)))?;
            headers.insert("Password", value);
        }
        let client = Client::builder()
            .timeout(config.http_timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| UvfsError::Remote(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base: config.repo_url.trim_end_matches('/').to_string(),
        })
    }

    fn extension(&self, name: &str) -> RequestBuilder {
        self.client.get(format!("{}/action/UVFS/{}", self.base, name))
    }

    fn external(&self, name: &str) -> RequestBuilder {
        self.client
            .get(format!("{}/action/externalAPI/{}", self.base, name))
    }

    fn text(request: RequestBuilder) -> UvfsResult<String> {
        let response = request.send().map_err(|e| {
            error!(error = %e, "repository request failed");
            UvfsError::from(e)
        })?;
        let response = response.error_for_status()?;
        Ok(response.text()?)
    }

    fn bytes(request: RequestBuilder) -> UvfsResult<Vec<u8>> {
        let response = request.send()?.error_for_status()?;
        Ok(response.bytes()?.to_vec())
    }
}

impl Repository for HttpRepository {
    fn root_and_most_recent(&self) -> UvfsResult<(String, Option<String>)> {
        let text = Self::text(self.extension("repo_root_and_most_recent_docid"))?;
        parse::root_and_most_recent(&text)
    }

    #[instrument(level = "debug", skip(self), fields(count = ids.len()))]
    fn metadata_for_docs(&self, ids: &[String]) -> UvfsResult<Vec<DocMetadata>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query: Vec<(&str, &str)> = ids.iter().map(|id| ("id", id.as_str())).collect();
        let text = Self::text(self.extension("metadata_for_docs").query(&query))?;
        Ok(parse::metadata_lines(&text))
    }

    fn categories(&self) -> UvfsResult<Vec<String>> {
        let text = Self::text(self.extension("get_categories"))?;
        Ok(parse::categories(&text))
    }

    fn docs_for_category(&self, category: &str) -> UvfsResult<Vec<(String, String)>> {
        let text = Self::text(
            self.extension("docs_for_category")
                .query(&[("category", category)]),
        )?;
        parse::id_hash_lines(&text)
    }

    fn matching_ids_and_filenames(&self, query: &str) -> UvfsResult<Vec<(String, String)>> {
        let text = Self::text(
            self.extension("matching_ids_and_filenames")
                .query(&[("query", query)]),
        )?;
        Ok(parse::id_filename_lines(&text))
    }

    fn patient_mod_time(&self, max_delay: Duration, last: f64) -> UvfsResult<Option<f64>> {
        let request = self
            .extension("patient_mod_time")
            .query(&[
                ("max_delay", max_delay.as_secs().to_string()),
                ("last_mod_time", format!("{:.2}", last)),
            ])
            .timeout(max_delay + Duration::from_secs(30));
        parse::mod_time(&Self::text(request)?)
    }

    #[instrument(level = "debug", skip(self))]
    fn fetch_original(&self, doc_id: &str) -> UvfsResult<Vec<u8>> {
        let bytes = Self::bytes(self.external("fetch_original").query(&[("doc_id", doc_id)]))?;
        debug!(doc_id, bytes = bytes.len(), "fetched original");
        Ok(bytes)
    }

    fn fetch_doc_file(&self, doc_id: &str, dir: &str, file: &str) -> UvfsResult<Vec<u8>> {
        Self::bytes(
            self.client
                .get(format!("{}/docs/{}/{}/{}", self.base, doc_id, dir, file)),
        )
    }

    fn doc_metadata(&self, doc_id: &str) -> UvfsResult<String> {
        Self::text(self.external("doc_metadata").query(&[("doc_id", doc_id)]))
    }

    fn categories_for_doc(&self, doc_id: &str) -> UvfsResult<String> {
        let text = Self::text(self.extension("categories_for_doc").query(&[("doc_id", doc_id)]))?;
        Ok(text.trim().to_string())
    }

    #[instrument(level = "debug", skip(self, doc), fields(title = %doc.title, bytes = doc.content.len()))]
    fn add_document(&self, doc: &NewDocument) -> UvfsResult<String> {
        let content = Part::bytes(doc.content.clone())
            .file_name(doc.title.clone())
            .mime_str(&doc.content_type)
            .map_err(|e| UvfsError::InvalidArgument(format!("bad content type: {}", e)))?;
        let mut form = Form::new()
            .text("wait", "true")
            .text("no-redirect", "true")
            .part("content", content)
            .text("contenttype", doc.content_type.clone())
            .text("md-title", doc.title.clone())
            .text("md-categories", doc.categories.clone());
        if let Some(previous) = &doc.version_of {
            form = form.text("metadata", format!("version-of: {}", previous));
        }

        let response = self
            .client
            .post(format!("{}/action/UploadDocument/add", self.base))
            .multipart(form)
            .send()
            .map_err(|e| UvfsError::UploadFailure(format!("uploading {}: {}", doc.title, e)))?;
        let status = response.status();
        let body = response.text().unwrap_or_default();
        if status != StatusCode::OK {
            return Err(UvfsError::UploadFailure(format!(
                "uploading {} failed, {}; {}",
                doc.title,
                status,
                body.trim()
            )));
        }
        Ok(body.trim().to_string())
    }

    fn delete_document(&self, doc_id: &str) -> UvfsResult<()> {
        let text = Self::text(
            self.client
                .get(format!("{}/action/basic/doc_delete", self.base))
                .query(&[("confirmed", "yes"), ("doc_id", doc_id)]),
        )?;
        if text.contains("No document with id") {
            return Err(UvfsError::NotFound(format!("document {} is already deleted", doc_id)));
        }
        Ok(())
    }
}
