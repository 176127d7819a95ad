//! Federated archive search.
//!
//! Last resort in the resolution chain: query a federation index node for
//! download URLs, fetch the files over HTTP into the local cache, and hand
//! back the cached paths. Subsequent runs then hit the cache directly.

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::LocateError;
use crate::resolver::{DataQuery, LocalCache, Location, Resolver};

/// Default federation index node.
pub const DEFAULT_INDEX_URL: &str = "https://esgf-data.dkrz.de/esg-search/search";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    response: SearchDocs,
}

#[derive(Debug, Deserialize)]
struct SearchDocs {
    docs: Vec<FileDoc>,
}

#[derive(Debug, Deserialize)]
struct FileDoc {
    title: String,
    /// Each entry is "url|mime|service".
    #[serde(default)]
    url: Vec<String>,
}

/// A file the index node knows how to serve over HTTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// File name, e.g. `tas_Amon_ACCESS-CM2_historical_r1i1p1f1_gn_195001-201412.nc`.
    pub name: String,
    /// Direct download URL.
    pub url: String,
}

/// Thin client for a federation index node.
#[derive(Debug)]
pub struct EsgfClient {
    base_url: String,
    http: reqwest::blocking::Client,
}

impl EsgfClient {
    /// A client against `base_url` (the `/esg-search/search` endpoint).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::blocking::Client::new(),
        }
    }

    /// Files matching the query, with their HTTP download URLs.
    ///
    /// # Errors
    ///
    /// Returns [`LocateError::Search`] on request or decode failure.
    pub fn search_files(&self, query: &DataQuery) -> Result<Vec<RemoteFile>, LocateError> {
        let search_err = |reason: String| LocateError::Search { reason };
        let response: SearchResponse = self
            .http
            .get(&self.base_url)
            .query(&[
                ("type", "File"),
                ("format", "application/solr+json"),
                ("limit", "100"),
                ("project", "CMIP6"),
                ("source_id", &query.model),
                ("experiment_id", &query.experiment),
                ("member_id", &query.member),
                ("table_id", &query.table),
                ("variable_id", &query.variable),
            ])
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(|e| search_err(format!("index query failed: {e}")))?
            .json()
            .map_err(|e| search_err(format!("malformed index response: {e}")))?;

        let mut files = Vec::new();
        for doc in response.response.docs {
            let http_url = doc.url.iter().find_map(|entry| {
                let mut parts = entry.split('|');
                let url = parts.next()?;
                parts.next();
                (parts.next()? == "HTTPServer").then(|| url.to_string())
            });
            match http_url {
                Some(url) => files.push(RemoteFile {
                    name: doc.title,
                    url,
                }),
                None => warn!(file = %doc.title, "no HTTP endpoint offered, skipping"),
            }
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        files.dedup_by(|a, b| a.name == b.name);
        Ok(files)
    }

    /// Download one file to `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`LocateError::Search`] on request or write failure.
    pub fn download(&self, url: &str, dest: &Path) -> Result<(), LocateError> {
        let search_err = |reason: String| LocateError::Search { reason };
        debug!(url, dest = %dest.display(), "downloading");
        let bytes = self
            .http
            .get(url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(|e| search_err(format!("download of {url} failed: {e}")))?
            .bytes()
            .map_err(|e| search_err(format!("download of {url} interrupted: {e}")))?;
        std::fs::write(dest, &bytes)
            .map_err(|e| search_err(format!("failed to write {}: {e}", dest.display())))?;
        Ok(())
    }
}

/// Resolver that searches the federation and fills the local cache.
pub struct FederatedSearch {
    client: EsgfClient,
    cache: LocalCache,
}

impl FederatedSearch {
    /// A federated source downloading into `cache`.
    pub fn new(client: EsgfClient, cache: LocalCache) -> Self {
        Self { client, cache }
    }
}

impl Resolver for FederatedSearch {
    fn name(&self) -> &str {
        "federated-search"
    }

    fn resolve(&self, query: &DataQuery) -> Result<Option<Location>, LocateError> {
        let remote = self.client.search_files(query)?;
        if remote.is_empty() {
            return Ok(None);
        }
        let dir = self.cache.dataset_dir(query);
        std::fs::create_dir_all(&dir).map_err(|e| LocateError::Search {
            reason: format!("failed to create {}: {e}", dir.display()),
        })?;
        info!(n = remote.len(), query = %query, "fetching files from federation");
        let mut paths = Vec::with_capacity(remote.len());
        for file in &remote {
            let dest = dir.join(&file.name);
            if !dest.exists() {
                self.client.download(&file.url, &dest)?;
            }
            paths.push(dest);
        }
        paths.sort();
        Ok(Some(Location::LocalFiles(paths)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_entries_pick_the_http_service() {
        let doc = FileDoc {
            title: "tas_Amon_x.nc".to_string(),
            url: vec![
                "gsiftp://host/path|application/gridftp|GridFTP".to_string(),
                "https://host/path/tas_Amon_x.nc|application/netcdf|HTTPServer".to_string(),
            ],
        };
        let url = doc.url.iter().find_map(|entry| {
            let mut parts = entry.split('|');
            let url = parts.next()?;
            parts.next();
            (parts.next()? == "HTTPServer").then(|| url.to_string())
        });
        assert_eq!(url.as_deref(), Some("https://host/path/tas_Amon_x.nc"));
    }

    #[test]
    fn search_response_deserializes() {
        let body = r#"{
            "response": {
                "docs": [
                    {
                        "title": "tas_Amon_ACCESS-CM2_historical_r1i1p1f1_gn_195001-201412.nc",
                        "url": ["https://host/f.nc|application/netcdf|HTTPServer"]
                    }
                ]
            }
        }"#;
        let parsed: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.response.docs.len(), 1);
        assert!(parsed.response.docs[0].title.starts_with("tas_Amon"));
    }
}
