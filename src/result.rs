//! Wrappers over catalog records.

use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::client::Client;
use crate::error::{Error, Result};
use crate::util::{guess_filename_from_url, s3_to_http};

/// One granule (data file) returned by a catalog search.
#[derive(Debug, Clone)]
pub struct Granule {
    record: Value,
    location: Option<String>,
    fallback: Option<String>,
    download_name: Option<String>,
    opendap_url: Option<String>,
    browse_url: Option<String>,
    client: Client,
}

impl Granule {
    pub(crate) fn new(record: Value, client: Client) -> Self {
        let urls = access_urls(&record);
        let location = urls
            .iter()
            .find(|u| u.starts_with("s3://"))
            .or_else(|| urls.first())
            .cloned();
        let download_name = location.as_deref().and_then(guess_filename_from_url);
        let fallback = download_name.as_deref().and_then(|name| {
            urls.iter()
                .find(|u| u.starts_with("https://") && u.ends_with(name))
                .cloned()
        });

        let resources = as_list(&record["Granule"]["OnlineResources"]["OnlineResource"]);
        let resource_url = |kind: &str| {
            resources
                .iter()
                .find(|r| r["Type"].as_str() == Some(kind))
                .and_then(|r| r["URL"].as_str())
                .map(str::to_string)
        };
        let opendap_url = resource_url("OPeNDAP");
        let browse_url = resource_url("BROWSE");

        Self {
            record,
            location,
            fallback,
            download_name,
            opendap_url,
            browse_url,
            client,
        }
    }

    /// The raw catalog record.
    pub fn record(&self) -> &Value {
        &self.record
    }

    /// Field lookup by JSON pointer, e.g. `/Granule/GranuleUR`.
    pub fn get(&self, pointer: &str) -> Option<&Value> {
        self.record.pointer(pointer)
    }

    pub fn granule_ur(&self) -> Option<&str> {
        self.record["Granule"]["GranuleUR"].as_str()
    }

    pub fn concept_id(&self) -> Option<&str> {
        self.record["concept-id"].as_str()
    }

    /// S3 URL when `s3` is true, otherwise the HTTPS fallback.
    pub fn download_url(&self, s3: bool) -> Option<&str> {
        if s3 { self.s3_url() } else { self.http_url() }
    }

    /// The preferred location: the first `s3://` access URL, else the first URL.
    pub fn s3_url(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// HTTPS access URL for the same file.
    pub fn http_url(&self) -> Option<&str> {
        self.fallback.as_deref()
    }

    pub fn opendap_url(&self) -> Option<&str> {
        self.opendap_url.as_deref()
    }

    pub fn browse_url(&self) -> Option<&str> {
        self.browse_url.as_deref()
    }

    /// `GranuleUR` padded to 70 columns, then update time and collection id.
    pub fn description(&self) -> String {
        let text = |v: &Value| v.as_str().unwrap_or_default().to_string();
        format!(
            "{:<70} Updated {} ({})",
            text(&self.record["Granule"]["GranuleUR"]),
            text(&self.record["Granule"]["LastUpdate"]),
            text(&self.record["collection-concept-id"]),
        )
    }

    /// Downloads the granule into `dest_dir` and returns the local path.
    ///
    /// An existing file is kept unless `overwrite` is set. `s3://` locations
    /// are fetched through their public HTTPS form. FTP is not supported:
    /// an `ftp://` location fails with [`Error::Validation`].
    pub fn download(&self, dest_dir: &Path, overwrite: bool) -> Result<PathBuf> {
        let location = self
            .location
            .as_deref()
            .ok_or_else(|| Error::validation("granule has no online access URL"))?;
        let name = self
            .download_name
            .as_deref()
            .unwrap_or("download")
            .replace('/', "");
        let dest = dest_dir.join(name);

        if location.starts_with("ftp") {
            return Err(Error::validation(format!(
                "ftp downloads are not supported: {}",
                location
            )));
        }

        if location.starts_with("s3://") {
            let url = self
                .fallback
                .clone()
                .or_else(|| s3_to_http(location))
                .ok_or_else(|| Error::validation(format!("malformed S3 URL {}", location)))?;
            return self.client.download_http(&url, &dest, overwrite);
        }

        self.client.download_http(location, &dest, overwrite)
    }
}

/// One collection (dataset) returned by a catalog search.
#[derive(Debug, Clone)]
pub struct Collection {
    record: Value,
    location: String,
    download_name: String,
    client: Client,
}

impl Collection {
    pub(crate) fn new(record: Value, client: Client) -> Self {
        let location = format!(
            "https://{}/search/concepts/{}.umm-json",
            client.config().host,
            record["concept-id"].as_str().unwrap_or_default()
        );
        let download_name = record["Collection"]["ShortName"]
            .as_str()
            .unwrap_or("collection")
            .to_string();
        Self {
            record,
            location,
            download_name,
            client,
        }
    }

    pub fn record(&self) -> &Value {
        &self.record
    }

    pub fn get(&self, pointer: &str) -> Option<&Value> {
        self.record.pointer(pointer)
    }

    pub fn concept_id(&self) -> Option<&str> {
        self.record["concept-id"].as_str()
    }

    pub fn short_name(&self) -> Option<&str> {
        self.record["Collection"]["ShortName"].as_str()
    }

    /// UMM-JSON metadata URL of the collection.
    pub fn download_url(&self) -> &str {
        &self.location
    }

    /// Saves the UMM-JSON metadata as `<dest_dir>/<ShortName>`.
    pub fn download(&self, dest_dir: &Path, overwrite: bool) -> Result<PathBuf> {
        let dest = dest_dir.join(self.download_name.replace('/', ""));
        self.client.download_http(&self.location, &dest, overwrite)
    }
}

fn access_urls(record: &Value) -> Vec<String> {
    as_list(&record["Granule"]["OnlineAccessURLs"]["OnlineAccessURL"])
        .iter()
        .filter_map(|u| u["URL"].as_str())
        .map(str::to_string)
        .collect()
}

/// A single XML child decodes as an object, repeated ones as an array.
fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}
