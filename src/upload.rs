//! Uploads of local files to the shared user-upload bucket.

use aws_config::BehaviorVersion;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use std::path::Path;
use tokio::runtime::Runtime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::client::Client;
use crate::error::{Error, Result};

const FALLBACK_REGION: &str = "us-west-2";

/// Destination and credentials for [`Client::upload_files`].
///
/// [`crate::Client::new`] reads these from the environment:
/// - `MAAP_S3_USER_UPLOAD_BUCKET`, `MAAP_S3_USER_UPLOAD_DIR`
/// - `MAAP_AWS_ACCESS_KEY_ID`, `MAAP_AWS_SECRET_ACCESS_KEY`
/// - `MAAP_S3_ENDPOINT_URL`, `AWS_REGION`
///
/// Without explicit keys the default AWS credential chain is used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadConfig {
    pub bucket: Option<String>,
    /// Key prefix every upload directory is created under.
    pub prefix: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// S3-compatible endpoint; addressed path-style.
    pub endpoint_url: Option<String>,
    pub region: Option<String>,
}

impl UploadConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: Some(bucket.into()),
            ..Self::default()
        }
    }

    pub fn from_env() -> Self {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            bucket: env("MAAP_S3_USER_UPLOAD_BUCKET"),
            prefix: env("MAAP_S3_USER_UPLOAD_DIR"),
            access_key_id: env("MAAP_AWS_ACCESS_KEY_ID"),
            secret_access_key: env("MAAP_AWS_SECRET_ACCESS_KEY"),
            endpoint_url: env("MAAP_S3_ENDPOINT_URL"),
            region: env("AWS_REGION"),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    pub fn with_endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// `<prefix>/<subdirectory>/<name>`, without empty segments.
    fn key(&self, subdirectory: &str, name: &str) -> String {
        let prefix = self.prefix.as_deref().unwrap_or("").trim_matches('/');
        if prefix.is_empty() {
            format!("{}/{}", subdirectory, name)
        } else {
            format!("{}/{}/{}", prefix, subdirectory, name)
        }
    }

    async fn s3_client(&self) -> aws_sdk_s3::Client {
        let region = RegionProviderChain::first_try(self.region.clone().map(Region::new))
            .or_default_provider()
            .or_else(Region::new(FALLBACK_REGION));
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region);
        if let (Some(id), Some(secret)) = (&self.access_key_id, &self.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(id, secret, None, None, "maap"));
        }
        if let Some(endpoint) = &self.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let s3 = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(self.endpoint_url.is_some())
            .build();
        aws_sdk_s3::Client::from_conf(s3)
    }
}

/// Where [`Client::upload_files`] put the files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub bucket: String,
    /// Random directory shared by every file of one call. Keep it to find the files again.
    pub subdirectory: String,
    /// Object keys in the order the files were given.
    pub keys: Vec<String>,
}

impl Client {
    /// Uploads local files to the user-upload bucket under a fresh random directory.
    ///
    /// Every path is checked before anything is sent.
    pub fn upload_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Upload> {
        let upload = &self.config().upload;
        let bucket = upload
            .bucket
            .clone()
            .ok_or_else(|| Error::Config("MAAP_S3_USER_UPLOAD_BUCKET is not set".to_string()))?;
        if paths.is_empty() {
            return Err(Error::validation("no files to upload"));
        }

        let subdirectory = Uuid::new_v4().to_string();
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            if !std::fs::metadata(path)?.is_file() {
                return Err(Error::validation(format!("{} is not a file", path.display())));
            }
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| Error::validation(format!("no file name in {}", path.display())))?;
            files.push((path, upload.key(&subdirectory, name)));
        }

        let rt = runtime()?;
        let s3 = rt.block_on(upload.s3_client());
        let mut keys = Vec::with_capacity(files.len());
        for (path, key) in files {
            debug!(bucket = %bucket, key = %key, "uploading");
            let body = rt
                .block_on(ByteStream::from_path(path))
                .map_err(|e| Error::Storage(format!("{}: {}", path.display(), e)))?;
            rt.block_on(s3.put_object().bucket(&bucket).key(&key).body(body).send())
                .map_err(|e| Error::Storage(format!("{}: {}", key, DisplayErrorContext(&e))))?;
            keys.push(key);
        }

        info!(bucket = %bucket, subdirectory = %subdirectory, files = keys.len(), "upload complete");
        Ok(Upload {
            bucket,
            subdirectory,
            keys,
        })
    }
}

fn runtime() -> Result<Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
