//! Short-lived AWS credentials and pre-signed S3 URLs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::client::Client;
use crate::error::Result;
use crate::util::{double_encode, require_non_empty};

/// Default credential lifetime requested from the platform: 12 hours.
pub const DEFAULT_EXPIRATION_SECS: u64 = 60 * 60 * 12;

/// Temporary AWS credentials.
///
/// The platform answers in either camelCase or snake_case depending on the
/// endpoint; both decode into the same fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialBundle {
    #[serde(alias = "accessKeyId", alias = "aws_access_key_id")]
    pub access_key_id: String,
    #[serde(alias = "secretAccessKey", alias = "aws_secret_access_key")]
    pub secret_access_key: String,
    #[serde(default, alias = "sessionToken", alias = "aws_session_token")]
    pub session_token: Option<String>,
    #[serde(default)]
    pub expiration: Option<String>,
    /// Host of the DAAC the credentials were issued for (Earthdata only).
    #[serde(default, alias = "DAAC")]
    pub daac: Option<String>,
    /// Any further fields, e.g. the workspace bucket name and prefix.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A pre-signed S3 URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedUrl {
    pub url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Credential endpoints, borrowed from a [`Client`]. See [`Client::aws`].
#[derive(Debug, Clone, Copy)]
pub struct Aws<'a> {
    client: &'a Client,
}

impl Client {
    pub fn aws(&self) -> Aws<'_> {
        Aws { client: self }
    }
}

impl Aws<'_> {
    /// Credentials for requester-pays buckets, valid for `expiration_secs`.
    pub fn requester_pays_credentials(&self, expiration_secs: u64) -> Result<CredentialBundle> {
        let url = &self.client.config().endpoints.requester_pays;
        self.client
            .get_json(url, &[("exp", expiration_secs.to_string())])
    }

    pub fn s3_signed_url(&self, bucket: &str, key: &str, expiration_secs: u64) -> Result<SignedUrl> {
        require_non_empty("bucket", bucket)?;
        require_non_empty("key", key)?;
        let url = self
            .client
            .config()
            .endpoints
            .s3_signed_url
            .replace("{bucket}", bucket)
            .replace("{key}", key.trim_start_matches('/'));
        self.client
            .get_json(&url, &[("exp", expiration_secs.to_string())])
    }

    /// Credentials for an external DAAC's S3 credentials endpoint, such as
    /// `https://data.ornldaac.earthdata.nasa.gov/s3credentials`.
    pub fn earthdata_s3_credentials(&self, endpoint_uri: &str) -> Result<CredentialBundle> {
        require_non_empty("endpoint_uri", endpoint_uri)?;
        let url = self
            .client
            .config()
            .endpoints
            .edc_credentials
            .replace("{endpoint_uri}", &double_encode(endpoint_uri));
        let mut bundle: CredentialBundle = self.client.get_json(&url, &[])?;
        bundle.daac = Url::parse(endpoint_uri)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string));
        Ok(bundle)
    }

    /// Credentials scoped to the user's workspace bucket.
    pub fn workspace_bucket_credentials(&self) -> Result<CredentialBundle> {
        let url = &self.client.config().endpoints.workspace_bucket_credentials;
        self.client.get_json(url, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_key_styles_decode() {
        let camel: CredentialBundle = serde_json::from_str(
            r#"{"accessKeyId":"AK","secretAccessKey":"SK","sessionToken":"ST","expiration":"2030-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let snake: CredentialBundle = serde_json::from_str(
            r#"{"aws_access_key_id":"AK","aws_secret_access_key":"SK","aws_session_token":"ST","expiration":"2030-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(camel, snake);
        assert_eq!(camel.session_token.as_deref(), Some("ST"));
        assert!(camel.extra.is_empty());
    }

    #[test]
    fn unknown_fields_are_kept() {
        let bundle: CredentialBundle = serde_json::from_str(
            r#"{"aws_access_key_id":"AK","aws_secret_access_key":"SK","aws_bucket_name":"maap-ws","aws_bucket_prefix":"jdoe"}"#,
        )
        .unwrap();
        assert_eq!(bundle.extra["aws_bucket_name"], "maap-ws");
        assert_eq!(bundle.session_token, None);
    }
}
