use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::upload::UploadConfig;
use crate::util::urljoin;

pub(crate) const DEFAULT_HOST: &str = "api.maap-project.org";
pub(crate) const DEFAULT_CONFIG_ENDPOINT: &str = "api/environment/config";
const DEFAULT_PAGE_SIZE: usize = 20;
const DEFAULT_CONTENT_TYPE: &str = "application/echo10+xml";

/// Resolved connection settings shared by every client component.
///
/// Built once, either from the platform's environment config
/// ([`crate::Client::new`]) or directly with [`ClientConfig::new`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Platform host, e.g. `api.maap-project.org`.
    pub host: String,
    /// API root with a trailing slash, e.g. `https://api.maap-project.org/api/`.
    pub api_root: String,
    /// MAAP token. Sent as `Authorization` when it starts with `Basic`/`Bearer`,
    /// otherwise as the `token` header.
    pub token: Option<String>,
    /// Proxy granting ticket forwarded as `proxy-ticket`.
    pub proxy_ticket: Option<String>,
    /// CMR page size used while paginating searches.
    pub page_size: usize,
    /// Accept/Content-Type for catalog requests.
    pub content_type: String,
    /// Whether to verify TLS certificates.
    pub verify: bool,
    /// `param,Attribute Name,type` triples the catalog indexes as additional attributes.
    pub indexed_attributes: Vec<String>,
    pub endpoints: Endpoints,
    /// Target of [`crate::Client::upload_files`].
    pub upload: UploadConfig,
}

/// Absolute URLs of every API the client talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub search_granule_url: String,
    pub search_collection_url: String,
    pub dps_job: String,
    pub algorithm_register: String,
    pub mas_algo: String,
    pub member: String,
    pub member_dps_token: String,
    pub requester_pays: String,
    pub edc_credentials: String,
    pub workspace_bucket_credentials: String,
    pub s3_signed_url: String,
}

impl Endpoints {
    /// The endpoint layout the MAAP API serves under its root.
    pub fn standard(api_root: &str) -> Self {
        let at = |path: &str| urljoin(api_root, path);
        Self {
            search_granule_url: at("cmr/granules"),
            search_collection_url: at("cmr/collections"),
            dps_job: at("dps/job"),
            algorithm_register: at("mas/algorithm"),
            mas_algo: at("mas/algorithm"),
            member: at("members/self"),
            member_dps_token: at("members/dps/userAccessToken"),
            requester_pays: at("members/self/awsAccess/requesterPaysBucket"),
            edc_credentials: at("members/self/awsAccess/edcCredentials/{endpoint_uri}"),
            workspace_bucket_credentials: at("members/self/awsAccess/workspaceBucket"),
            s3_signed_url: at("members/self/presignedUrlS3/{bucket}/{key}"),
        }
    }
}

impl ClientConfig {
    /// Builds a configuration for an API root using the standard endpoint layout.
    pub fn new(api_root: impl Into<String>) -> Self {
        let api_root = format!("{}/", api_root.into().trim_end_matches('/'));
        let host = Url::parse(&api_root)
            .ok()
            .and_then(|u| {
                u.host_str()
                    .map(|h| u.port().map_or(h.to_string(), |p| format!("{}:{}", h, p)))
            })
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        Self {
            host,
            endpoints: Endpoints::standard(&api_root),
            api_root,
            token: None,
            proxy_ticket: None,
            page_size: DEFAULT_PAGE_SIZE,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            verify: true,
            indexed_attributes: Vec::new(),
            upload: UploadConfig::default(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_upload(mut self, upload: UploadConfig) -> Self {
        self.upload = upload;
        self
    }

    pub fn with_indexed_attributes(mut self, attributes: Vec<String>) -> Self {
        self.indexed_attributes = attributes;
        self
    }

    pub(crate) fn from_environment(
        settings: &Settings,
        config_url: &str,
        env: EnvironmentConfig,
    ) -> Result<Self> {
        let api_root = api_root(config_url, &env.service.maap_api_root)?;
        let e = &env.maap_endpoint;
        let at = |path: &str| urljoin(&api_root, path);
        let endpoints = Endpoints {
            search_granule_url: at(&e.search_granule_url),
            search_collection_url: at(&e.search_collection_url),
            dps_job: at(&e.dps_job),
            algorithm_register: at(&e.algorithm_register),
            mas_algo: at(&e.mas_algo),
            member: at(&e.member),
            member_dps_token: at(&e.member_dps_token),
            requester_pays: at(&e.requester_pays),
            edc_credentials: at(&e.edc_credentials),
            workspace_bucket_credentials: at(&e.workspace_bucket_credentials),
            s3_signed_url: at(&e.s3_signed_url),
        };

        Ok(Self {
            host: settings.host_name(),
            api_root,
            token: settings.token.clone().or(env.service.maap_token),
            proxy_ticket: settings.proxy_ticket.clone(),
            page_size: settings.page_size,
            content_type: settings.content_type.clone(),
            verify: settings.verify,
            indexed_attributes: env.search.indexed_attributes,
            endpoints,
            upload: UploadConfig::from_env(),
        })
    }
}

/// Payload of the platform's `api/environment/config` endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct EnvironmentConfig {
    pub(crate) service: ServiceConfig,
    pub(crate) maap_endpoint: EndpointPaths,
    #[serde(default)]
    pub(crate) search: SearchConfig,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ServiceConfig {
    pub(crate) maap_api_root: String,
    #[serde(default)]
    pub(crate) maap_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EndpointPaths {
    search_granule_url: String,
    search_collection_url: String,
    dps_job: String,
    algorithm_register: String,
    mas_algo: String,
    member: String,
    member_dps_token: String,
    requester_pays: String,
    edc_credentials: String,
    workspace_bucket_credentials: String,
    s3_signed_url: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SearchConfig {
    #[serde(default)]
    pub(crate) indexed_attributes: Vec<String>,
}

/// Settings gathered from arguments, environment and the rc file, before the
/// environment config is fetched.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) host: String,
    pub(crate) scheme: String,
    pub(crate) config_endpoint: String,
    pub(crate) token: Option<String>,
    pub(crate) proxy_ticket: Option<String>,
    pub(crate) page_size: usize,
    pub(crate) content_type: String,
    pub(crate) verify: bool,
}

impl Settings {
    pub(crate) fn config_url(&self) -> Result<String> {
        config_url(&self.host, &self.scheme, &self.config_endpoint)
    }

    fn host_name(&self) -> String {
        match Url::parse(&self.host) {
            Ok(u) if u.host_str().is_some() => {
                let h = u.host_str().unwrap_or_default();
                u.port().map_or(h.to_string(), |p| format!("{}:{}", h, p))
            }
            _ => self.host.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct RcConfig {
    host: Option<String>,
    scheme: Option<String>,
    token: Option<String>,
    page_size: Option<String>,
    verify: Option<bool>,
}

pub(crate) fn load_settings(
    host: Option<String>,
    token: Option<String>,
    verify: Option<bool>,
) -> Result<Settings> {
    let env = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

    let mut host = host.or_else(|| env("MAAP_API_HOST"));
    let mut token = token.or_else(|| env("MAAP_API_TOKEN"));
    let mut scheme = env("MAAP_API_HOST_SCHEME");
    let mut page_size = env("MAAP_CMR_PAGE_SIZE");
    let mut file_verify: Option<bool> = None;

    for rc_path in rc_candidates() {
        if rc_path.exists() {
            let cfg = read_rc(&rc_path).map_err(|e| {
                Error::Config(format!(
                    "failed to read configuration file {}: {}",
                    rc_path.display(),
                    e
                ))
            })?;
            debug!(path = %rc_path.display(), "loaded rc file");

            host = host.or(cfg.host);
            token = token.or(cfg.token);
            scheme = scheme.or(cfg.scheme);
            page_size = page_size.or(cfg.page_size);
            file_verify = cfg.verify;
            break;
        }
    }

    let page_size = match page_size {
        Some(v) => match v.trim().parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => {
                return Err(Error::Config(format!(
                    "page size must be a positive integer, got {:?}",
                    v
                )));
            }
        },
        None => DEFAULT_PAGE_SIZE,
    };

    Ok(Settings {
        host: host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
        scheme: scheme.unwrap_or_else(|| "https".to_string()),
        config_endpoint: env("MAAP_API_CONFIG_ENDPOINT")
            .unwrap_or_else(|| DEFAULT_CONFIG_ENDPOINT.to_string()),
        token,
        proxy_ticket: env("MAAP_PGT"),
        page_size,
        content_type: env("MAAP_CMR_CONTENT_TYPE")
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        verify: verify.or(file_verify).unwrap_or(true),
    })
}

/// Location of the environment config for a host given with or without a scheme.
pub(crate) fn config_url(host: &str, scheme: &str, endpoint: &str) -> Result<String> {
    const SUPPORTED: [&str; 2] = ["http", "https"];

    if host.contains("://") {
        let base = Url::parse(host)
            .map_err(|e| Error::Config(format!("invalid MAAP API host {:?}: {}", host, e)))?;
        if !SUPPORTED.contains(&base.scheme()) {
            return Err(Error::Config(format!(
                "unsupported scheme for MAAP API host: {:?}. Must be one of: 'http', 'https'",
                base.scheme()
            )));
        }
        let joined = base
            .join(endpoint)
            .map_err(|e| Error::Config(format!("invalid config endpoint {:?}: {}", endpoint, e)))?;
        return Ok(joined.to_string());
    }

    if !SUPPORTED.contains(&scheme) {
        return Err(Error::Config(format!(
            "unsupported MAAP_API_HOST_SCHEME {:?}. Must be one of: 'http', 'https'",
            scheme
        )));
    }
    Ok(format!(
        "{}://{}/{}",
        scheme,
        host.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    ))
}

/// Scheme and host of the config URL with the path of `maap_api_root`.
fn api_root(config_url: &str, maap_api_root: &str) -> Result<String> {
    let mut root = Url::parse(config_url)
        .map_err(|e| Error::Config(format!("invalid config url {:?}: {}", config_url, e)))?;
    let path = match Url::parse(maap_api_root) {
        Ok(u) => u.path().to_string(),
        Err(_) => maap_api_root.to_string(),
    };
    root.set_path(&format!("{}/", path.trim_end_matches('/')));
    root.set_query(None);
    root.set_fragment(None);
    Ok(root.to_string())
}

fn read_rc(path: &Path) -> std::io::Result<RcConfig> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_rc(&text))
}

fn parse_rc(text: &str) -> RcConfig {
    let mut cfg = RcConfig::default();

    // `token:` may be alone on a line with the value on the next one.
    let mut pending_key: Option<&str> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(pk) = pending_key.take() {
            if !line.contains(": ") && !line.ends_with(':') {
                cfg.set(pk, strip_quotes(line));
                continue;
            }
        }

        if let Some((k, v)) = line.split_once(':') {
            let k = k.trim();
            let v = strip_quotes(v.trim());
            if v.is_empty() {
                pending_key = Some(match k {
                    "host" => "host",
                    "scheme" => "scheme",
                    "token" => "token",
                    "page_size" => "page_size",
                    _ => continue,
                });
            } else {
                cfg.set(k, v);
            }
        }
    }

    cfg
}

impl RcConfig {
    fn set(&mut self, key: &str, value: &str) {
        let value = value.to_string();
        match key {
            "host" => self.host = Some(value),
            "scheme" => self.scheme = Some(value),
            "token" => self.token = Some(value),
            "page_size" => self.page_size = Some(value),
            "verify" => self.verify = Some(value != "0" && value != "false"),
            _ => {}
        }
    }
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn rc_candidates() -> Vec<PathBuf> {
    // 1) MAAP_RC (explicit)
    // 2) ./.maaprc
    // 3) ~/.maaprc
    if let Ok(p) = std::env::var("MAAP_RC") {
        return vec![PathBuf::from(p)];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(".maaprc"));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".maaprc"));
    }
    v
}
