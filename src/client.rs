use reqwest::Method;
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{ClientConfig, EnvironmentConfig, load_settings};
use crate::error::{Error, Result};
use crate::result::{Collection, Granule};
use crate::search::{
    DEFAULT_COLLECTION_LIMIT, DEFAULT_GRANULE_LIMIT, SearchQuery, collect_pages,
    parse_search_response,
};

pub(crate) const JSON: &str = "application/json";
pub(crate) const XML: &str = "application/xml";

/// Blocking client for the MAAP APIs.
///
/// Cloning is cheap: clones share the configuration and the HTTP connection pool.
#[derive(Debug, Clone)]
pub struct Client {
    config: Arc<ClientConfig>,

    timeout: Duration,
    progress: bool,

    http: HttpClient,
}

impl Client {
    /// Creates a client using environment variables and/or `.maaprc`.
    ///
    /// This is equivalent to `Client::new(None, None, None)`.
    pub fn from_env() -> Result<Self> {
        Self::new(None, None, None)
    }

    /// Creates a client using (in order of precedence):
    /// - explicit `host`/`token` arguments
    /// - environment variables `MAAP_API_HOST` / `MAAP_API_TOKEN`
    /// - config file from `MAAP_RC` or `.maaprc`
    ///
    /// then reads the platform's environment config to discover every endpoint.
    pub fn new(host: Option<String>, token: Option<String>, verify: Option<bool>) -> Result<Self> {
        let settings = load_settings(host, token, verify)?;
        let http = build_http(settings.verify)?;

        let config_url = settings.config_url()?;
        debug!(url = %config_url, "requesting client config");
        let resp = http
            .get(&config_url)
            .header(ACCEPT, JSON)
            .send()
            .map_err(|e| Error::Config(format!("unable to read MAAP config from {}: {}", config_url, e)))?;
        let status = resp.status();
        let text = resp.text()?;
        if !status.is_success() {
            return Err(Error::api(status, &config_url, text));
        }
        let env: EnvironmentConfig = serde_json::from_str(&text).map_err(|e| {
            Error::Config(format!("unable to read MAAP config from {}: {}", config_url, e))
        })?;

        let config = ClientConfig::from_environment(&settings, &config_url, env)?;
        Ok(Self::assemble(config, http))
    }

    /// Creates a client from an already resolved configuration.
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let http = build_http(config.verify)?;
        Ok(Self::assemble(config, http))
    }

    fn assemble(config: ClientConfig, http: HttpClient) -> Self {
        Self {
            config: Arc::new(config),
            timeout: Duration::from_secs(60),
            progress: true,
            http,
        }
    }

    /// Per-request timeout for API calls. Downloads are not bound by it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Show a progress bar while downloading.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn http(&self) -> &HttpClient {
        &self.http
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn progress(&self) -> bool {
        self.progress
    }

    /// Searches the catalog for granules. Defaults to 20 results.
    pub fn search_granules(&self, query: &SearchQuery) -> Result<Vec<Granule>> {
        let limit = query.get_limit().unwrap_or(DEFAULT_GRANULE_LIMIT);
        let records = self.search(&self.config.endpoints.search_granule_url, query, limit)?;
        Ok(records
            .into_iter()
            .map(|r| Granule::new(r, self.clone()))
            .collect())
    }

    /// Searches the catalog for collections. Defaults to 100 results.
    pub fn search_collections(&self, query: &SearchQuery) -> Result<Vec<Collection>> {
        let limit = query.get_limit().unwrap_or(DEFAULT_COLLECTION_LIMIT);
        let records = self.search(&self.config.endpoints.search_collection_url, query, limit)?;
        Ok(records
            .into_iter()
            .map(|r| Collection::new(r, self.clone()))
            .collect())
    }

    fn search(&self, url: &str, query: &SearchQuery, limit: usize) -> Result<Vec<Value>> {
        let params = query.to_params(&self.config.indexed_attributes)?;
        debug!(url, ?params, limit, "searching catalog");

        collect_pages(limit, self.config.page_size, |page_num, page_size| {
            let mut page_params = params.clone();
            page_params.push(("page_num".to_string(), page_num.to_string()));
            page_params.push(("page_size".to_string(), page_size.to_string()));
            let req = self
                .request(Method::GET, url, &self.config.content_type)
                .query(&page_params);
            let body = self.send(req, url)?;
            parse_search_response(&body)
        })
    }

    /// Builds an authenticated API request.
    pub(crate) fn request(&self, method: Method, url: &str, accept: &str) -> RequestBuilder {
        let req = self
            .http
            .request(method, url)
            .timeout(self.timeout)
            .header(ACCEPT, accept);
        self.apply_auth(req)
    }

    pub(crate) fn apply_auth(&self, req: RequestBuilder) -> RequestBuilder {
        let mut req = req;
        if let Some(token) = self.config.token.as_deref().map(str::trim) {
            let lower = token.to_ascii_lowercase();
            req = if lower.starts_with("basic") || lower.starts_with("bearer") {
                req.header(AUTHORIZATION, token)
            } else {
                req.header("token", token)
            };
        }
        if let Some(pgt) = self.config.proxy_ticket.as_deref() {
            req = req.header("proxy-ticket", pgt);
        }
        req
    }

    /// Sends once and returns the body of a 2xx response.
    pub(crate) fn send(&self, req: RequestBuilder, url: &str) -> Result<String> {
        let resp = req.send()?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(Error::api(status, url, body));
        }
        Ok(resp.text()?)
    }

    pub(crate) fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        debug!(url, "GET");
        let req = self.request(Method::GET, url, JSON).query(query);
        let text = self.send(req, url)?;
        parse_json(&text, url)
    }

    pub(crate) fn get_text(&self, url: &str, accept: &str) -> Result<String> {
        debug!(url, "GET");
        self.send(self.request(Method::GET, url, accept), url)
    }

    pub(crate) fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: &B,
    ) -> Result<T> {
        debug!(url, %method, "sending JSON");
        let req = self
            .request(method, url, JSON)
            .header(CONTENT_TYPE, JSON)
            .json(body);
        let text = self.send(req, url)?;
        parse_json(&text, url)
    }
}

fn parse_json<T: DeserializeOwned>(text: &str, url: &str) -> Result<T> {
    // Some endpoints answer 200/204 with an empty body.
    let text = if text.trim().is_empty() { "null" } else { text };
    serde_json::from_str(text)
        .map_err(|e| Error::Parse(format!("API JSON (url={}): {}", url, e)))
}

fn build_http(verify: bool) -> Result<HttpClient> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("maap-rs/{}", env!("CARGO_PKG_VERSION")))
            .unwrap_or(HeaderValue::from_static("maap-rs")),
    );

    let mut builder = HttpClient::builder()
        .default_headers(default_headers)
        .timeout(Duration::from_secs(60 * 60 * 6));

    if !verify {
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder
        .build()
        .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_tokens_go_in_authorization() {
        let client =
            Client::with_config(ClientConfig::new("https://api.example/api").with_token("Bearer abc"))
                .unwrap();
        let req = client
            .request(Method::GET, "https://api.example/api/x", JSON)
            .build()
            .unwrap();
        assert_eq!(req.headers()[AUTHORIZATION], "Bearer abc");
        assert!(req.headers().get("token").is_none());
        assert_eq!(req.headers()[ACCEPT], JSON);
    }

    #[test]
    fn plain_tokens_go_in_token_header() {
        let mut config = ClientConfig::new("https://api.example/api").with_token("abc");
        config.proxy_ticket = Some("PGT-9".to_string());
        let client = Client::with_config(config).unwrap();
        let req = client
            .request(Method::GET, "https://api.example/api/x", XML)
            .build()
            .unwrap();
        assert_eq!(req.headers()["token"], "abc");
        assert_eq!(req.headers()["proxy-ticket"], "PGT-9");
        assert!(req.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn empty_body_parses_as_null() {
        let v: Value = parse_json("", "u").unwrap();
        assert!(v.is_null());
        assert!(matches!(parse_json::<Value>("{", "u"), Err(Error::Parse(_))));
    }
}
