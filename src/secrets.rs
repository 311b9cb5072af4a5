//! Per-user secrets stored by the platform.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::client::{Client, JSON};
use crate::error::Result;
use crate::util::{require_non_empty, urljoin};

const SECRETS: &str = "secrets";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    #[serde(alias = "name")]
    pub secret_name: String,
    #[serde(default, alias = "value")]
    pub secret_value: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Listings carry either bare names or full entries.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListedSecret {
    Name(String),
    Entry(Secret),
}

impl From<ListedSecret> for Secret {
    fn from(listed: ListedSecret) -> Self {
        match listed {
            ListedSecret::Name(secret_name) => Secret {
                secret_name,
                secret_value: None,
                extra: Map::new(),
            },
            ListedSecret::Entry(secret) => secret,
        }
    }
}

/// Secret endpoints, borrowed from a [`Client`]. See [`Client::secrets`].
#[derive(Debug, Clone, Copy)]
pub struct Secrets<'a> {
    client: &'a Client,
}

impl Client {
    pub fn secrets(&self) -> Secrets<'_> {
        Secrets { client: self }
    }
}

impl Secrets<'_> {
    fn url(&self, name: Option<&str>) -> String {
        let base = urljoin(&self.client.config().endpoints.member, SECRETS);
        match name {
            Some(name) => urljoin(&base, &urlencoding::encode(name)),
            None => base,
        }
    }

    /// Secrets of the current user; values may be omitted.
    pub fn list(&self) -> Result<Vec<Secret>> {
        let listed: Option<Vec<ListedSecret>> = self.client.get_json(&self.url(None), &[])?;
        Ok(listed
            .unwrap_or_default()
            .into_iter()
            .map(Secret::from)
            .collect())
    }

    pub fn get(&self, name: &str) -> Result<Secret> {
        require_non_empty("secret name", name)?;
        self.client.get_json(&self.url(Some(name)), &[])
    }

    /// Stores `value` under `name`. A `None` value stores an empty secret.
    pub fn add(&self, name: &str, value: Option<&str>) -> Result<Value> {
        require_non_empty("secret name", name)?;
        debug!(name, "adding secret");
        self.client.send_json(
            Method::POST,
            &self.url(None),
            &json!({ "secret_name": name, "secret_value": value }),
        )
    }

    pub fn delete(&self, name: &str) -> Result<Value> {
        require_non_empty("secret name", name)?;
        let url = self.url(Some(name));
        debug!(name, "deleting secret");
        let text = self
            .client
            .send(self.client.request(Method::DELETE, &url, JSON), &url)?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_accepts_names_and_entries() {
        let listed: Vec<ListedSecret> = serde_json::from_str(
            r#"["plain", {"secret_name": "full", "secret_value": "v"}, {"name": "short"}]"#,
        )
        .unwrap();
        let secrets: Vec<Secret> = listed.into_iter().map(Secret::from).collect();
        assert_eq!(secrets[0].secret_name, "plain");
        assert_eq!(secrets[0].secret_value, None);
        assert_eq!(secrets[1].secret_value.as_deref(), Some("v"));
        assert_eq!(secrets[2].secret_name, "short");
    }
}
